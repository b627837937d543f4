//! Recording fake of the canvas service used by the engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use canvas_api::{ApiError, CanvasApi};
use canvas_types::{
    CanvasDefinition, CanvasVersion, CompletionRequest, CompletionResponse, Project, UploadSlot, VariableKind, VariableSpec,
};
use reqwest::StatusCode;
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    ListProjects,
    ListCanvases(String),
    GetVariables(String),
    Completion(CompletionRequest),
    UploadSlot,
    PutFile {
        upload_url: String,
        bytes: Vec<u8>,
        mime_type: String,
    },
}

type CompletionHandler = Box<dyn Fn(&CompletionRequest) -> Result<CompletionResponse, ApiError> + Send + Sync>;

/// In-memory [`CanvasApi`].
///
/// Unknown canvases answer 404. By default a completion echoes the submitted
/// variables as `choices[0].message.content`.
#[derive(Default)]
pub(crate) struct FakeCanvasApi {
    projects: Vec<Project>,
    canvases: HashMap<String, Vec<CanvasDefinition>>,
    schemas: HashMap<String, Vec<VariableSpec>>,
    failing_projects: bool,
    failing_slot: bool,
    failing_transfer: bool,
    failing_canvases: HashSet<String>,
    completion_handler: Option<CompletionHandler>,
    calls: Mutex<Vec<Call>>,
}

impl FakeCanvasApi {
    pub(crate) fn with_projects(mut self, projects: Vec<Project>) -> Self {
        self.projects = projects;
        self
    }

    pub(crate) fn with_canvases(mut self, project_id: &str, canvases: Vec<CanvasDefinition>) -> Self {
        self.canvases.insert(project_id.to_string(), canvases);
        self
    }

    pub(crate) fn with_schema(mut self, canvas_id: &str, schema: Vec<VariableSpec>) -> Self {
        self.schemas.insert(canvas_id.to_string(), schema);
        self
    }

    pub(crate) fn failing_projects(mut self) -> Self {
        self.failing_projects = true;
        self
    }

    pub(crate) fn failing_slot(mut self) -> Self {
        self.failing_slot = true;
        self
    }

    pub(crate) fn failing_transfer(mut self) -> Self {
        self.failing_transfer = true;
        self
    }

    /// Completions for `canvas_id` answer 500.
    pub(crate) fn failing_completion_for(mut self, canvas_id: &str) -> Self {
        self.failing_canvases.insert(canvas_id.to_string());
        self
    }

    pub(crate) fn with_completion_handler(
        mut self,
        handler: impl Fn(&CompletionRequest) -> Result<CompletionResponse, ApiError> + Send + Sync + 'static,
    ) -> Self {
        self.completion_handler = Some(Box::new(handler));
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    pub(crate) fn completions(&self) -> Vec<CompletionRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Completion(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

pub(crate) fn status_error(status: StatusCode, body: &str) -> ApiError {
    ApiError::from_status(status, body)
}

#[async_trait]
impl CanvasApi for FakeCanvasApi {
    async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        self.record(Call::ListProjects);
        if self.failing_projects {
            return Err(status_error(StatusCode::UNAUTHORIZED, "invalid api key"));
        }
        Ok(self.projects.clone())
    }

    async fn list_canvases(&self, project_id: &str) -> Result<Vec<CanvasDefinition>, ApiError> {
        self.record(Call::ListCanvases(project_id.to_string()));
        self.canvases
            .get(project_id)
            .cloned()
            .ok_or_else(|| status_error(StatusCode::NOT_FOUND, "project not found"))
    }

    async fn get_canvas_variables(&self, canvas_id: &str) -> Result<Vec<VariableSpec>, ApiError> {
        self.record(Call::GetVariables(canvas_id.to_string()));
        self.schemas
            .get(canvas_id)
            .cloned()
            .ok_or_else(|| status_error(StatusCode::NOT_FOUND, "canvas not found"))
    }

    async fn create_completion(&self, request: &CompletionRequest) -> Result<CompletionResponse, ApiError> {
        self.record(Call::Completion(request.clone()));
        if self.failing_canvases.contains(&request.canvas_id) {
            return Err(status_error(StatusCode::INTERNAL_SERVER_ERROR, "completion failed"));
        }
        match &self.completion_handler {
            Some(handler) => handler(request),
            None => Ok(CompletionResponse(json!({
                "choices": [{ "message": { "content": { "variables": request.variables } } }]
            }))),
        }
    }

    async fn create_upload_slot(&self) -> Result<UploadSlot, ApiError> {
        self.record(Call::UploadSlot);
        if self.failing_slot {
            return Err(status_error(StatusCode::SERVICE_UNAVAILABLE, "storage unavailable"));
        }
        let slot_number = self.count(|call| matches!(call, Call::UploadSlot));
        Ok(UploadSlot {
            upload_url: format!("https://storage.example/upload/{slot_number}"),
            download_url: format!("https://files.example/download/{slot_number}"),
        })
    }

    async fn put_file(&self, upload_url: &str, bytes: Vec<u8>, mime_type: &str) -> Result<(), ApiError> {
        self.record(Call::PutFile {
            upload_url: upload_url.to_string(),
            bytes,
            mime_type: mime_type.to_string(),
        });
        if self.failing_transfer {
            return Err(status_error(StatusCode::FORBIDDEN, "signature expired"));
        }
        Ok(())
    }
}

pub(crate) fn variable(name: &str, kind: VariableKind) -> VariableSpec {
    VariableSpec {
        name: name.to_string(),
        kind,
        required: false,
        description: None,
    }
}

pub(crate) fn canvas(id: &str, title: &str, variables: Vec<VariableSpec>) -> CanvasDefinition {
    CanvasDefinition {
        id: id.to_string(),
        title: title.to_string(),
        project_id: None,
        last_version: Some(CanvasVersion {
            id: None,
            variables,
            promoted: true,
        }),
    }
}

pub(crate) fn project(id: &str, title: &str) -> Project {
    Project {
        id: id.to_string(),
        title: title.to_string(),
        workspace_id: None,
    }
}
