//! Dependent option lookups: projects, then canvases of a project, then the
//! variables of a canvas.
//!
//! Each lookup is stateless. A lookup missing its prerequisite selection
//! returns an empty list without contacting the service.

use std::fmt;
use std::sync::Arc;

use canvas_api::{ApiError, CanvasApi};
use canvas_types::{OptionItem, OptionKind, VariableKind, VariableSpec};
use thiserror::Error;
use tracing::{debug, info};

/// What a failed lookup was loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSubject {
    Projects,
    Canvases,
    CanvasVariables,
}

impl fmt::Display for LookupSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LookupSubject::Projects => "projects",
            LookupSubject::Canvases => "canvases",
            LookupSubject::CanvasVariables => "canvas variables",
        })
    }
}

#[derive(Debug, Error)]
#[error("Failed to load {subject}: {source}")]
pub struct LookupError {
    pub subject: LookupSubject,
    #[source]
    pub source: ApiError,
}

/// Populates the selection lists a host presents before running a canvas.
#[derive(Clone)]
pub struct OptionResolver {
    api: Arc<dyn CanvasApi>,
}

impl OptionResolver {
    pub fn new(api: Arc<dyn CanvasApi>) -> Self {
        Self { api }
    }

    pub async fn get_projects(&self) -> Result<Vec<OptionItem>, LookupError> {
        let projects = self.api.list_projects().await.map_err(|source| LookupError {
            subject: LookupSubject::Projects,
            source,
        })?;
        info!(count = projects.len(), "loaded projects");
        Ok(projects
            .into_iter()
            .map(|project| OptionItem::new(project.title, project.id))
            .collect())
    }

    pub async fn get_canvases(&self, project_id: &str) -> Result<Vec<OptionItem>, LookupError> {
        if project_id.trim().is_empty() {
            debug!("no project selected; no canvases to list");
            return Ok(Vec::new());
        }
        let canvases = self
            .api
            .list_canvases(project_id)
            .await
            .map_err(|source| LookupError {
                subject: LookupSubject::Canvases,
                source,
            })?;
        info!(project_id, count = canvases.len(), "loaded canvases");
        Ok(canvases
            .into_iter()
            .map(|canvas| OptionItem::new(canvas.title, canvas.id))
            .collect())
    }

    pub async fn get_canvas_variables(&self, canvas_id: &str) -> Result<Vec<OptionItem>, LookupError> {
        if canvas_id.trim().is_empty() {
            debug!("no canvas selected; no variables to list");
            return Ok(Vec::new());
        }
        let schema = self
            .api
            .get_canvas_variables(canvas_id)
            .await
            .map_err(|source| LookupError {
                subject: LookupSubject::CanvasVariables,
                source,
            })?;
        info!(canvas_id, count = schema.len(), "loaded canvas variables");
        Ok(schema.iter().map(variable_option).collect())
    }
}

/// Labels a variable with its required-ness and hints its input kind.
fn variable_option(spec: &VariableSpec) -> OptionItem {
    let name = if spec.required {
        format!("{} (required)", spec.name)
    } else {
        spec.name.clone()
    };
    let description = spec
        .description
        .clone()
        .filter(|description| !description.is_empty())
        .unwrap_or_else(|| format!("{} variable", spec.kind.as_str()));
    let kind = match spec.kind {
        VariableKind::File => OptionKind::File,
        VariableKind::Text | VariableKind::Json => OptionKind::Text,
    };

    OptionItem {
        name,
        value: spec.name.clone(),
        description: Some(description),
        kind: Some(kind),
    }
}
