//! Canvas variable schema lookup and the per-batch schema cache.

use std::collections::HashMap;

use canvas_api::{ApiError, CanvasApi};
use canvas_types::VariableSpec;
use tracing::debug;

/// Where the variable schema of a canvas is read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SchemaSource {
    /// The canvas's promoted (published) version.
    #[default]
    Promoted,
    /// The last version reported by the project's canvas listing.
    LatestVersion { project_id: String },
}

/// Fetch the variable schema of `canvas_id` from `source`.
///
/// With [`SchemaSource::LatestVersion`] a canvas missing from the listing
/// yields an empty schema.
pub async fn fetch_schema(api: &dyn CanvasApi, source: &SchemaSource, canvas_id: &str) -> Result<Vec<VariableSpec>, ApiError> {
    match source {
        SchemaSource::Promoted => api.get_canvas_variables(canvas_id).await,
        SchemaSource::LatestVersion { project_id } => {
            let canvases = api.list_canvases(project_id).await?;
            Ok(canvases
                .into_iter()
                .find(|canvas| canvas.id == canvas_id)
                .map(|canvas| canvas.variables().to_vec())
                .unwrap_or_default())
        }
    }
}

/// Read-only schema cache keyed by canvas identifier.
///
/// Owned by a single batch and dropped with it; entries are never
/// invalidated while the batch runs. Failed lookups are not cached.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: HashMap<String, Vec<VariableSpec>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, canvas_id: &str) -> Option<&[VariableSpec]> {
        self.entries.get(canvas_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the cached schema or fetch and remember it.
    pub async fn schema_for(
        &mut self,
        api: &dyn CanvasApi,
        source: &SchemaSource,
        canvas_id: &str,
    ) -> Result<Vec<VariableSpec>, ApiError> {
        if let Some(schema) = self.entries.get(canvas_id) {
            debug!(canvas_id, variable_count = schema.len(), "schema cache hit");
            return Ok(schema.clone());
        }

        debug!(canvas_id, "schema cache miss");
        let schema = fetch_schema(api, source, canvas_id).await?;
        self.entries.insert(canvas_id.to_string(), schema.clone());
        Ok(schema)
    }
}
