//! Core executor data types.

use std::collections::HashMap;

use canvas_api::ApiError;
use canvas_types::VariableAssignment;
use thiserror::Error;

use crate::schema::SchemaSource;

/// What to run for every record of a batch.
///
/// `canvas_id` and each assignment value may contain `${{ ... }}` templates,
/// resolved per record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionRequest {
    pub canvas_id: String,
    pub assignments: Vec<VariableAssignment>,
}

impl ExecutionRequest {
    pub fn new(canvas_id: impl Into<String>, assignments: Vec<VariableAssignment>) -> Self {
        Self {
            canvas_id: canvas_id.into(),
            assignments,
        }
    }
}

/// Batch-wide execution policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Record a failing record as `{ "error": .. }` and keep going.
    pub continue_on_fail: bool,
    /// Fetch each canvas schema once per batch.
    pub cache_schemas: bool,
    pub schema_source: SchemaSource,
    /// Values available to `${{ env.NAME }}` templates.
    pub environment_variables: HashMap<String, String>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            continue_on_fail: false,
            cache_schemas: true,
            schema_source: SchemaSource::default(),
            environment_variables: HashMap::new(),
        }
    }
}

/// Failure while processing a single record.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("no canvas selected")]
    MissingCanvasId,

    #[error("could not read the variables of canvas '{canvas_id}': {source}")]
    Schema {
        canvas_id: String,
        #[source]
        source: ApiError,
    },

    #[error("{0}")]
    Completion(#[source] ApiError),
}

/// A record failure that aborted the batch.
#[derive(Debug, Error)]
#[error(
    "Failed to execute canvas for item {index}: {source}. Enable continue-on-fail to record failures as error items and process the remaining items"
)]
pub struct BatchError {
    pub index: usize,
    #[source]
    pub source: ItemError,
}
