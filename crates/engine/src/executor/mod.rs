//! Batch execution: runs one canvas completion per input record, strictly in
//! input order.
//!
//! - Parameters are interpolated against each record before use
//! - The variable schema is read once per canvas when caching is enabled
//! - `VariableProcessor` builds the submission mapping
//! - Outcomes carry the position of the record that produced them
//!
//! A failing record either becomes an `{ "error": .. }` outcome
//! (`continue_on_fail`) or aborts the batch with a [`BatchError`].

use std::sync::Arc;

use canvas_api::CanvasApi;
use canvas_types::{CompletionRequest, ExecutionOutcome, InputRecord, VariableAssignment, VariableSpec};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::resolve::{RecordContext, interpolate_string, interpolate_value};
use crate::schema::{SchemaCache, fetch_schema};
use crate::variables::VariableProcessor;

pub mod types;
pub use types::{BatchError, BatchOptions, ExecutionRequest, ItemError};

/// Runs batches of canvas completions against a [`CanvasApi`].
#[derive(Clone)]
pub struct BatchExecutor {
    api: Arc<dyn CanvasApi>,
    options: BatchOptions,
}

impl BatchExecutor {
    pub fn new(api: Arc<dyn CanvasApi>, options: BatchOptions) -> Self {
        Self { api, options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Execute `request` once per record.
    ///
    /// With `cache_schemas` a fresh [`SchemaCache`] lives for this call only.
    pub async fn execute(&self, request: &ExecutionRequest, records: &[InputRecord]) -> Result<Vec<ExecutionOutcome>, BatchError> {
        if self.options.cache_schemas {
            let mut cache = SchemaCache::new();
            self.execute_with_cache(request, records, Some(&mut cache)).await
        } else {
            self.execute_with_cache(request, records, None).await
        }
    }

    /// Execute with a caller-owned schema cache, or none.
    pub async fn execute_with_cache(
        &self,
        request: &ExecutionRequest,
        records: &[InputRecord],
        mut cache: Option<&mut SchemaCache>,
    ) -> Result<Vec<ExecutionOutcome>, BatchError> {
        info!(
            record_count = records.len(),
            continue_on_fail = self.options.continue_on_fail,
            schema_cache = cache.is_some(),
            "starting batch"
        );

        let mut outcomes = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            match self.execute_record(index, request, record, cache.as_deref_mut()).await {
                Ok(content) => {
                    debug!(index, "record completed");
                    outcomes.push(ExecutionOutcome::success(index, content));
                }
                Err(error) if self.options.continue_on_fail => {
                    warn!(index, error = %error, "record failed; continuing");
                    outcomes.push(ExecutionOutcome::failure(index, format!("Failed to execute canvas: {error}")));
                }
                Err(source) => {
                    warn!(index, error = %source, "record failed; aborting batch");
                    return Err(BatchError { index, source });
                }
            }
        }

        let failed = outcomes.iter().filter(|outcome| outcome.is_error()).count();
        info!(record_count = outcomes.len(), failed, "batch finished");
        Ok(outcomes)
    }

    async fn execute_record(
        &self,
        index: usize,
        request: &ExecutionRequest,
        record: &InputRecord,
        cache: Option<&mut SchemaCache>,
    ) -> Result<Value, ItemError> {
        let context = RecordContext::new(index, &record.json, &self.options.environment_variables);

        let canvas_id = interpolate_string(&request.canvas_id, &context).trim().to_string();
        if canvas_id.is_empty() {
            return Err(ItemError::MissingCanvasId);
        }
        let assignments: Vec<VariableAssignment> = request
            .assignments
            .iter()
            .map(|assignment| VariableAssignment {
                name: assignment.name.clone(),
                value: interpolate_value(&assignment.value, &context),
            })
            .collect();

        let schema = self.schema(&canvas_id, cache).await?;
        let variables = VariableProcessor::new(self.api.as_ref())
            .process(&assignments, &schema, record)
            .await;
        debug!(index, canvas_id = %canvas_id, variable_count = variables.len(), "submitting completion");

        let response = self
            .api
            .create_completion(&CompletionRequest { canvas_id, variables })
            .await
            .map_err(ItemError::Completion)?;
        Ok(response.content())
    }

    async fn schema(&self, canvas_id: &str, cache: Option<&mut SchemaCache>) -> Result<Vec<VariableSpec>, ItemError> {
        let api = self.api.as_ref();
        let source = &self.options.schema_source;
        let result = match cache {
            Some(cache) => cache.schema_for(api, source, canvas_id).await,
            None => fetch_schema(api, source, canvas_id).await,
        };
        result.map_err(|source| ItemError::Schema {
            canvas_id: canvas_id.to_string(),
            source,
        })
    }
}
