//! Builds the submission mapping of one record from the user's assignments.

use canvas_api::CanvasApi;
use canvas_types::{InputRecord, VariableAssignment, VariableKind, VariableSpec, VariableValue};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::upload::FileUploadPipeline;

/// Matches assignments against a canvas schema and produces submission values.
pub struct VariableProcessor<'a> {
    uploads: FileUploadPipeline<'a>,
}

impl<'a> VariableProcessor<'a> {
    pub fn new(api: &'a dyn CanvasApi) -> Self {
        Self {
            uploads: FileUploadPipeline::new(api),
        }
    }

    /// Produce the `name -> value` mapping submitted with the completion.
    ///
    /// Assignments naming no schema entry and assignments with an empty raw
    /// value are dropped. A later assignment with the same name replaces an
    /// earlier one. File payloads that cannot be located or uploaded degrade
    /// to the raw value's string form.
    pub async fn process(
        &self,
        assignments: &[VariableAssignment],
        schema: &[VariableSpec],
        record: &InputRecord,
    ) -> IndexMap<String, VariableValue> {
        let mut variables = IndexMap::new();

        for assignment in assignments {
            let Some(spec) = schema.iter().find(|spec| spec.name == assignment.name) else {
                debug!(variable = %assignment.name, "not declared by the canvas; skipping");
                continue;
            };
            if is_empty_value(&assignment.value) {
                debug!(variable = %assignment.name, "empty value; skipping");
                continue;
            }

            let value = match spec.kind {
                VariableKind::File => match self.uploads.resolve_file_value(&assignment.value, record).await {
                    Ok(value) => value,
                    Err(error) => {
                        warn!(variable = %assignment.name, error = %error, "file processing failed; submitting the raw value");
                        VariableValue::Text(raw_string_form(&assignment.value))
                    }
                },
                VariableKind::Json | VariableKind::Text => VariableValue::Text(raw_string_form(&assignment.value)),
            };
            variables.insert(assignment.name.clone(), value);
        }

        variables
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// String form of a raw value: strings verbatim, everything else as JSON text.
pub(crate) fn raw_string_form(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
