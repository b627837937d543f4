//! # Per-record template resolution
//!
//! Execution parameters (the canvas identifier and every variable assignment)
//! may reference the record being processed through `${{ ... }}` templates.
//!
//! - `${{ record.field }}` - Field of the record's JSON body (dot path, numeric
//!   segments or `[n]` index the arrays)
//! - `${{ record }}` - The whole JSON body
//! - `${{ item.index }}` - 0-based position of the record in the batch
//! - `${{ env.NAME }}` - Environment variable captured for the batch
//!
//! A string that consists of exactly one template resolves to the referenced
//! JSON value itself, so objects can flow into file-typed variables. Templates
//! embedded in longer text are stringified. Unresolvable references render as
//! the empty string.
//!
//! ```rust
//! use canvas_engine::resolve::{RecordContext, interpolate_value};
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! let record = json!({ "customer": { "name": "Acme" }, "tags": ["a", "b"] });
//! let env = HashMap::new();
//! let context = RecordContext::new(2, &record, &env);
//!
//! let value = json!({
//!     "greeting": "Hello ${{ record.customer.name }} (#${{ item.index }})",
//!     "customer": "${{ record.customer }}",
//!     "first_tag": "${{ record.tags[0] }}"
//! });
//! let resolved = interpolate_value(&value, &context);
//! assert_eq!(resolved["greeting"], "Hello Acme (#2)");
//! assert_eq!(resolved["customer"], json!({ "name": "Acme" }));
//! assert_eq!(resolved["first_tag"], "a");
//! ```

use std::collections::HashMap;

use serde_json::Value;

const TEMPLATE_START: &str = "${{";
const TEMPLATE_END: &str = "}}";

/// Data available to templates while one record is processed.
#[derive(Debug, Clone, Copy)]
pub struct RecordContext<'a> {
    /// Position of the record in the batch.
    pub index: usize,
    /// JSON body of the record.
    pub record: &'a Value,
    /// Environment captured when the batch was configured.
    pub environment_variables: &'a HashMap<String, String>,
}

impl<'a> RecordContext<'a> {
    pub fn new(index: usize, record: &'a Value, environment_variables: &'a HashMap<String, String>) -> Self {
        Self {
            index,
            record,
            environment_variables,
        }
    }
}

/// Recursively interpolates all template expressions in a JSON value.
pub fn interpolate_value(value: &Value, context: &RecordContext<'_>) -> Value {
    match value {
        Value::String(string_value) => match whole_template_expression(string_value) {
            Some(expression) => resolve_value(expression, context).unwrap_or_else(|| Value::String(String::new())),
            None => Value::String(interpolate_string(string_value, context)),
        },
        Value::Array(array_values) => Value::Array(
            array_values
                .iter()
                .map(|array_value| interpolate_value(array_value, context))
                .collect(),
        ),
        Value::Object(object_map) => {
            let mut interpolated_map = serde_json::Map::new();
            for (key, value) in object_map.iter() {
                interpolated_map.insert(key.clone(), interpolate_value(value, context));
            }
            Value::Object(interpolated_map)
        }
        _ => value.clone(),
    }
}

/// Interpolates template expressions in a string, stringifying every result.
///
/// A template without a closing `}}` is preserved verbatim along with the
/// rest of the string.
pub fn interpolate_string(input_string: &str, context: &RecordContext<'_>) -> String {
    if !input_string.contains(TEMPLATE_START) {
        return input_string.to_string();
    }

    let mut output_string = String::new();
    let mut remaining_string = input_string;

    while let Some(template_start) = remaining_string.find(TEMPLATE_START) {
        let (string_before_template, string_after_template) = remaining_string.split_at(template_start);
        output_string.push_str(string_before_template);

        if let Some(template_end_index) = string_after_template.find(TEMPLATE_END) {
            let template_expression = string_after_template[TEMPLATE_START.len()..template_end_index].trim();
            let resolved_value = resolve_value(template_expression, context)
                .map(|value| format_json_value(&value))
                .unwrap_or_default();
            output_string.push_str(&resolved_value);
            remaining_string = &string_after_template[template_end_index + TEMPLATE_END.len()..];
        } else {
            output_string.push_str(string_after_template);
            return output_string;
        }
    }

    output_string.push_str(remaining_string);
    output_string
}

/// Returns the inner expression when `value` is exactly one template.
fn whole_template_expression(value: &str) -> Option<&str> {
    let inner = value
        .trim()
        .strip_prefix(TEMPLATE_START)?
        .strip_suffix(TEMPLATE_END)?;
    if inner.contains(TEMPLATE_START) || inner.contains(TEMPLATE_END) {
        return None;
    }
    Some(inner.trim())
}

fn resolve_value(expression: &str, context: &RecordContext<'_>) -> Option<Value> {
    if let Some(variable_name) = expression.strip_prefix("env.") {
        return context
            .environment_variables
            .get(variable_name)
            .map(|value| Value::String(value.clone()));
    }

    if expression == "item.index" {
        return Some(Value::from(context.index));
    }

    if expression == "record" {
        return Some(context.record.clone());
    }

    let path = expression.strip_prefix("record.")?;
    select_path(context.record, path)
}

/// Select a nested JSON value by a dot path with optional numeric indices.
///
/// Supports segments like `a`, `a.b`, `a.0` and `a[0].b[1]`. Returns `None`
/// when any segment is missing or applied to the wrong JSON type.
pub fn select_path(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for segment in path.trim().split('.') {
        if segment.is_empty() {
            continue;
        }
        let (key, indices) = split_indices(segment);
        if !key.is_empty() {
            current = match current {
                Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                _ => current.get(key)?,
            };
        }
        for index in indices {
            current = current.get(index)?;
        }
    }
    Some(current.clone())
}

fn split_indices(segment: &str) -> (&str, Vec<usize>) {
    let key_end = segment.find('[').unwrap_or(segment.len());
    let key = &segment[..key_end];
    let mut indices = Vec::new();
    let mut rest = &segment[key_end..];
    while let Some(after_open) = rest.strip_prefix('[') {
        let Some(close) = after_open.find(']') else {
            break;
        };
        if let Ok(index) = after_open[..close].parse::<usize>() {
            indices.push(index);
        }
        rest = &after_open[close + 1..];
    }
    (key, indices)
}

fn format_json_value(value: &Value) -> String {
    match value {
        Value::String(string_value) => string_value.clone(),
        Value::Null => String::new(),
        other_value => other_value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env() -> HashMap<String, String> {
        HashMap::from([("REGION".to_string(), "eu".to_string())])
    }

    #[test]
    fn interpolates_record_fields_index_and_env() {
        let record = json!({ "user": { "name": "ada", "langs": ["rust", "ml"] } });
        let environment = env();
        let context = RecordContext::new(4, &record, &environment);

        assert_eq!(
            interpolate_string("${{ record.user.name }}@${{ env.REGION }}/${{ item.index }}", &context),
            "ada@eu/4"
        );
        assert_eq!(interpolate_string("${{ record.user.langs.1 }}", &context), "ml");
        assert_eq!(interpolate_string("${{ record.user.langs[0] }}", &context), "rust");
    }

    #[test]
    fn whole_template_keeps_json_type() {
        let record = json!({ "upload": { "data": "aGk=", "mimeType": "text/plain" }, "count": 3 });
        let environment = HashMap::new();
        let context = RecordContext::new(0, &record, &environment);

        assert_eq!(
            interpolate_value(&json!("${{ record.upload }}"), &context),
            json!({ "data": "aGk=", "mimeType": "text/plain" })
        );
        assert_eq!(interpolate_value(&json!(" ${{ record.count }} "), &context), json!(3));
        assert_eq!(interpolate_value(&json!("n=${{ record.count }}"), &context), json!("n=3"));
    }

    #[test]
    fn missing_references_render_empty() {
        let record = json!({});
        let environment = HashMap::new();
        let context = RecordContext::new(0, &record, &environment);

        assert_eq!(interpolate_value(&json!("${{ record.absent }}"), &context), json!(""));
        assert_eq!(interpolate_string("a${{ env.NOPE }}b", &context), "ab");
        assert_eq!(interpolate_string("${{ unknown.thing }}", &context), "");
    }

    #[test]
    fn unterminated_template_is_preserved() {
        let record = json!({ "a": 1 });
        let environment = HashMap::new();
        let context = RecordContext::new(0, &record, &environment);
        assert_eq!(interpolate_string("x ${{ record.a", &context), "x ${{ record.a");
        assert_eq!(interpolate_string("plain text", &context), "plain text");
    }
}
