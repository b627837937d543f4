use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Submission-ready value of a canvas variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    /// A file that was uploaded and is referenced by its download URL.
    File { file_url: String },
    Text(String),
}

impl VariableValue {
    pub fn text(value: impl Into<String>) -> Self {
        VariableValue::Text(value.into())
    }

    pub fn file(file_url: impl Into<String>) -> Self {
        VariableValue::File {
            file_url: file_url.into(),
        }
    }
}

/// Body of `POST /v2/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub canvas_id: String,
    pub variables: IndexMap<String, VariableValue>,
}

/// Free-form completion response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionResponse(pub Value);

impl CompletionResponse {
    /// `choices[0].message.content`, or an empty object when it is absent or
    /// falsy (`null`, `false`, `0`, `""`).
    pub fn content(&self) -> Value {
        match self.0.pointer("/choices/0/message/content") {
            Some(content) if !is_falsy(content) => content.clone(),
            _ => Value::Object(Map::new()),
        }
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n == 0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Write-once upload capability returned by `POST /file`.
///
/// Not `Clone`: the transfer consumes the slot, so a failed transfer cannot be
/// retried against the same upload URL.
#[derive(Debug, PartialEq, Eq, Deserialize)]
pub struct UploadSlot {
    pub upload_url: String,
    pub download_url: String,
}

/// Back-reference from an outcome to the input record that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedItem {
    pub item: usize,
}

/// Result of processing one input record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub json: Value,
    pub paired_item: PairedItem,
}

impl ExecutionOutcome {
    pub fn success(index: usize, json: Value) -> Self {
        Self {
            json,
            paired_item: PairedItem { item: index },
        }
    }

    /// Error output recorded in place of a result under continue-on-fail.
    pub fn failure(index: usize, message: impl Into<String>) -> Self {
        let mut json = Map::new();
        json.insert("error".into(), Value::String(message.into()));
        Self {
            json: Value::Object(json),
            paired_item: PairedItem { item: index },
        }
    }

    pub fn index(&self) -> usize {
        self.paired_item.item
    }

    pub fn is_error(&self) -> bool {
        self.json.get("error").is_some_and(Value::is_string) && self.json.as_object().is_some_and(|map| map.len() == 1)
    }
}
