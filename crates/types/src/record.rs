use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{DEFAULT_FILE_NAME, DEFAULT_MIME_TYPE};

/// A user-supplied `(name, raw value)` pair for a canvas variable.
///
/// The raw value is arbitrary JSON: usually a string, but it may be an object
/// carrying inline binary data for file-typed variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableAssignment {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl VariableAssignment {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One unit of batch work.
///
/// Attachments keep insertion order; the first attachment is the fallback used
/// when a file-typed value names none of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    #[serde(default)]
    pub json: Value,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub binary: IndexMap<String, BinaryAttachment>,
}

impl InputRecord {
    pub fn from_json(json: Value) -> Self {
        Self {
            json,
            binary: IndexMap::new(),
        }
    }

    pub fn with_attachment(mut self, name: impl Into<String>, attachment: BinaryAttachment) -> Self {
        self.binary.insert(name.into(), attachment);
        self
    }

    pub fn attachment(&self, name: &str) -> Option<&BinaryAttachment> {
        self.binary.get(name)
    }

    /// First attachment in insertion order, with its name.
    pub fn first_attachment(&self) -> Option<(&str, &BinaryAttachment)> {
        self.binary.first().map(|(name, attachment)| (name.as_str(), attachment))
    }
}

/// Named binary payload carried by an input record.
///
/// On the wire `data` is a standard base64 string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryAttachment {
    #[serde(serialize_with = "serialize_base64", deserialize_with = "deserialize_base64")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl BinaryAttachment {
    pub fn new(data: Vec<u8>, file_name: Option<String>, mime_type: Option<String>) -> Self {
        Self {
            data,
            file_name,
            mime_type,
        }
    }

    pub fn file_name_or_default(&self) -> &str {
        self.file_name.as_deref().unwrap_or(DEFAULT_FILE_NAME)
    }

    pub fn mime_type_or_default(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE)
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

fn deserialize_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD.decode(encoded.trim()).map_err(serde::de::Error::custom)
}
