use serde::{Deserialize, Serialize};

use crate::null_as_default;

/// A project groups canvases inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

/// A canvas as returned by the listing endpoint.
///
/// The listing is requested with `includeLastVersion=true`, so each definition
/// normally carries the most recent version and its declared variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasDefinition {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_version: Option<CanvasVersion>,
}

impl CanvasDefinition {
    /// Variables declared by the last version, or an empty slice when the
    /// listing omitted the version.
    pub fn variables(&self) -> &[VariableSpec] {
        self.last_version
            .as_ref()
            .map(|version| version.variables.as_slice())
            .unwrap_or_default()
    }
}

/// A single version of a canvas. Only the variable schema is modelled; the
/// remaining version metadata is ignored on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasVersion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub variables: Vec<VariableSpec>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub promoted: bool,
}

/// Declared input variable of a canvas. `name` is unique within a canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: VariableKind,
    #[serde(default, deserialize_with = "null_as_default")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Kind tag of a canvas variable.
///
/// Unknown tags sent by the service deserialize as [`VariableKind::Text`], which
/// submits the raw value's string form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    Json,
    File,
    #[default]
    #[serde(other)]
    Text,
}

impl VariableKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VariableKind::Text => "text",
            VariableKind::Json => "json",
            VariableKind::File => "file",
        }
    }
}
