//! Shared type definitions for the canvas runner.
//!
//! The types in this crate mirror the remote prompt-execution service's wire
//! format (projects, canvases, variable schemas, completions, upload slots) and
//! the host-side batch model (input records with binary attachments, execution
//! outcomes, option lists for dependent selections).

mod canvas;
mod completion;
mod options;
mod record;

pub use canvas::{CanvasDefinition, CanvasVersion, Project, VariableKind, VariableSpec};
pub use completion::{CompletionRequest, CompletionResponse, ExecutionOutcome, PairedItem, UploadSlot, VariableValue};
pub use options::{OptionItem, OptionKind};
pub use record::{BinaryAttachment, InputRecord, VariableAssignment};

use serde::{Deserialize, Deserializer};

/// MIME type used when an attachment does not declare one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// File name used when an attachment does not declare one.
pub const DEFAULT_FILE_NAME: &str = "file";

/// Deserialize an explicit `null` the same way as a missing field.
///
/// Use together with `#[serde(default)]`.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
