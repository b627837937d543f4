//! Command-line input parsing: variable assignments, records files and local
//! attachments.

use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use canvas_types::{BinaryAttachment, InputRecord, VariableAssignment};
use serde_json::Value;
use tracing::debug;

/// Parse `name=value`; the value is taken verbatim as a string.
pub fn parse_assignment(raw: &str) -> Result<VariableAssignment> {
    let (name, value) = split_pair(raw)?;
    Ok(VariableAssignment::new(name, value))
}

/// Parse `name=<json>`; the value must be valid JSON.
pub fn parse_json_assignment(raw: &str) -> Result<VariableAssignment> {
    let (name, value) = split_pair(raw)?;
    let value: Value = serde_json::from_str(value).with_context(|| format!("value of '{name}' is not valid JSON"))?;
    Ok(VariableAssignment::new(name, value))
}

fn split_pair(raw: &str) -> Result<(&str, &str)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("missing name in '{raw}'");
    }
    Ok((name, value))
}

/// Read a records file: a JSON array of `{ "json": .., "binary": .. }`.
pub async fn load_records(path: &Path) -> Result<Vec<InputRecord>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read records file {}", path.display()))?;
    parse_records(&text).with_context(|| format!("invalid records file {}", path.display()))
}

fn parse_records(text: &str) -> Result<Vec<InputRecord>> {
    let records: Vec<InputRecord> = serde_json::from_str(text)?;
    debug!(count = records.len(), "parsed records");
    Ok(records)
}

/// Read a `name=path` attachment, guessing its MIME type from the extension.
pub async fn load_attachment(raw: &str) -> Result<(String, BinaryAttachment)> {
    let (name, path) = split_pair(raw)?;
    let path = Path::new(path.trim());
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read attachment '{name}' from {}", path.display()))?;
    Ok((name.to_string(), attachment_from_bytes(path, data)))
}

fn attachment_from_bytes(path: &Path, data: Vec<u8>) -> BinaryAttachment {
    let mime_type = mime_guess::from_path(path).first_or_octet_stream();
    let file_name = path
        .file_name()
        .map(|file_name| file_name.to_string_lossy().into_owned());
    BinaryAttachment::new(data, file_name, Some(mime_type.essence_str().to_string()))
}

/// Attach every `attachments` entry to every record.
///
/// Without records a single empty record carries the attachments.
pub fn attach_to_records(mut records: Vec<InputRecord>, attachments: &[(String, BinaryAttachment)]) -> Vec<InputRecord> {
    if attachments.is_empty() {
        return records;
    }
    if records.is_empty() {
        records.push(InputRecord::default());
    }
    for record in &mut records {
        for (name, attachment) in attachments {
            record.binary.insert(name.clone(), attachment.clone());
        }
    }
    records
}
