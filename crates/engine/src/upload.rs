//! File upload pipeline for file-typed canvas variables.
//!
//! A raw value is matched against the record in this order, first match wins:
//!
//! 1. a string naming an attachment of the record
//! 2. an object exposing binary fields directly (`{ "data": "<base64>", "fileName", "mimeType" }`)
//! 3. an object wrapping such a payload one level down (`{ "binary": {..} }` or `{ "data": { "data": .. } }`);
//!    a `binary` wrapper without data resolves to nothing
//! 4. the first attachment of the record
//! 5. nothing: the raw value's string form is submitted and no upload happens
//!
//! An empty `data` string does not count as a payload.
//!
//! A located payload is uploaded through the two-phase handshake: request a
//! slot, PUT the bytes to its upload URL, submit the download URL.

use std::borrow::Cow;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use canvas_api::{ApiError, CanvasApi};
use canvas_types::{DEFAULT_FILE_NAME, DEFAULT_MIME_TYPE, InputRecord, UploadSlot, VariableValue};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::variables::raw_string_form;

/// Failure to locate or transfer a file payload.
///
/// Never aborts a record: the variable processor logs it and submits the raw
/// value's string form instead.
#[derive(Debug, Error)]
pub enum FileResolutionError {
    #[error("{origin} does not carry valid base64 data: {error}")]
    InvalidPayload {
        origin: AttachmentOrigin,
        #[source]
        error: base64::DecodeError,
    },

    #[error("failed to request an upload slot: {0}")]
    SlotRequest(#[source] ApiError),

    #[error("failed to transfer '{file_name}': {source}")]
    Transfer {
        file_name: String,
        #[source]
        source: ApiError,
    },
}

/// Which resolution rule produced the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentOrigin {
    Named(String),
    Inline,
    Nested,
    Fallback(String),
}

impl fmt::Display for AttachmentOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentOrigin::Named(name) => write!(f, "attachment '{name}'"),
            AttachmentOrigin::Inline => write!(f, "inline payload"),
            AttachmentOrigin::Nested => write!(f, "nested payload"),
            AttachmentOrigin::Fallback(name) => write!(f, "fallback attachment '{name}'"),
        }
    }
}

/// Bytes and metadata of the payload chosen for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment<'a> {
    pub origin: AttachmentOrigin,
    pub data: Cow<'a, [u8]>,
    pub file_name: String,
    pub mime_type: String,
}

/// Uploads file payloads and turns them into `{ "file_url": .. }` values.
pub struct FileUploadPipeline<'a> {
    api: &'a dyn CanvasApi,
}

impl<'a> FileUploadPipeline<'a> {
    pub fn new(api: &'a dyn CanvasApi) -> Self {
        Self { api }
    }

    /// Resolve a file-typed raw value against `record`.
    ///
    /// Every call that finds a payload performs its own upload; identical
    /// values are not deduplicated.
    pub async fn resolve_file_value(&self, raw_value: &Value, record: &InputRecord) -> Result<VariableValue, FileResolutionError> {
        let Some(attachment) = locate_attachment(raw_value, record)? else {
            debug!("no attachment resolvable; submitting the raw value");
            return Ok(VariableValue::Text(raw_string_form(raw_value)));
        };
        if attachment.data.is_empty() {
            debug!(origin = %attachment.origin, "attachment is empty; submitting the raw value");
            return Ok(VariableValue::Text(raw_string_form(raw_value)));
        }

        let download_url = self.upload(attachment).await?;
        Ok(VariableValue::file(download_url))
    }

    async fn upload(&self, attachment: ResolvedAttachment<'_>) -> Result<String, FileResolutionError> {
        let UploadSlot {
            upload_url,
            download_url,
        } = self
            .api
            .create_upload_slot()
            .await
            .map_err(FileResolutionError::SlotRequest)?;

        let byte_count = attachment.data.len();
        self.api
            .put_file(&upload_url, attachment.data.into_owned(), &attachment.mime_type)
            .await
            .map_err(|source| FileResolutionError::Transfer {
                file_name: attachment.file_name.clone(),
                source,
            })?;

        info!(
            origin = %attachment.origin,
            file_name = %attachment.file_name,
            mime_type = %attachment.mime_type,
            byte_count,
            "file uploaded"
        );
        Ok(download_url)
    }
}

/// Apply the resolution order to find the payload for `raw_value`.
pub fn locate_attachment<'r>(
    raw_value: &Value,
    record: &'r InputRecord,
) -> Result<Option<ResolvedAttachment<'r>>, FileResolutionError> {
    if let Value::String(name) = raw_value
        && let Some(attachment) = record.attachment(name)
    {
        return Ok(Some(ResolvedAttachment {
            origin: AttachmentOrigin::Named(name.clone()),
            data: Cow::Borrowed(attachment.data.as_slice()),
            file_name: attachment.file_name_or_default().to_string(),
            mime_type: attachment.mime_type_or_default().to_string(),
        }));
    }

    if let Value::Object(object) = raw_value {
        if let Some(encoded) = non_empty_data(object) {
            return decode_inline(AttachmentOrigin::Inline, encoded, object).map(Some);
        }
        // A `binary` wrapper claims the value: without data there is nothing to upload.
        if let Some(nested) = object.get("binary").and_then(Value::as_object) {
            return match non_empty_data(nested) {
                Some(encoded) => decode_inline(AttachmentOrigin::Nested, encoded, nested).map(Some),
                None => Ok(None),
            };
        }
        if let Some(nested) = object.get("data").and_then(Value::as_object)
            && let Some(encoded) = non_empty_data(nested)
        {
            return decode_inline(AttachmentOrigin::Nested, encoded, nested).map(Some);
        }
    }

    Ok(record.first_attachment().map(|(name, attachment)| ResolvedAttachment {
        origin: AttachmentOrigin::Fallback(name.to_string()),
        data: Cow::Borrowed(attachment.data.as_slice()),
        file_name: attachment.file_name_or_default().to_string(),
        mime_type: attachment.mime_type_or_default().to_string(),
    }))
}

/// The `data` field when it is a non-empty string.
fn non_empty_data(object: &Map<String, Value>) -> Option<&str> {
    object
        .get("data")
        .and_then(Value::as_str)
        .filter(|encoded| !encoded.is_empty())
}

fn decode_inline(
    origin: AttachmentOrigin,
    encoded: &str,
    fields: &Map<String, Value>,
) -> Result<ResolvedAttachment<'static>, FileResolutionError> {
    let data = STANDARD
        .decode(encoded.trim())
        .map_err(|error| FileResolutionError::InvalidPayload {
            origin: origin.clone(),
            error,
        })?;
    let text_field = |key: &str, default: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .unwrap_or(default)
            .to_string()
    };
    Ok(ResolvedAttachment {
        origin,
        data: Cow::Owned(data),
        file_name: text_field("fileName", DEFAULT_FILE_NAME),
        mime_type: text_field("mimeType", DEFAULT_MIME_TYPE),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Call, FakeCanvasApi};
    use canvas_types::BinaryAttachment;
    use serde_json::json;

    fn attachment(data: &[u8], file_name: &str, mime_type: &str) -> BinaryAttachment {
        BinaryAttachment::new(data.to_vec(), Some(file_name.into()), Some(mime_type.into()))
    }

    fn two_attachment_record() -> InputRecord {
        InputRecord::default()
            .with_attachment("invoice", attachment(b"pdf-bytes", "invoice.pdf", "application/pdf"))
            .with_attachment("photo", attachment(b"png-bytes", "photo.png", "image/png"))
    }

    #[test]
    fn named_attachment_wins_over_fallback() {
        let record = two_attachment_record();
        let resolved = locate_attachment(&json!("photo"), &record)
            .expect("resolution")
            .expect("attachment");
        assert_eq!(resolved.origin, AttachmentOrigin::Named("photo".into()));
        assert_eq!(resolved.data.as_ref(), b"png-bytes");
        assert_eq!(resolved.mime_type, "image/png");
    }

    #[test]
    fn unknown_name_falls_back_to_first_attachment() {
        let record = two_attachment_record();
        let resolved = locate_attachment(&json!("nope"), &record)
            .expect("resolution")
            .expect("attachment");
        assert_eq!(resolved.origin, AttachmentOrigin::Fallback("invoice".into()));
        assert_eq!(resolved.file_name, "invoice.pdf");
    }

    #[test]
    fn inline_payload_is_decoded_with_defaults() {
        let record = two_attachment_record();
        let resolved = locate_attachment(&json!({ "data": "aGVsbG8=" }), &record)
            .expect("resolution")
            .expect("attachment");
        assert_eq!(resolved.origin, AttachmentOrigin::Inline);
        assert_eq!(resolved.data.as_ref(), b"hello");
        assert_eq!(resolved.file_name, DEFAULT_FILE_NAME);
        assert_eq!(resolved.mime_type, DEFAULT_MIME_TYPE);
    }

    #[test]
    fn nested_payloads_are_unwrapped_one_level() {
        let record = InputRecord::default();
        let wrapped = json!({ "binary": { "data": "aGk=", "fileName": "hi.txt", "mimeType": "text/plain" } });
        let resolved = locate_attachment(&wrapped, &record)
            .expect("resolution")
            .expect("attachment");
        assert_eq!(resolved.origin, AttachmentOrigin::Nested);
        assert_eq!(resolved.file_name, "hi.txt");

        let doubly = json!({ "data": { "data": "aGk=", "mimeType": "text/plain" } });
        let resolved = locate_attachment(&doubly, &record)
            .expect("resolution")
            .expect("attachment");
        assert_eq!(resolved.origin, AttachmentOrigin::Nested);
        assert_eq!(resolved.data.as_ref(), b"hi");
    }

    #[test]
    fn empty_inline_data_falls_back_to_first_attachment() {
        let record = two_attachment_record();
        let resolved = locate_attachment(&json!({ "data": "" }), &record)
            .expect("resolution")
            .expect("attachment");
        assert_eq!(resolved.origin, AttachmentOrigin::Fallback("invoice".into()));
        assert_eq!(resolved.data.as_ref(), b"pdf-bytes");
    }

    #[test]
    fn binary_wrapper_without_data_resolves_to_nothing() {
        let record = two_attachment_record();
        let wrapped = json!({ "binary": { "fileName": "missing.pdf" } });
        assert!(locate_attachment(&wrapped, &record).expect("resolution").is_none());
    }

    #[tokio::test]
    async fn binary_wrapper_without_data_is_submitted_as_text() {
        let api = FakeCanvasApi::default();
        let pipeline = FileUploadPipeline::new(&api);
        let wrapped = json!({ "binary": { "fileName": "missing.pdf" } });

        let value = pipeline
            .resolve_file_value(&wrapped, &two_attachment_record())
            .await
            .expect("resolution");

        assert_eq!(value, VariableValue::text(wrapped.to_string()));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn invalid_inline_payload_is_an_error() {
        let record = InputRecord::default();
        let error = locate_attachment(&json!({ "data": "***" }), &record).unwrap_err();
        assert!(matches!(
            error,
            FileResolutionError::InvalidPayload {
                origin: AttachmentOrigin::Inline,
                ..
            }
        ));
    }

    #[test]
    fn nothing_resolvable_without_attachments() {
        let record = InputRecord::default();
        assert!(locate_attachment(&json!("report.pdf"), &record).expect("resolution").is_none());
        assert!(locate_attachment(&json!({ "other": 1 }), &record).expect("resolution").is_none());
    }

    #[tokio::test]
    async fn upload_requests_slot_then_transfers_bytes() {
        let api = FakeCanvasApi::default();
        let pipeline = FileUploadPipeline::new(&api);
        let record = two_attachment_record();

        let value = pipeline
            .resolve_file_value(&json!("invoice"), &record)
            .await
            .expect("upload");

        assert_eq!(value, VariableValue::file("https://files.example/download/1"));
        assert_eq!(
            api.calls(),
            vec![
                Call::UploadSlot,
                Call::PutFile {
                    upload_url: "https://storage.example/upload/1".into(),
                    bytes: b"pdf-bytes".to_vec(),
                    mime_type: "application/pdf".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn unresolvable_value_is_submitted_as_text_without_upload() {
        let api = FakeCanvasApi::default();
        let pipeline = FileUploadPipeline::new(&api);

        let value = pipeline
            .resolve_file_value(&json!("https://example.com/a.pdf"), &InputRecord::default())
            .await
            .expect("resolution");

        assert_eq!(value, VariableValue::text("https://example.com/a.pdf"));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_transfer_surfaces_error_and_slot_is_not_reused() {
        let api = FakeCanvasApi::default().failing_transfer();
        let pipeline = FileUploadPipeline::new(&api);

        let error = pipeline
            .resolve_file_value(&json!("photo"), &two_attachment_record())
            .await
            .unwrap_err();

        assert!(matches!(error, FileResolutionError::Transfer { ref file_name, .. } if file_name == "photo.png"));
        assert_eq!(api.count(|call| matches!(call, Call::PutFile { .. })), 1);
        assert_eq!(api.count(|call| matches!(call, Call::UploadSlot)), 1);
    }

    #[tokio::test]
    async fn failed_slot_request_skips_transfer() {
        let api = FakeCanvasApi::default().failing_slot();
        let pipeline = FileUploadPipeline::new(&api);

        let error = pipeline
            .resolve_file_value(&json!("photo"), &two_attachment_record())
            .await
            .unwrap_err();

        assert!(matches!(error, FileResolutionError::SlotRequest(_)));
        assert_eq!(api.count(|call| matches!(call, Call::PutFile { .. })), 0);
    }
}
