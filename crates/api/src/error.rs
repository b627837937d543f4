use canvas_util::http::{JsonParseError, RESPONSE_PREVIEW_LIMIT, status_error_message, truncate_response_preview};
use canvas_util::redact_sensitive;
use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a call against the canvas service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service answered with a non-2xx status.
    #[error("HTTP error! status: {status}, message: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response (DNS, TLS, connection reset, ...).
    #[error("network error during {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The body was not JSON.
    #[error(transparent)]
    Decode(#[from] JsonParseError),

    /// The body was JSON but did not have the expected shape.
    #[error("unexpected response shape for {operation}: {source}")]
    Shape {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid canvas API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("no API key configured. Hint: set CANVAS_API_KEY=..., pass --api-key, or run `canvas auth login`")]
    MissingApiKey,

    #[error("API key contains characters that cannot be sent in a header")]
    InvalidApiKey,

    #[error("could not build the HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl ApiError {
    /// Build a status error from a response, embedding a redacted preview of the body.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let reason = status.canonical_reason().unwrap_or("Unknown status");
        let mut message = reason.to_string();
        if !body.trim().is_empty() {
            let preview = truncate_response_preview(&redact_sensitive(body), RESPONSE_PREVIEW_LIMIT);
            message.push_str(": ");
            message.push_str(&preview);
        }
        if let Some(hint) = status_error_message(status.as_u16()) {
            message.push_str(". ");
            message.push_str(&hint);
        }
        ApiError::Status {
            status: status.as_u16(),
            message,
        }
    }

    /// HTTP status of the failure, when the service produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport { source, .. } => source.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}
