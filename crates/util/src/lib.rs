//! Helpers shared by the canvas runner crates: secret redaction, HTTP response
//! parsing and API key lookup.

use once_cell::sync::Lazy;
use regex::Regex;

pub mod credentials;
pub mod http;

pub use credentials::{CredentialError, api_key_from_env, api_key_from_keychain, remove_api_key, store_api_key};

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(bearer )([\w\-\.=:/+]+)",
        r"(?i)(authorization: )([\w\-\.=:/+]+)",
        r"(?i)([A-Z0-9_]*?(KEY|TOKEN|SECRET|PASSWORD)=)([^\s&]+)",
        r"(?i)([?&](X-Amz-Signature|X-Amz-Credential|sig|signature|token)=)([^\s&]+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Redacts values that look like secrets in a string.
///
/// Covers bearer tokens, `*_KEY=`-style assignments and the signature
/// parameters of pre-signed upload URLs.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in SECRET_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{}<redacted>", prefix)
            })
            .to_string();
    }
    redacted
}
