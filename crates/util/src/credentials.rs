//! API key lookup and storage.
//!
//! The key is read from `CANVAS_API_KEY` or the OS keychain (`keyring-rs`).
//! `~/.netrc` lookup lives next to the HTTP client in `canvas-api`.

use std::env;

use thiserror::Error;
use tracing::debug;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "CANVAS_API_KEY";

/// Keychain service name used for the stored API key.
pub const KEYCHAIN_SERVICE: &str = "canvas-cli";

/// Keychain account under which the API key is stored.
pub const KEYCHAIN_ACCOUNT: &str = "api-key";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Keyring error: {0}")]
    Keyring(String),
    #[error("API key must not be empty")]
    EmptyKey,
}

/// Read the API key from `CANVAS_API_KEY`, ignoring blank values.
pub fn api_key_from_env() -> Option<String> {
    env::var(API_KEY_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Read the API key from the OS keychain. A missing entry is `Ok(None)`.
pub fn api_key_from_keychain() -> Result<Option<String>, CredentialError> {
    let entry = keychain_entry()?;
    match entry.get_password() {
        Ok(secret) => Ok(Some(secret).filter(|value| !value.trim().is_empty())),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(error) => Err(CredentialError::Keyring(error.to_string())),
    }
}

/// Store the API key in the OS keychain.
pub fn store_api_key(value: &str) -> Result<(), CredentialError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CredentialError::EmptyKey);
    }
    keychain_entry()?
        .set_password(value)
        .map_err(|error| CredentialError::Keyring(error.to_string()))?;
    debug!(service = KEYCHAIN_SERVICE, "stored API key in keychain");
    Ok(())
}

/// Remove the API key from the OS keychain. Removing a missing entry succeeds.
pub fn remove_api_key() -> Result<(), CredentialError> {
    match keychain_entry()?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => {
            debug!(service = KEYCHAIN_SERVICE, "removed API key from keychain");
            Ok(())
        }
        Err(error) => Err(CredentialError::Keyring(error.to_string())),
    }
}

fn keychain_entry() -> Result<keyring::Entry, CredentialError> {
    keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT).map_err(|error| CredentialError::Keyring(error.to_string()))
}
