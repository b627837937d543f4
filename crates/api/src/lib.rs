//! Canvas service API client.
//!
//! This crate provides a lightweight client for the remote prompt-execution
//! service. It focuses on:
//!
//! - Constructing an HTTP client with sensible defaults
//! - Discovering the API key from an explicit value, `CANVAS_API_KEY`, the OS
//!   keychain or `~/.netrc`
//! - Validating `CANVAS_API_BASE` for safety
//! - Exposing the service operations behind the [`CanvasApi`] trait so the
//!   execution engine can be driven by a fake in tests
//!
//! # Example
//!
//! ```ignore
//! use canvas_api::{CanvasApi, CanvasClient};
//!
//! # async fn demo() -> Result<(), canvas_api::ApiError> {
//! let client = CanvasClient::from_env(None)?;
//! for project in client.list_projects().await? {
//!     println!("{} {}", project.id, project.title);
//! }
//! # Ok(())
//! # }
//! ```

mod error;

use std::time::{Duration, Instant};
use std::{env, fs};

use async_trait::async_trait;
use canvas_types::{CanvasDefinition, CompletionRequest, CompletionResponse, Project, UploadSlot, VariableSpec};
use canvas_util::http::parse_response_json_strict;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::{Client, Method, RequestBuilder, Url, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub use error::ApiError;

/// Default public API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.tela.com";

/// Environment variable overriding the API base URL.
pub const API_BASE_ENV: &str = "CANVAS_API_BASE";

/// Machine name looked up in `~/.netrc`.
pub const NETRC_MACHINE: &str = "api.tela.com";

/// Allowed hostnames or base domains for non-local base URLs. Subdomains of
/// these domains are also allowed.
const ALLOWED_API_DOMAINS: &[&str] = &["tela.com"];
/// Hostnames allowed for local development regardless of scheme.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

const PROJECTS_PATH: &str = "/project";
const PROMPTS_PATH: &str = "/prompt";
const COMPLETIONS_PATH: &str = "/v2/chat/completions";
const FILES_PATH: &str = "/file";

/// Characters escaped when an identifier is placed in a path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'/').add(b'?').add(b'#').add(b'%').add(b'"');

/// Operations the execution pipeline needs from the canvas service.
///
/// Every call is a single request/response exchange: no retries, and a
/// non-2xx status or transport failure surfaces immediately as [`ApiError`].
#[async_trait]
pub trait CanvasApi: Send + Sync {
    /// `GET /project`
    async fn list_projects(&self) -> Result<Vec<Project>, ApiError>;

    /// `GET /prompt?projectId=..&includeStats=false&includeLastVersion=true`
    async fn list_canvases(&self, project_id: &str) -> Result<Vec<CanvasDefinition>, ApiError>;

    /// `GET /prompt/<canvas_id>/promoted-version`, reduced to its variables.
    async fn get_canvas_variables(&self, canvas_id: &str) -> Result<Vec<VariableSpec>, ApiError>;

    /// `POST /v2/chat/completions`
    async fn create_completion(&self, request: &CompletionRequest) -> Result<CompletionResponse, ApiError>;

    /// `POST /file`, first half of the upload handshake.
    async fn create_upload_slot(&self) -> Result<UploadSlot, ApiError>;

    /// `PUT <upload_url>` with the raw bytes, second half of the handshake.
    async fn put_file(&self, upload_url: &str, bytes: Vec<u8>, mime_type: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client` for the canvas service.
///
/// Requests against the API host carry the bearer token; direct transfers to
/// pre-signed upload URLs do not.
pub struct CanvasClient {
    pub base_url: String,
    pub http: Client,
    pub user_agent: String,
    authorization: header::HeaderValue,
}

#[derive(Debug, Deserialize)]
struct PromotedVersion {
    #[serde(default, deserialize_with = "canvas_types::null_as_default")]
    variables: Vec<VariableSpec>,
}

impl CanvasClient {
    /// Construct a client for an explicit API key and base URL.
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, ApiError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ApiError::MissingApiKey);
        }
        let mut authorization =
            header::HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|_| ApiError::InvalidApiKey)?;
        authorization.set_sensitive(true);

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(ApiError::ClientBuild)?;

        let base_url = base_url.trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;

        Ok(Self {
            base_url,
            http,
            user_agent: format!("canvas-cli/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
            authorization,
        })
    }

    /// Construct a client from the environment.
    ///
    /// Resolution order for the API key:
    /// - `explicit_key`, when provided
    /// - `CANVAS_API_KEY` environment variable
    /// - OS keychain entry written by `canvas auth login`
    /// - `~/.netrc` entry for `api.tela.com` (password = token)
    ///
    /// The base URL is taken from `CANVAS_API_BASE` or falls back to
    /// [`DEFAULT_API_BASE`].
    pub fn from_env(explicit_key: Option<String>) -> Result<Self, ApiError> {
        let api_key = resolve_api_key(explicit_key).ok_or(ApiError::MissingApiKey)?;
        let base_url = env::var(API_BASE_ENV).unwrap_or_else(|_| DEFAULT_API_BASE.into());
        Self::new(&api_key, &base_url)
    }

    /// Build a `reqwest::RequestBuilder` for a method and API-relative path.
    ///
    /// The request carries the User-Agent, the bearer token and a JSON
    /// content type.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "building request");

        self.http
            .request(method, url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::AUTHORIZATION, self.authorization.clone())
            .header(header::CONTENT_TYPE, "application/json")
    }

    fn canvases_request(&self, project_id: &str) -> RequestBuilder {
        self.request(Method::GET, PROMPTS_PATH).query(&[
            ("projectId", project_id),
            ("includeStats", "false"),
            ("includeLastVersion", "true"),
        ])
    }

    fn promoted_version_request(&self, canvas_id: &str) -> RequestBuilder {
        let path = format!(
            "{}/{}/promoted-version",
            PROMPTS_PATH,
            utf8_percent_encode(canvas_id, PATH_SEGMENT)
        );
        self.request(Method::GET, &path)
    }

    fn upload_request(&self, upload_url: &str, bytes: Vec<u8>, mime_type: &str) -> RequestBuilder {
        self.http
            .put(upload_url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::CONTENT_TYPE, mime_type)
            .body(bytes)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, operation: &'static str) -> Result<T, ApiError> {
        let start = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|source| ApiError::Transport { operation, source })?;
        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|source| ApiError::Transport { operation, source })?;

        if !status.is_success() {
            warn!(
                operation,
                status = %status,
                duration_ms = start.elapsed().as_millis(),
                "canvas request failed"
            );
            return Err(ApiError::from_status(status, &body_text));
        }

        let value = parse_response_json_strict(&body_text, Some(status))?;
        debug!(
            operation,
            status = %status,
            body_len = body_text.len(),
            duration_ms = start.elapsed().as_millis(),
            "canvas request completed"
        );
        serde_json::from_value(value).map_err(|source| ApiError::Shape { operation, source })
    }
}

#[async_trait]
impl CanvasApi for CanvasClient {
    async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        self.send_json(self.request(Method::GET, PROJECTS_PATH), "list projects").await
    }

    async fn list_canvases(&self, project_id: &str) -> Result<Vec<CanvasDefinition>, ApiError> {
        self.send_json(self.canvases_request(project_id), "list canvases").await
    }

    async fn get_canvas_variables(&self, canvas_id: &str) -> Result<Vec<VariableSpec>, ApiError> {
        let version: PromotedVersion = self
            .send_json(self.promoted_version_request(canvas_id), "get canvas variables")
            .await?;
        Ok(version.variables)
    }

    async fn create_completion(&self, request: &CompletionRequest) -> Result<CompletionResponse, ApiError> {
        debug!(
            canvas_id = %request.canvas_id,
            variable_count = request.variables.len(),
            "submitting completion"
        );
        let builder = self.request(Method::POST, COMPLETIONS_PATH).json(request);
        self.send_json(builder, "create completion").await
    }

    async fn create_upload_slot(&self) -> Result<UploadSlot, ApiError> {
        self.send_json(self.request(Method::POST, FILES_PATH), "create upload slot")
            .await
    }

    async fn put_file(&self, upload_url: &str, bytes: Vec<u8>, mime_type: &str) -> Result<(), ApiError> {
        let operation = "upload file";
        let start = Instant::now();
        let byte_count = bytes.len();
        let response = self
            .upload_request(upload_url, bytes, mime_type)
            .send()
            .await
            .map_err(|source| ApiError::Transport { operation, source })?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            warn!(operation, status = %status, byte_count, "file transfer failed");
            return Err(ApiError::from_status(status, &body_text));
        }
        debug!(
            operation,
            status = %status,
            byte_count,
            mime_type,
            duration_ms = start.elapsed().as_millis(),
            "file transfer completed"
        );
        Ok(())
    }
}

/// Resolve the API key: explicit value, environment, keychain, then `~/.netrc`.
pub fn resolve_api_key(explicit_key: Option<String>) -> Option<String> {
    if let Some(key) = explicit_key.map(|key| key.trim().to_string()).filter(|key| !key.is_empty()) {
        return Some(key);
    }
    if let Some(key) = canvas_util::api_key_from_env() {
        return Some(key);
    }
    match canvas_util::api_key_from_keychain() {
        Ok(Some(key)) => return Some(key),
        Ok(None) => {}
        Err(error) => debug!(%error, "keychain lookup skipped"),
    }
    get_netrc_token()
}

/// Validate that a base URL is acceptable for use by the client.
///
/// Rules:
/// - `localhost` or `127.0.0.1`: any scheme is allowed
/// - otherwise: scheme must be HTTPS, and host must be one of the allowed
///   domains or a subdomain thereof
pub fn validate_base_url(base: &str) -> Result<(), ApiError> {
    let invalid = |reason: String| ApiError::InvalidBaseUrl {
        url: base.to_string(),
        reason,
    };
    let parsed_base_url = Url::parse(base).map_err(|error| invalid(error.to_string()))?;

    let host_name = parsed_base_url
        .host_str()
        .ok_or_else(|| invalid("the URL must include a host".into()))?;

    if LOCALHOST_DOMAINS
        .iter()
        .any(|&allowed| host_name.eq_ignore_ascii_case(allowed))
    {
        return Ok(());
    }

    if parsed_base_url.scheme() != "https" {
        return Err(invalid(format!(
            "https is required for non-localhost hosts; got '{}://'",
            parsed_base_url.scheme()
        )));
    }

    let is_allowed_domain = ALLOWED_API_DOMAINS.iter().any(|&allowed_domain| {
        host_name.eq_ignore_ascii_case(allowed_domain) || host_name.ends_with(&format!(".{}", allowed_domain))
    });
    if !is_allowed_domain {
        return Err(invalid(format!(
            "host '{}' is not allowed; must be one of {:?} or a subdomain, or localhost",
            host_name, ALLOWED_API_DOMAINS
        )));
    }

    Ok(())
}

fn get_netrc_token() -> Option<String> {
    let home = dirs_next::home_dir()?;
    let content = fs::read_to_string(home.join(".netrc")).ok()?;
    parse_netrc_token(&content, NETRC_MACHINE)
}

/// Small `.netrc` reader: returns the `password` of the `machine` stanza.
///
/// ```text
/// machine api.tela.com
///   login me@example.com
///   password <TOKEN>
/// ```
fn parse_netrc_token(content: &str, machine: &str) -> Option<String> {
    let mut in_machine = false;
    let mut tokens = content.split_whitespace();

    while let Some(token) = tokens.next() {
        match token {
            "machine" => in_machine = tokens.next() == Some(machine),
            "default" => in_machine = false,
            "password" if in_machine => return tokens.next().map(str::to_string),
            "login" | "account" | "password" => {
                tokens.next();
            }
            _ => {}
        }
    }
    None
}
