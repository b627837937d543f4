//! # Canvas Engine
//!
//! Turns user variable assignments and input records into canvas completions.
//!
//! ## Key Features
//!
//! - **Batch Execution**: One completion per input record, in order, with a
//!   continue-on-fail policy
//! - **Variable Processing**: Matches assignments against the canvas schema and
//!   uploads file payloads through a two-phase slot handshake
//! - **Option Lookups**: Projects, canvases and canvas variables for dependent
//!   selection lists
//! - **Template Interpolation**: Per-record `${{ ... }}` substitution
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use canvas_api::CanvasClient;
//! use canvas_engine::{BatchExecutor, BatchOptions, ExecutionRequest};
//! use canvas_types::{InputRecord, VariableAssignment};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(CanvasClient::from_env(None)?);
//! let executor = BatchExecutor::new(client, BatchOptions::default());
//! let request = ExecutionRequest::new("canvas-id", vec![VariableAssignment::new("topic", "${{ record.topic }}")]);
//! let records = vec![InputRecord::from_json(json!({ "topic": "rust" }))];
//!
//! for outcome in executor.execute(&request, &records).await? {
//!     println!("{}: {}", outcome.index(), outcome.json);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`executor`**: Batch state machine and failure policy
//! - **`variables`**: Assignment to submission-value mapping
//! - **`upload`**: Attachment resolution and upload handshake
//! - **`options`**: Dependent option lookups
//! - **`schema`**: Schema lookup and the per-batch cache
//! - **`resolve`**: Template interpolation

pub mod executor;
pub mod options;
pub mod resolve;
pub mod schema;
pub mod upload;
pub mod variables;

#[cfg(test)]
mod test_support;

pub use executor::{BatchError, BatchExecutor, BatchOptions, ExecutionRequest, ItemError};
pub use options::{LookupError, LookupSubject, OptionResolver};
pub use schema::{SchemaCache, SchemaSource, fetch_schema};
pub use upload::{AttachmentOrigin, FileResolutionError, FileUploadPipeline};
pub use variables::VariableProcessor;
