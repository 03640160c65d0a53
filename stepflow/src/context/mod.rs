//! Execution context for pipeline runs.
//!
//! This module provides:
//! - the [`ExecutionContext`] threaded through every step of a run
//! - run [`Metadata`] for side-channel values and opaque handles
//! - the reserved metadata keys understood by the engine and its callers

mod execution;

pub use execution::{ExecutionContext, Metadata};

/// A JSON object, the shape of trigger data, step output and step config.
pub type Data = serde_json::Map<String, serde_json::Value>;

/// Name of the running pipeline.
pub const META_PIPELINE: &str = "pipeline";
/// Unique id of the run.
pub const META_EXECUTION_ID: &str = "execution_id";
/// RFC 3339 start time of the run.
pub const META_STARTED_AT: &str = "started_at";
/// RFC 3339 completion time of a successful run.
pub const META_COMPLETED_AT: &str = "completed_at";
/// Route pattern the pipeline was mounted under.
pub const META_ROUTE_PATTERN: &str = "route_pattern";
/// Handle key for the raw inbound request.
pub const META_RAW_REQUEST: &str = "_http_request";
/// Handle key for the raw response writer.
pub const META_RESPONSE_WRITER: &str = "_http_response_writer";
/// Set once a step has written the response itself.
pub const META_RESPONSE_HANDLED: &str = "_response_handled";
/// Steps that failed and were skipped, as `{step, error}` records.
pub const META_SKIPPED_STEPS: &str = "skipped_steps";
