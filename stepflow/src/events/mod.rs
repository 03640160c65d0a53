//! Execution events emitted by pipelines.
//!
//! Pipelines report their progress to an [`EventSink`]. The event type
//! strings are fixed and listed in [`event_types`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted during a pipeline run.
pub mod event_types {
    /// A run began.
    pub const EXECUTION_STARTED: &str = "execution.started";
    /// A run finished successfully.
    pub const EXECUTION_COMPLETED: &str = "execution.completed";
    /// A run aborted with an error.
    pub const EXECUTION_FAILED: &str = "execution.failed";
    /// A step began executing.
    pub const STEP_STARTED: &str = "step.started";
    /// A step returned a result.
    pub const STEP_COMPLETED: &str = "step.completed";
    /// A step returned an error.
    pub const STEP_FAILED: &str = "step.failed";
    /// A failed step was skipped under the `skip` strategy.
    pub const STEP_SKIPPED: &str = "step.skipped";
    /// Compensation steps are about to run.
    pub const SAGA_COMPENSATING: &str = "saga.compensating";
    /// Compensation steps finished.
    pub const SAGA_COMPENSATED: &str = "saga.compensated";
}
