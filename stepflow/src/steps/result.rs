//! What a step hands back to the pipeline.

use serde_json::Value;

use crate::context::Data;

/// Where the pipeline goes after a step succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Flow {
    /// Run the structurally next step.
    #[default]
    Continue,
    /// Run the named step next.
    Jump(String),
    /// End the run successfully.
    Stop,
}

/// Successful outcome of a step.
///
/// `output` is merged into the working set and recorded under the step's
/// name. Business failures belong in the output as flags, such as
/// `{"valid": false}`, rather than in an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResult {
    /// Values produced by the step. May be empty.
    pub output: Data,
    /// Routing decision.
    pub flow: Flow,
}

impl StepResult {
    /// Creates a result that continues with `output`.
    #[must_use]
    pub fn new(output: Data) -> Self {
        Self {
            output,
            flow: Flow::Continue,
        }
    }

    /// Creates a result with no output.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds an output value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.output.insert(key.into(), value.into());
        self
    }

    /// Routes to the named step next.
    #[must_use]
    pub fn jump_to(mut self, step: impl Into<String>) -> Self {
        self.flow = Flow::Jump(step.into());
        self
    }

    /// Ends the run after this step.
    #[must_use]
    pub fn stop(mut self) -> Self {
        self.flow = Flow::Stop;
        self
    }

    /// Returns the explicit successor, if any.
    #[must_use]
    pub fn next_step(&self) -> Option<&str> {
        match &self.flow {
            Flow::Jump(step) => Some(step),
            Flow::Continue | Flow::Stop => None,
        }
    }
}
