//! The step contract and the step factory registry.
//!
//! Steps are the units of work a pipeline chains together. A factory turns a
//! step name and its declarative `config` mapping into an executable step,
//! validating the configuration up front so that runs never have to.

pub mod builtin;
mod config;
mod registry;
mod result;

pub use config::StepConfig;
pub use registry::{StepFactory, StepRegistry};
pub use result::{Flow, StepResult};

use async_trait::async_trait;
use std::fmt::Debug;

use crate::cancellation::CancellationToken;
use crate::context::ExecutionContext;
use crate::errors::StepflowError;

/// Trait for pipeline steps.
///
/// A step is built once per pipeline definition and reused for every run,
/// possibly from several runs at the same time. Any state it keeps between
/// calls must be thread-safe. Side effects happen only in
/// [`execute`](Step::execute).
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the name of the step, unique within its pipeline.
    fn name(&self) -> &str;

    /// Executes the step against the run's context.
    ///
    /// # Arguments
    ///
    /// * `cancel` - The run's cancellation token
    /// * `ctx` - The run's execution context
    ///
    /// # Returns
    ///
    /// The step output and routing decision, or a hard error that aborts
    /// the run.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError>;

    /// Returns the steps this step may jump to, when known before any run.
    ///
    /// Pipelines check these targets when they are built.
    fn jump_targets(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A step backed by a synchronous closure.
pub struct FnStep<F>
where
    F: Fn(&ExecutionContext) -> Result<StepResult, StepflowError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&ExecutionContext) -> Result<StepResult, StepflowError> + Send + Sync,
{
    /// Creates a new closure-backed step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStep<F>
where
    F: Fn(&ExecutionContext) -> Result<StepResult, StepflowError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&ExecutionContext) -> Result<StepResult, StepflowError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError> {
        (self.func)(ctx)
    }
}
