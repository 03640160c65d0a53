//! # Stepflow
//!
//! A declarative pipeline and state machine engine.
//!
//! Stepflow runs named pipelines of steps over a shared execution context:
//!
//! - **Steps by type name**: step kinds are registered as factories and built
//!   from a `type`/`config` envelope, with configuration validated up front
//! - **Templates**: step config can reference the trigger, the working set and
//!   earlier step outputs through `{{ .path }}` expressions
//! - **Branching**: steps continue, jump to a named step or stop the run
//! - **State machines**: per-entity instances with serialized transitions,
//!   reachable from steps through a service registry
//! - **Error strategies**: stop, skip or compensate when a step fails
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stepflow::prelude::*;
//!
//! let config = EngineConfig::from_path("workflows.json")?;
//! let engine = WorkflowEngine::from_config(&config, &StepRegistry::with_builtins())?;
//!
//! let output = engine
//!     .run("approve-order", trigger, &CancellationToken::new())
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod engine;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod services;
pub mod statemachine;
pub mod steps;
pub mod template;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{Data, ExecutionContext, Metadata};
    pub use crate::engine::{EngineConfig, StateMachineConfig, WorkflowEngine};
    pub use crate::errors::{
        ConfigError, ContractErrorInfo, PipelineValidationError, ServiceError, StepflowError,
        TemplateError, TransitionError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        ErrorStrategy, Pipeline, PipelineBuilder, PipelineDefinition, RunFailure, StepDefinition,
    };
    pub use crate::services::{FlagEvaluator, ServiceRegistry, StaticFlagEvaluator};
    pub use crate::statemachine::{
        State, StateMachineDefinition, StateMachineEngine, StateMachineInstance, StateReader,
        Transition, TransitionTrigger,
    };
    pub use crate::steps::{Flow, Step, StepConfig, StepRegistry, StepResult};
    pub use crate::template::TemplateResolver;
}

