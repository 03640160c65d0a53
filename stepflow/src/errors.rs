//! Error types for the stepflow engine.
//!
//! Failures fall into a small taxonomy: configuration errors surface when a
//! step is constructed, template and transition errors surface while a run is
//! in progress, and service errors surface at either point depending on when
//! the step resolves its collaborator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for stepflow operations.
#[derive(Debug, Error)]
pub enum StepflowError {
    /// Static step configuration is missing or malformed.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A template expression could not be resolved.
    #[error("{0}")]
    Template(#[from] TemplateError),

    /// A state machine rejected an operation.
    #[error("{0}")]
    Transition(#[from] TransitionError),

    /// A named collaborator could not be resolved.
    #[error("{0}")]
    Service(#[from] ServiceError),

    /// A pipeline failed build-time validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A step returned a hard error and the run was aborted.
    #[error("step '{step}' failed: {source}")]
    StepFailed {
        /// The failing step.
        step: String,
        /// The error returned by the step.
        #[source]
        source: Box<StepflowError>,
    },

    /// A step failed and the compensation steps failed as well.
    #[error("step '{step}' failed: {source} (compensation also failed: {compensation})")]
    CompensationFailed {
        /// The failing step.
        step: String,
        /// The error returned by the step.
        #[source]
        source: Box<StepflowError>,
        /// The first compensation error.
        compensation: String,
    },

    /// A step asked to continue at a step that does not exist.
    #[error("step '{step}' routed to unknown step '{target}'")]
    UnknownNextStep {
        /// The routing step.
        step: String,
        /// The requested successor.
        target: String,
    },

    /// A step asked to continue at a step that already completed in this run.
    #[error("step '{step}' routed to '{target}', which already ran in this run")]
    StepRevisited {
        /// The routing step.
        step: String,
        /// The requested successor.
        target: String,
    },

    /// A step output was recorded twice for the same run.
    #[error("output for step '{0}' was already recorded")]
    OutputConflict(String),

    /// A collaborating service failed while serving a step.
    #[error("service '{service}' failed: {message}")]
    Collaborator {
        /// The service name.
        service: String,
        /// What went wrong.
        message: String,
    },

    /// A step failed for a reason of its own.
    #[error("step '{step}': {message}")]
    Execution {
        /// The step name.
        step: String,
        /// What went wrong.
        message: String,
    },

    /// No pipeline is registered under the requested name.
    #[error("pipeline '{0}' not found")]
    UnknownPipeline(String),

    /// The run was cancelled by the caller.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StepflowError {
    /// Creates a step-local execution error.
    #[must_use]
    pub fn execution(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Creates a collaborator failure.
    #[must_use]
    pub fn collaborator(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error means a state machine instance does not exist.
    #[must_use]
    pub fn is_instance_not_found(&self) -> bool {
        matches!(self, Self::Transition(TransitionError::InstanceNotFound { .. }))
    }

    /// Returns true if this error is an invalid transition.
    #[must_use]
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::Transition(TransitionError::InvalidTransition { .. }))
    }

    /// Follows `StepFailed` wrappers down to the error the step returned.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::StepFailed { source, .. } | Self::CompensationFailed { source, .. } => {
                source.root()
            }
            other => other,
        }
    }
}

/// Error raised when static step configuration is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("step '{step}': config '{key}' {reason}")]
pub struct ConfigError {
    /// The step being constructed.
    pub step: String,
    /// The offending configuration key.
    pub key: String,
    /// Why the value was rejected.
    pub reason: String,
}

impl ConfigError {
    /// Creates an error for a required key that is absent.
    #[must_use]
    pub fn missing(step: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            key: key.into(),
            reason: "is required".to_string(),
        }
    }

    /// Creates an error for a key whose value is unusable.
    #[must_use]
    pub fn invalid(
        step: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while resolving `{{ .path }}` expressions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A path segment does not exist.
    #[error("template path '{path}' not found (missing key '{segment}')")]
    PathNotFound {
        /// The full dotted path.
        path: String,
        /// The first segment that was missing.
        segment: String,
    },

    /// A path tried to descend through a value that is not a mapping.
    #[error("template path '{path}' cannot descend into '{segment}': value is not a mapping")]
    NotAMapping {
        /// The full dotted path.
        path: String,
        /// The segment that could not be traversed.
        segment: String,
    },

    /// Resolution failed inside a named field of a mapping.
    #[error("field '{field}': {source}")]
    Field {
        /// The mapping key being resolved.
        field: String,
        /// The underlying error.
        #[source]
        source: Box<TemplateError>,
    },
}

impl TemplateError {
    /// Wraps the error with the mapping key it occurred under.
    #[must_use]
    pub fn in_field(self, field: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            source: Box::new(self),
        }
    }

    /// Returns the dotted path that failed, looking through field wrappers.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::PathNotFound { path, .. } | Self::NotAMapping { path, .. } => path,
            Self::Field { source, .. } => source.path(),
        }
    }
}

/// Errors raised by the state machine engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// No transition is defined for the current state and event.
    #[error("invalid transition: event '{event}' is not defined from state '{state}' (entity '{entity_id}', machine '{machine}')")]
    InvalidTransition {
        /// The machine name.
        machine: String,
        /// The entity the event targeted.
        entity_id: String,
        /// The entity's state when the event arrived.
        state: String,
        /// The rejected event.
        event: String,
    },

    /// The entity has no instance in this machine.
    #[error("instance '{entity_id}' not found in state machine '{machine}'")]
    InstanceNotFound {
        /// The machine name.
        machine: String,
        /// The entity that was looked up.
        entity_id: String,
    },

    /// The entity already has an instance.
    #[error("instance '{entity_id}' already exists in state machine '{machine}'")]
    InstanceExists {
        /// The machine name.
        machine: String,
        /// The entity that was provisioned twice.
        entity_id: String,
    },

    /// A state name is not part of the machine definition.
    #[error("state '{state}' is not defined in state machine '{machine}'")]
    UnknownState {
        /// The machine name.
        machine: String,
        /// The unknown state.
        state: String,
    },

    /// The machine definition is malformed.
    #[error("invalid state machine definition '{machine}': {reason}")]
    InvalidDefinition {
        /// The machine name.
        machine: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A transition handler vetoed the transition.
    #[error("transition handler rejected event '{event}' for '{entity_id}': {reason}")]
    HandlerRejected {
        /// The entity being transitioned.
        entity_id: String,
        /// The event being applied.
        event: String,
        /// The handler's error message.
        reason: String,
    },
}

/// Errors raised when resolving a named collaborator from the service registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Nothing is registered under the name.
    #[error("service '{service}' not found{}", step_suffix(.step.as_deref()))]
    NotFound {
        /// The requesting step, if known.
        step: Option<String>,
        /// The requested service name.
        service: String,
    },

    /// Something is registered under the name but lacks the capability.
    #[error("service '{service}' does not provide {capability}{}", step_suffix(.step.as_deref()))]
    WrongCapability {
        /// The requesting step, if known.
        step: Option<String>,
        /// The requested service name.
        service: String,
        /// The capability that was asked for.
        capability: String,
    },

    /// The step was built without a service registry.
    #[error("no service registry available to resolve '{service}'{}", step_suffix(.step.as_deref()))]
    NoRegistry {
        /// The requesting step, if known.
        step: Option<String>,
        /// The requested service name.
        service: String,
    },
}

fn step_suffix(step: Option<&str>) -> String {
    step.map(|s| format!(" (step '{s}')")).unwrap_or_default()
}

impl ServiceError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(service: impl Into<String>) -> Self {
        Self::NotFound {
            step: None,
            service: service.into(),
        }
    }

    /// Creates a wrong-capability error.
    #[must_use]
    pub fn wrong_capability(service: impl Into<String>, capability: impl Into<String>) -> Self {
        Self::WrongCapability {
            step: None,
            service: service.into(),
            capability: capability.into(),
        }
    }

    /// Creates a missing-registry error.
    #[must_use]
    pub fn no_registry(service: impl Into<String>) -> Self {
        Self::NoRegistry {
            step: None,
            service: service.into(),
        }
    }

    /// Attaches the name of the step that requested the service.
    #[must_use]
    pub fn for_step(self, name: impl Into<String>) -> Self {
        let name = Some(name.into());
        match self {
            Self::NotFound { service, .. } => Self::NotFound { step: name, service },
            Self::WrongCapability {
                service,
                capability,
                ..
            } => Self::WrongCapability {
                step: name,
                service,
                capability,
            },
            Self::NoRegistry { service, .. } => Self::NoRegistry { step: name, service },
        }
    }

    /// Returns the requested service name.
    #[must_use]
    pub fn service(&self) -> &str {
        match self {
            Self::NotFound { service, .. }
            | Self::WrongCapability { service, .. }
            | Self::NoRegistry { service, .. } => service,
        }
    }
}

/// Metadata about a validation error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "PIPELINE-001-DUPLICATE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The steps involved in the error.
    pub steps: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            steps: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the steps involved.
    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if one was attached.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}
