//! Engine configuration loaded from JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::errors::{ContractErrorInfo, PipelineValidationError, StepflowError};
use crate::pipeline::PipelineDefinition;
use crate::statemachine::StateMachineDefinition;

/// A state machine registered as a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachineConfig {
    /// Service name steps use to reach the machine.
    pub name: String,
    /// States and transitions.
    pub definition: StateMachineDefinition,
}

/// Everything an engine is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// State machines, registered before any pipeline is built.
    #[serde(default)]
    pub state_machines: Vec<StateMachineConfig>,
    /// Pipeline definitions.
    #[serde(default)]
    pub pipelines: Vec<PipelineDefinition>,
}

impl EngineConfig {
    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, StepflowError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StepflowError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Rejects duplicate pipeline or state machine names.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        let mut machines = HashSet::new();
        for machine in &self.state_machines {
            if !machines.insert(machine.name.as_str()) {
                return Err(duplicate("state machine", &machine.name, "ENGINE-002-DUPLICATE_MACHINE"));
            }
        }

        let mut pipelines = HashSet::new();
        for pipeline in &self.pipelines {
            if !pipelines.insert(pipeline.name.as_str()) {
                return Err(duplicate("pipeline", &pipeline.name, "ENGINE-001-DUPLICATE_PIPELINE"));
            }
        }
        Ok(())
    }
}

fn duplicate(kind: &str, name: &str, code: &str) -> PipelineValidationError {
    PipelineValidationError::new(format!("{kind} '{name}' is defined more than once"))
        .with_error_info(
            ContractErrorInfo::new(code, format!("Duplicate {kind} name"))
                .with_context_entry("name", name),
        )
}
