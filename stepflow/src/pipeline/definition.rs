//! Declarative pipeline definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{Pipeline, PipelineBuilder};
use crate::context::Data;
use crate::errors::StepflowError;
use crate::services::ServiceRegistry;
use crate::steps::StepRegistry;

/// What a pipeline does when a step returns a hard error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStrategy {
    /// Abort the run and return the partial context.
    #[default]
    Stop,
    /// Record the failure and continue with the next step.
    Skip,
    /// Run the compensation steps in reverse order, then abort.
    Compensate,
}

/// One step declaration: the universal `type`/`config` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step name, unique within the pipeline.
    pub name: String,
    /// Factory type name.
    #[serde(rename = "type")]
    pub step_type: String,
    /// Factory-specific configuration.
    #[serde(default)]
    pub config: Data,
}

impl StepDefinition {
    /// Creates a declaration with an empty config.
    #[must_use]
    pub fn new(name: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            step_type: step_type.into(),
            config: Data::new(),
        }
    }

    /// Sets one config entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// A pipeline as it appears in configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline name.
    pub name: String,
    /// Steps in execution order.
    pub steps: Vec<StepDefinition>,
    /// Failure handling.
    #[serde(default)]
    pub on_error: ErrorStrategy,
    /// Steps run in reverse order when `on_error` is `compensate`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compensation: Vec<StepDefinition>,
    /// Route the pipeline is mounted under, copied into run metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_pattern: Option<String>,
    /// Extra metadata seeded into every run.
    #[serde(default, skip_serializing_if = "Data::is_empty")]
    pub metadata: Data,
}

impl PipelineDefinition {
    /// Creates an empty definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Appends a step declaration.
    #[must_use]
    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Instantiates every step and returns a builder ready to validate.
    ///
    /// Step configuration errors surface here, before any run.
    pub fn builder(
        &self,
        registry: &StepRegistry,
        services: Option<&Arc<ServiceRegistry>>,
    ) -> Result<PipelineBuilder, StepflowError> {
        let mut builder = PipelineBuilder::new(&self.name).on_error(self.on_error);
        for def in &self.steps {
            builder = builder.step(registry.create(&def.step_type, &def.name, &def.config, services)?);
        }
        for def in &self.compensation {
            builder = builder
                .compensation_step(registry.create(&def.step_type, &def.name, &def.config, services)?);
        }
        if let Some(pattern) = &self.route_pattern {
            builder = builder.route_pattern(pattern);
        }
        for (key, value) in &self.metadata {
            builder = builder.metadata(key, value.clone());
        }
        Ok(builder)
    }

    /// Instantiates and validates the pipeline.
    pub fn build(
        &self,
        registry: &StepRegistry,
        services: Option<&Arc<ServiceRegistry>>,
    ) -> Result<Pipeline, StepflowError> {
        Ok(self.builder(registry, services)?.build()?)
    }
}
