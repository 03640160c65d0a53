//! Pipeline builder with validation.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::definition::ErrorStrategy;
use super::executor::Pipeline;
use crate::context::{Data, META_ROUTE_PATTERN};
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::events::{EventSink, NoOpEventSink};
use crate::steps::Step;

/// Builder for creating validated pipelines.
pub struct PipelineBuilder {
    name: String,
    steps: Vec<Arc<dyn Step>>,
    compensation: Vec<Arc<dyn Step>>,
    on_error: ErrorStrategy,
    metadata: Data,
    sink: Option<Arc<dyn EventSink>>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            compensation: Vec::new(),
            on_error: ErrorStrategy::default(),
            metadata: Data::new(),
            sink: None,
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a compensation step. Compensation runs in reverse order.
    #[must_use]
    pub fn compensation_step(mut self, step: Arc<dyn Step>) -> Self {
        self.compensation.push(step);
        self
    }

    /// Sets the error strategy.
    #[must_use]
    pub fn on_error(mut self, strategy: ErrorStrategy) -> Self {
        self.on_error = strategy;
        self
    }

    /// Records the route pattern in every run's metadata.
    #[must_use]
    pub fn route_pattern(self, pattern: impl Into<String>) -> Self {
        self.metadata(META_ROUTE_PATTERN, pattern.into())
    }

    /// Seeds a metadata value into every run.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Sets the sink that receives execution events.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline has no name or no steps, if two steps
    /// share a name, or if a step can jump to a step that does not exist.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no name").with_error_info(
                ContractErrorInfo::new("PIPELINE-000-NO_NAME", "Pipelines must be named")
                    .with_fix_hint("Give the pipeline a non-empty name."),
            ));
        }
        if self.steps.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no steps",
                self.name
            ))
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-000-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add at least one step to the pipeline before building."),
            ));
        }

        let mut seen = HashSet::new();
        for step in self.steps.iter().chain(&self.compensation) {
            if !seen.insert(step.name()) {
                return Err(PipelineValidationError::new(format!(
                    "Step '{}' is defined more than once in pipeline '{}'",
                    step.name(),
                    self.name
                ))
                .with_steps(vec![step.name().to_string()])
                .with_error_info(
                    ContractErrorInfo::new("PIPELINE-001-DUPLICATE", "Duplicate step name")
                        .with_fix_hint("Step names must be unique, compensation steps included."),
                ));
            }
        }

        let index: HashMap<String, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| (step.name().to_string(), i))
            .collect();

        for step in &self.steps {
            for target in step.jump_targets() {
                if !index.contains_key(&target) {
                    return Err(PipelineValidationError::new(format!(
                        "Step '{}' can jump to unknown step '{}'",
                        step.name(),
                        target
                    ))
                    .with_steps(vec![step.name().to_string(), target.clone()])
                    .with_error_info(
                        ContractErrorInfo::new("PIPELINE-002-UNKNOWN_TARGET", "Unknown jump target")
                            .with_fix_hint("Point the route at a step of this pipeline.")
                            .with_context_entry("target", target),
                    ));
                }
            }
        }

        Ok(Pipeline {
            name: self.name,
            steps: self.steps,
            index,
            compensation: self.compensation,
            on_error: self.on_error,
            metadata: self.metadata,
            sink: self.sink.unwrap_or_else(|| Arc::new(NoOpEventSink)),
        })
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("compensation", &self.compensation)
            .field("on_error", &self.on_error)
            .field("metadata", &self.metadata)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
