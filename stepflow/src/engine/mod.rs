//! The engine facade: state machines and pipelines wired from one config.

mod config;

pub use config::{EngineConfig, StateMachineConfig};

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::cancellation::CancellationToken;
use crate::context::{Data, ExecutionContext};
use crate::errors::StepflowError;
use crate::events::{EventSink, NoOpEventSink};
use crate::pipeline::{Pipeline, RunFailure};
use crate::services::ServiceRegistry;
use crate::statemachine::StateMachineEngine;
use crate::steps::StepRegistry;

/// Runs named pipelines over a shared service registry.
///
/// Every configured state machine is registered as a service under its name
/// before the pipelines are built, so steps that resolve services eagerly
/// find them.
pub struct WorkflowEngine {
    services: Arc<ServiceRegistry>,
    machines: HashMap<String, Arc<StateMachineEngine>>,
    pipelines: HashMap<String, Arc<Pipeline>>,
}

impl WorkflowEngine {
    /// Builds an engine with a fresh service registry.
    pub fn from_config(config: &EngineConfig, registry: &StepRegistry) -> Result<Self, StepflowError> {
        Self::new(config, registry, Arc::new(ServiceRegistry::new()), Arc::new(NoOpEventSink))
    }

    /// Builds an engine over `services`, which may already hold collaborators
    /// such as flag evaluators.
    pub fn with_services(
        config: &EngineConfig,
        registry: &StepRegistry,
        services: Arc<ServiceRegistry>,
    ) -> Result<Self, StepflowError> {
        Self::new(config, registry, services, Arc::new(NoOpEventSink))
    }

    /// Builds an engine whose pipelines report to `sink`.
    pub fn new(
        config: &EngineConfig,
        registry: &StepRegistry,
        services: Arc<ServiceRegistry>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, StepflowError> {
        config.validate()?;

        let mut machines = HashMap::new();
        for machine in &config.state_machines {
            let engine = Arc::new(StateMachineEngine::new(&machine.name, machine.definition.clone())?);
            engine.register(&services);
            info!(machine = %machine.name, states = machine.definition.states.len(), "State machine registered");
            machines.insert(machine.name.clone(), engine);
        }

        let mut pipelines = HashMap::new();
        for def in &config.pipelines {
            let pipeline = def
                .builder(registry, Some(&services))?
                .event_sink(Arc::clone(&sink))
                .build()?;
            info!(pipeline = %def.name, steps = def.steps.len(), "Pipeline registered");
            pipelines.insert(def.name.clone(), Arc::new(pipeline));
        }

        Ok(Self {
            services,
            machines,
            pipelines,
        })
    }

    /// Returns a pipeline by name.
    #[must_use]
    pub fn pipeline(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.get(name).cloned()
    }

    /// Returns the pipeline names, sorted.
    #[must_use]
    pub fn pipeline_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pipelines.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns a configured state machine by name.
    #[must_use]
    pub fn state_machine(&self, name: &str) -> Option<Arc<StateMachineEngine>> {
        self.machines.get(name).cloned()
    }

    /// Returns the shared service registry.
    #[must_use]
    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// Runs pipeline `name` and returns the finished working set.
    pub async fn run(
        &self,
        name: &str,
        trigger: Data,
        cancel: &CancellationToken,
    ) -> Result<Data, RunFailure> {
        self.execute(name, trigger, cancel)
            .await
            .map(ExecutionContext::into_current)
    }

    /// Runs pipeline `name` and returns the whole context.
    pub async fn execute(
        &self,
        name: &str,
        trigger: Data,
        cancel: &CancellationToken,
    ) -> Result<ExecutionContext, RunFailure> {
        let Some(pipeline) = self.pipelines.get(name) else {
            return Err(RunFailure {
                error: StepflowError::UnknownPipeline(name.to_string()),
                context: Box::new(ExecutionContext::new(trigger)),
            });
        };
        pipeline.execute(cancel, trigger).await
    }
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut machines: Vec<&String> = self.machines.keys().collect();
        machines.sort();
        f.debug_struct("WorkflowEngine")
            .field("pipelines", &self.pipeline_names())
            .field("state_machines", &machines)
            .finish_non_exhaustive()
    }
}
