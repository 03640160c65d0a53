//! Steps that read and drive state machine instances.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::resolve_service;
use crate::cancellation::CancellationToken;
use crate::context::{Data, ExecutionContext};
use crate::errors::StepflowError;
use crate::services::ServiceRegistry;
use crate::statemachine::{StateReader, TransitionTrigger};
use crate::steps::{Step, StepConfig, StepResult};
use crate::template::TemplateResolver;

/// Reads the current state of an entity.
///
/// Config: `statemachine` (service name), `entity_id` (template) and
/// `fail_on_missing` (default `true`). The [`StateReader`] is resolved when
/// the step is built. Output:
/// `{"found": true, "entity_id", "current_state", "previous_state", "completed", "instance_data"}`,
/// or `{"found": false, "entity_id"}` for a missing instance when
/// `fail_on_missing` is false.
pub struct StateGetStep {
    name: String,
    entity_id: String,
    fail_on_missing: bool,
    reader: Arc<dyn StateReader>,
}

impl StateGetStep {
    /// Creates the step with an explicit reader.
    #[must_use]
    pub fn new(name: impl Into<String>, entity_id: impl Into<String>, reader: Arc<dyn StateReader>) -> Self {
        Self {
            name: name.into(),
            entity_id: entity_id.into(),
            fail_on_missing: true,
            reader,
        }
    }

    /// Reports a missing instance as `found: false` instead of failing.
    #[must_use]
    pub fn allow_missing(mut self) -> Self {
        self.fail_on_missing = false;
        self
    }

    /// Builds the step from its config mapping.
    pub fn from_config(
        name: &str,
        config: &Data,
        services: Option<&Arc<ServiceRegistry>>,
    ) -> Result<Self, StepflowError> {
        let cfg = StepConfig::new(name, config);
        let machine = cfg.require_str("statemachine")?;
        let entity_id = cfg.require_str("entity_id")?;
        let fail_on_missing = cfg.optional_bool("fail_on_missing", true)?;
        let reader = resolve_service::<dyn StateReader>(name, services, &machine)?;
        Ok(Self {
            name: name.to_string(),
            entity_id,
            fail_on_missing,
            reader,
        })
    }
}

impl std::fmt::Debug for StateGetStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateGetStep")
            .field("name", &self.name)
            .field("entity_id", &self.entity_id)
            .field("fail_on_missing", &self.fail_on_missing)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Step for StateGetStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError> {
        let entity_id = TemplateResolver::new().resolve(&self.entity_id, ctx)?;
        match self.reader.get_instance(&entity_id).await {
            Ok(instance) => Ok(StepResult::empty()
                .with_value("found", true)
                .with_value("entity_id", entity_id)
                .with_value("current_state", instance.current_state)
                .with_value("previous_state", json!(instance.previous_state))
                .with_value("completed", instance.completed)
                .with_value("instance_data", Value::Object(instance.data))),
            Err(err) if err.is_instance_not_found() && !self.fail_on_missing => Ok(StepResult::empty()
                .with_value("found", false)
                .with_value("entity_id", entity_id)),
            Err(err) => Err(err),
        }
    }
}

/// Fires an event on an entity.
///
/// Config: `statemachine` (service name), `entity_id` and `event`
/// (templates), `data` (mapping of templates) and `fail_on_error` (default
/// `true`). The [`TransitionTrigger`] is looked up on every run, so the
/// machine may be registered after the pipeline is built.
///
/// Output on success:
/// `{"transition_ok": true, "entity_id", "event", "new_state"}`. A rejected
/// transition aborts the run, or with `fail_on_error: false` produces
/// `{"transition_ok": false, "entity_id", "event", "error"}`. Missing
/// services always abort.
pub struct StateTransitionStep {
    name: String,
    machine: String,
    entity_id: String,
    event: String,
    data: Option<Data>,
    fail_on_error: bool,
    services: Option<Arc<ServiceRegistry>>,
}

impl StateTransitionStep {
    /// Builds the step from its config mapping.
    pub fn from_config(
        name: &str,
        config: &Data,
        services: Option<&Arc<ServiceRegistry>>,
    ) -> Result<Self, StepflowError> {
        let cfg = StepConfig::new(name, config);
        Ok(Self {
            name: name.to_string(),
            machine: cfg.require_str("statemachine")?,
            entity_id: cfg.require_str("entity_id")?,
            event: cfg.require_str("event")?,
            data: cfg.optional_map("data")?,
            fail_on_error: cfg.optional_bool("fail_on_error", true)?,
            services: services.cloned(),
        })
    }

    fn trigger(&self) -> Result<Arc<dyn TransitionTrigger>, StepflowError> {
        Ok(resolve_service::<dyn TransitionTrigger>(
            &self.name,
            self.services.as_ref(),
            &self.machine,
        )?)
    }
}

impl std::fmt::Debug for StateTransitionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTransitionStep")
            .field("name", &self.name)
            .field("machine", &self.machine)
            .field("entity_id", &self.entity_id)
            .field("event", &self.event)
            .field("fail_on_error", &self.fail_on_error)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Step for StateTransitionStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError> {
        let resolver = TemplateResolver::new();
        let entity_id = resolver.resolve(&self.entity_id, ctx)?;
        let event = resolver.resolve(&self.event, ctx)?;
        let data = match &self.data {
            Some(data) => resolver.resolve_map(data, ctx)?,
            None => Data::new(),
        };
        let trigger = self.trigger()?;

        if cancel.is_cancelled() {
            return Err(StepflowError::Cancelled(cancel.reason().unwrap_or_default()));
        }

        let result = StepResult::empty()
            .with_value("entity_id", entity_id.clone())
            .with_value("event", event.clone());
        match trigger.trigger_transition(cancel, &entity_id, &event, data).await {
            Ok(instance) => Ok(result
                .with_value("transition_ok", true)
                .with_value("new_state", instance.current_state)),
            Err(err) if !self.fail_on_error => Ok(result
                .with_value("transition_ok", false)
                .with_value("error", err.to_string())),
            Err(err) => Err(err),
        }
    }
}
