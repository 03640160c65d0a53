//! Test doubles for steps and state machines.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::context::{Data, ExecutionContext};
use crate::errors::{StepflowError, TransitionError};
use crate::statemachine::{StateMachineInstance, TransitionTrigger};
use crate::steps::{Flow, Step, StepResult};

/// A mock step that counts calls and returns a configurable output.
#[derive(Debug)]
pub struct MockStep {
    name: String,
    output: Mutex<Data>,
    flow: Flow,
    call_count: Mutex<usize>,
}

impl MockStep {
    /// Creates a mock step with empty output.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: Mutex::new(Data::new()),
            flow: Flow::Continue,
            call_count: Mutex::new(0),
        }
    }

    /// Adds an output value.
    #[must_use]
    pub fn with_output(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.output.lock().insert(key.into(), value.into());
        self
    }

    /// Makes the step jump to `target` after every call.
    #[must_use]
    pub fn jumping_to(mut self, target: impl Into<String>) -> Self {
        self.flow = Flow::Jump(target.into());
        self
    }

    /// Makes the step end the run after every call.
    #[must_use]
    pub fn stopping(mut self) -> Self {
        self.flow = Flow::Stop;
        self
    }

    /// Replaces the output.
    pub fn set_output(&self, output: Data) {
        *self.output.lock() = output;
    }

    /// Returns the number of times the step was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }

    /// Resets call tracking.
    pub fn reset(&self) {
        *self.call_count.lock() = 0;
    }
}

#[async_trait]
impl Step for MockStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError> {
        *self.call_count.lock() += 1;
        Ok(StepResult {
            output: self.output.lock().clone(),
            flow: self.flow.clone(),
        })
    }

    fn jump_targets(&self) -> Vec<String> {
        match &self.flow {
            Flow::Jump(target) => vec![target.clone()],
            _ => Vec::new(),
        }
    }
}

/// A step that always returns a hard error.
#[derive(Debug)]
pub struct FailingStep {
    name: String,
    error: String,
    call_count: Mutex<usize>,
}

impl FailingStep {
    /// Creates a failing step.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            call_count: Mutex::new(0),
        }
    }

    /// Returns the number of times the step was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl Step for FailingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError> {
        *self.call_count.lock() += 1;
        Err(StepflowError::execution(&self.name, &self.error))
    }
}

/// Step names in the order they ran, shared between recording steps.
pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

/// Creates an empty [`ExecutionLog`].
#[must_use]
pub fn execution_log() -> ExecutionLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// A step that appends its name to a shared log and snapshots the working
/// set it saw.
#[derive(Debug)]
pub struct RecordingStep {
    name: String,
    log: ExecutionLog,
    output: Data,
    snapshots: Mutex<Vec<Data>>,
}

impl RecordingStep {
    /// Creates a recording step writing to `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &ExecutionLog) -> Self {
        Self {
            name: name.into(),
            log: Arc::clone(log),
            output: Data::new(),
            snapshots: Mutex::new(Vec::new()),
        }
    }

    /// Adds an output value.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.output.insert(key.into(), value.into());
        self
    }

    /// Returns the working sets seen by each call.
    #[must_use]
    pub fn snapshots(&self) -> Vec<Data> {
        self.snapshots.lock().clone()
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.snapshots.lock().len()
    }
}

#[async_trait]
impl Step for RecordingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError> {
        self.log.lock().push(self.name.clone());
        self.snapshots.lock().push(ctx.current().clone());
        Ok(StepResult::new(self.output.clone()))
    }
}

/// A step that waits before succeeding, giving up early on cancellation.
#[derive(Debug)]
pub struct SlowStep {
    name: String,
    delay: Duration,
}

impl SlowStep {
    /// Creates a slow step with a delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self {
            name: name.into(),
            delay: Duration::from_millis(ms),
        }
    }
}

#[async_trait]
impl Step for SlowStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        _ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError> {
        tokio::select! {
            () = tokio::time::sleep(self.delay) => Ok(StepResult::empty()),
            () = cancel.cancelled() => Err(StepflowError::Cancelled(cancel.reason().unwrap_or_default())),
        }
    }
}

/// One recorded [`TransitionTrigger`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerCall {
    /// Entity the event was fired on.
    pub entity_id: String,
    /// The event.
    pub event: String,
    /// Transition data.
    pub data: Data,
}

/// A [`TransitionTrigger`] that records calls and answers from a fixed
/// event table, without tracking entity state.
#[derive(Debug)]
pub struct MockTransitionTrigger {
    machine: String,
    state: String,
    targets: HashMap<String, String>,
    calls: Mutex<Vec<TriggerCall>>,
}

impl MockTransitionTrigger {
    /// Creates a trigger that reports every entity as being in `state`.
    #[must_use]
    pub fn new(machine: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            machine: machine.into(),
            state: state.into(),
            targets: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Accepts `event`, moving entities to `to`.
    #[must_use]
    pub fn accepting(mut self, event: impl Into<String>, to: impl Into<String>) -> Self {
        self.targets.insert(event.into(), to.into());
        self
    }

    /// Returns the recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<TriggerCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of recorded calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TransitionTrigger for MockTransitionTrigger {
    async fn trigger_transition(
        &self,
        _cancel: &CancellationToken,
        entity_id: &str,
        event: &str,
        data: Data,
    ) -> Result<StateMachineInstance, StepflowError> {
        self.calls.lock().push(TriggerCall {
            entity_id: entity_id.to_string(),
            event: event.to_string(),
            data: data.clone(),
        });
        let Some(to) = self.targets.get(event) else {
            return Err(TransitionError::InvalidTransition {
                machine: self.machine.clone(),
                entity_id: entity_id.to_string(),
                state: self.state.clone(),
                event: event.to_string(),
            }
            .into());
        };
        let mut instance = StateMachineInstance::new(&self.machine, entity_id, to.as_str(), data);
        instance.previous_state = Some(self.state.clone());
        Ok(instance)
    }
}
