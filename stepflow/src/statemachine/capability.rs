//! Narrow capabilities steps use to talk to a state machine.
//!
//! Steps resolve these from the service registry by machine name, so a test
//! double only needs to implement the one capability a step uses.

use async_trait::async_trait;

use super::instance::{StateMachineInstance, TransitionEvent};
use crate::cancellation::CancellationToken;
use crate::context::Data;
use crate::errors::StepflowError;

/// Applies events to entities.
#[async_trait]
pub trait TransitionTrigger: Send + Sync {
    /// Fires `event` on `entity_id` and returns the updated instance.
    async fn trigger_transition(
        &self,
        cancel: &CancellationToken,
        entity_id: &str,
        event: &str,
        data: Data,
    ) -> Result<StateMachineInstance, StepflowError>;
}

/// Reads entity state without side effects.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateReader: Send + Sync {
    /// Returns the instance for `entity_id`, or a not-found error.
    async fn get_instance(&self, entity_id: &str) -> Result<StateMachineInstance, StepflowError>;
}

/// Observes transitions before they are committed.
///
/// Returning an error vetoes the transition.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransitionHandler: Send + Sync {
    /// Called with the pending transition and the caller's token.
    async fn handle_transition(
        &self,
        cancel: &CancellationToken,
        event: &TransitionEvent,
    ) -> Result<(), StepflowError>;
}

/// Adapts a closure into a [`TransitionHandler`] that never vetoes.
pub struct ListenerHandler<F> {
    listener: F,
}

impl<F> ListenerHandler<F>
where
    F: Fn(&TransitionEvent) + Send + Sync,
{
    /// Wraps a listener closure.
    pub fn new(listener: F) -> Self {
        Self { listener }
    }
}

#[async_trait]
impl<F> TransitionHandler for ListenerHandler<F>
where
    F: Fn(&TransitionEvent) + Send + Sync,
{
    async fn handle_transition(
        &self,
        _cancel: &CancellationToken,
        event: &TransitionEvent,
    ) -> Result<(), StepflowError> {
        (self.listener)(event);
        Ok(())
    }
}
