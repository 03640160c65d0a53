//! State machines that pipelines drive entities through.
//!
//! A [`StateMachineEngine`] owns one validated [`StateMachineDefinition`]
//! and the live [`StateMachineInstance`] of every entity it has seen. Engines
//! are registered as named services and reached by steps through the
//! [`TransitionTrigger`] and [`StateReader`] capabilities.

mod capability;
mod definition;
mod engine;
mod instance;

pub use capability::{ListenerHandler, StateReader, TransitionHandler, TransitionTrigger};
#[cfg(test)]
pub use capability::{MockStateReader, MockTransitionHandler};
pub use definition::{State, StateMachineDefinition, Transition, TransitionTable};
pub use engine::StateMachineEngine;
pub use instance::{StateMachineInstance, TransitionEvent, ERROR_STATE_MARKER};
