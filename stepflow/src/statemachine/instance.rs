//! Per-entity state machine instances and their transition records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::Data;

/// Marker stored on instances that enter an error state.
pub const ERROR_STATE_MARKER: &str = "workflow ended in error state";

/// One applied (or about to be applied) transition.
///
/// Handlers receive it before the change is committed. Instances keep the
/// committed records as their history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    /// Machine name.
    pub machine: String,
    /// The entity being transitioned.
    pub entity_id: String,
    /// Event that fired the transition.
    pub event: String,
    /// State before the transition.
    pub from: String,
    /// State after the transition.
    pub to: String,
    /// Caller-supplied transition data.
    #[serde(default)]
    pub data: Data,
    /// When the transition was requested.
    pub at: DateTime<Utc>,
}

/// Live state of one entity within a machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMachineInstance {
    /// The entity id.
    pub entity_id: String,
    /// Machine name.
    pub machine: String,
    /// Current state; always a state of the machine.
    pub current_state: String,
    /// State before the last transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<String>,
    /// Seed data merged with the data of every applied transition.
    #[serde(default)]
    pub data: Data,
    /// Applied transitions, oldest first.
    #[serde(default)]
    pub history: Vec<TransitionEvent>,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Time of the last change.
    pub updated_at: DateTime<Utc>,
    /// Set once a final state is entered.
    #[serde(default)]
    pub completed: bool,
    /// Set once an error state is entered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StateMachineInstance {
    pub(crate) fn new(
        machine: impl Into<String>,
        entity_id: impl Into<String>,
        state: impl Into<String>,
        data: Data,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id: entity_id.into(),
            machine: machine.into(),
            current_state: state.into(),
            previous_state: None,
            data,
            history: Vec::new(),
            started_at: now,
            updated_at: now,
            completed: false,
            error: None,
        }
    }

    pub(crate) fn apply(&mut self, event: TransitionEvent, is_final: bool, is_error: bool) {
        self.previous_state = Some(std::mem::replace(&mut self.current_state, event.to.clone()));
        self.updated_at = event.at;
        for (key, value) in &event.data {
            self.data.insert(key.clone(), value.clone());
        }
        if is_final {
            self.completed = true;
        }
        if is_error {
            self.error = Some(ERROR_STATE_MARKER.to_string());
        }
        self.history.push(event);
    }

    /// Returns the most recent transition, if any.
    #[must_use]
    pub fn last_transition(&self) -> Option<&TransitionEvent> {
        self.history.last()
    }
}
