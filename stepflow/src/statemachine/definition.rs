//! State machine definitions and the compiled transition table.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::context::Data;
use crate::errors::TransitionError;

/// A named state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    /// State name, unique within the machine.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Entering this state completes the instance.
    #[serde(default, alias = "is_final")]
    pub is_final: bool,
    /// Entering this state marks the instance as failed.
    #[serde(default, alias = "is_error")]
    pub is_error: bool,
    /// Arbitrary state data.
    #[serde(default, skip_serializing_if = "Data::is_empty")]
    pub data: Data,
}

impl State {
    /// Creates a plain state.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Marks the state as final.
    #[must_use]
    pub fn final_state(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Marks the state as an error state.
    #[must_use]
    pub fn error_state(mut self) -> Self {
        self.is_error = true;
        self
    }
}

/// A rule moving an entity from one state to another when an event arrives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    /// The event name that fires the transition.
    #[serde(alias = "event")]
    pub name: String,
    /// Source state.
    #[serde(rename = "fromState", alias = "from", alias = "from_state")]
    pub from: String,
    /// Target state.
    #[serde(rename = "toState", alias = "to", alias = "to_state")]
    pub to: String,
    /// Fire this transition automatically when its source state is entered.
    #[serde(default, alias = "auto_transform")]
    pub auto_transform: bool,
    /// Arbitrary rule data.
    #[serde(default, skip_serializing_if = "Data::is_empty")]
    pub data: Data,
}

impl Transition {
    /// Creates a transition.
    #[must_use]
    pub fn new(name: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            to: to.into(),
            ..Self::default()
        }
    }

    /// Marks the transition as automatic.
    #[must_use]
    pub fn automatic(mut self) -> Self {
        self.auto_transform = true;
        self
    }
}

/// Static description of a state machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMachineDefinition {
    /// Machine name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// State new instances start in.
    #[serde(alias = "initial_state")]
    pub initial_state: String,
    /// All states.
    pub states: Vec<State>,
    /// All transitions.
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl StateMachineDefinition {
    /// Creates an empty definition.
    #[must_use]
    pub fn new(name: impl Into<String>, initial_state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial_state: initial_state.into(),
            ..Self::default()
        }
    }

    /// Adds a state.
    #[must_use]
    pub fn state(mut self, state: State) -> Self {
        self.states.push(state);
        self
    }

    /// Adds a transition.
    #[must_use]
    pub fn transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Returns a state by name.
    #[must_use]
    pub fn find_state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    /// Checks the definition for structural problems.
    pub fn validate(&self) -> Result<(), TransitionError> {
        let invalid = |reason: String| TransitionError::InvalidDefinition {
            machine: self.name.clone(),
            reason,
        };

        if self.states.is_empty() {
            return Err(invalid("no states defined".to_string()));
        }

        let mut names = HashSet::new();
        for state in &self.states {
            if state.name.is_empty() {
                return Err(invalid("state with empty name".to_string()));
            }
            if !names.insert(state.name.as_str()) {
                return Err(invalid(format!("state '{}' defined twice", state.name)));
            }
        }

        if !names.contains(self.initial_state.as_str()) {
            return Err(invalid(format!(
                "initial state '{}' is not defined",
                self.initial_state
            )));
        }

        let mut seen = HashSet::new();
        for t in &self.transitions {
            if t.name.is_empty() {
                return Err(invalid(format!("transition from '{}' has no event name", t.from)));
            }
            for endpoint in [&t.from, &t.to] {
                if !names.contains(endpoint.as_str()) {
                    return Err(invalid(format!(
                        "transition '{}' references unknown state '{endpoint}'",
                        t.name
                    )));
                }
            }
            if !seen.insert((t.from.as_str(), t.name.as_str())) {
                return Err(invalid(format!(
                    "event '{}' defined twice from state '{}'",
                    t.name, t.from
                )));
            }
        }

        Ok(())
    }
}

/// Transition lookup keyed by `(from state, event)`.
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    rules: HashMap<String, HashMap<String, Transition>>,
    auto: HashMap<String, Transition>,
}

impl TransitionTable {
    /// Compiles the table from a validated definition.
    #[must_use]
    pub fn compile(definition: &StateMachineDefinition) -> Self {
        let mut table = Self::default();
        for t in &definition.transitions {
            table
                .rules
                .entry(t.from.clone())
                .or_default()
                .insert(t.name.clone(), t.clone());
            if t.auto_transform {
                table.auto.entry(t.from.clone()).or_insert_with(|| t.clone());
            }
        }
        table
    }

    /// Returns the rule for `event` in state `from`.
    #[must_use]
    pub fn get(&self, from: &str, event: &str) -> Option<&Transition> {
        self.rules.get(from)?.get(event)
    }

    /// Returns the first automatic transition leaving `from`, in declaration order.
    #[must_use]
    pub fn automatic_from(&self, from: &str) -> Option<&Transition> {
        self.auto.get(from)
    }

    /// Returns the events accepted in state `from`, sorted.
    #[must_use]
    pub fn events_from(&self, from: &str) -> Vec<String> {
        let mut events: Vec<String> = self
            .rules
            .get(from)
            .map(|rules| rules.keys().cloned().collect())
            .unwrap_or_default();
        events.sort();
        events
    }
}
