//! The mutable state threaded through one pipeline run.

use serde_json::{json, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Data, META_RESPONSE_HANDLED, META_SKIPPED_STEPS};
use crate::errors::StepflowError;

type Handle = Arc<dyn Any + Send + Sync>;

/// Side-channel data for a run.
///
/// Holds JSON values (route pattern, timestamps, flags) and opaque handles
/// such as a raw HTTP request or response writer. Metadata never reaches
/// templates or the final response body.
#[derive(Clone, Default)]
pub struct Metadata {
    values: Data,
    handles: HashMap<String, Handle>,
}

impl Metadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a JSON value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns a string value.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Sets a JSON value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Removes a JSON value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Returns true if a JSON value or a handle is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key) || self.handles.contains_key(key)
    }

    /// Returns all JSON values.
    #[must_use]
    pub fn values(&self) -> &Data {
        &self.values
    }

    /// Stores an opaque handle.
    pub fn insert_handle<T: Any + Send + Sync>(&mut self, key: impl Into<String>, handle: Arc<T>) {
        self.handles.insert(key.into(), handle);
    }

    /// Returns a handle if one of type `T` is stored under `key`.
    #[must_use]
    pub fn handle<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.handles.get(key).cloned()?.downcast::<T>().ok()
    }
}

impl std::fmt::Debug for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut handles: Vec<&String> = self.handles.keys().collect();
        handles.sort();
        f.debug_struct("Metadata")
            .field("values", &self.values)
            .field("handles", &handles)
            .finish()
    }
}

/// Per-run state shared by every step of a pipeline.
///
/// * `trigger` is the read-only input that started the run.
/// * `current` is the working set, seeded from the trigger. Step outputs
///   merge into it with last-write-wins semantics.
/// * the step output ledger maps each completed step to its output. An entry
///   is written exactly once per run.
/// * `metadata` carries side-channel signals.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    trigger: Data,
    current: Data,
    step_outputs: HashMap<String, Data>,
    order: Vec<String>,
    metadata: Metadata,
}

impl ExecutionContext {
    /// Creates a fresh context seeded with the trigger data.
    #[must_use]
    pub fn new(trigger: Data) -> Self {
        Self {
            current: trigger.clone(),
            trigger,
            ..Self::default()
        }
    }

    /// Seeds metadata values.
    #[must_use]
    pub fn with_metadata(mut self, values: Data) -> Self {
        for (key, value) in values {
            self.metadata.insert(key, value);
        }
        self
    }

    /// Returns the trigger data.
    #[must_use]
    pub fn trigger(&self) -> &Data {
        &self.trigger
    }

    /// Returns the working set.
    #[must_use]
    pub fn current(&self) -> &Data {
        &self.current
    }

    /// Returns the working set for modification.
    pub fn current_mut(&mut self) -> &mut Data {
        &mut self.current
    }

    /// Returns a top-level value from the working set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.current.get(key)
    }

    /// Sets a top-level value in the working set.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.current.insert(key.into(), value.into());
    }

    /// Returns the recorded output of a completed step.
    #[must_use]
    pub fn step_output(&self, step: &str) -> Option<&Data> {
        self.step_outputs.get(step)
    }

    /// Returns the whole step output ledger.
    #[must_use]
    pub fn step_outputs(&self) -> &HashMap<String, Data> {
        &self.step_outputs
    }

    /// Returns true if the step completed in this run.
    #[must_use]
    pub fn has_step_output(&self, step: &str) -> bool {
        self.step_outputs.contains_key(step)
    }

    /// Returns the names of completed steps in completion order.
    #[must_use]
    pub fn executed_steps(&self) -> &[String] {
        &self.order
    }

    /// Records a step's output and merges it into the working set.
    ///
    /// Fails without touching the context if the step already has an entry.
    pub fn merge_step_output(&mut self, step: &str, output: Data) -> Result<(), StepflowError> {
        if self.step_outputs.contains_key(step) {
            return Err(StepflowError::OutputConflict(step.to_string()));
        }
        for (key, value) in &output {
            self.current.insert(key.clone(), value.clone());
        }
        self.step_outputs.insert(step.to_string(), output);
        self.order.push(step.to_string());
        Ok(())
    }

    /// Notes a step that failed and was skipped.
    pub fn record_skipped(&mut self, step: &str, error: &str) {
        let entry = json!({ "step": step, "error": error });
        match self.metadata.values.get_mut(META_SKIPPED_STEPS) {
            Some(Value::Array(items)) => items.push(entry),
            _ => {
                self.metadata
                    .insert(META_SKIPPED_STEPS, Value::Array(vec![entry]));
            }
        }
    }

    /// Returns the names of skipped steps in the order they were skipped.
    #[must_use]
    pub fn skipped_steps(&self) -> Vec<String> {
        self.metadata
            .get(META_SKIPPED_STEPS)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("step").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the run metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the run metadata for modification.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Flags that a step already wrote the response.
    pub fn mark_response_handled(&mut self) {
        self.metadata.insert(META_RESPONSE_HANDLED, true);
    }

    /// Returns true if a step already wrote the response.
    #[must_use]
    pub fn response_handled(&self) -> bool {
        self.metadata
            .get(META_RESPONSE_HANDLED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Consumes the context, returning the working set.
    #[must_use]
    pub fn into_current(self) -> Data {
        self.current
    }
}
