//! Feature flag evaluation capability.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::errors::StepflowError;

/// Service name flag steps use when `service` is not configured.
pub const DEFAULT_FLAG_SERVICE: &str = "featureflag.service";

/// Who a flag is being evaluated for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// The user key, if known.
    pub user_key: Option<String>,
    /// Extra targeting attributes.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl EvaluationContext {
    /// Creates an anonymous evaluation context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user key.
    #[must_use]
    pub fn with_user(mut self, user_key: impl Into<String>) -> Self {
        self.user_key = Some(user_key.into());
        self
    }

    /// Adds a targeting attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// The evaluated value of a flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagValue {
    /// The flag key.
    pub key: String,
    /// The raw flag value.
    pub value: Value,
    /// Where the value came from.
    pub source: String,
}

impl FlagValue {
    /// Creates a flag value.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<Value>, source: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            source: source.into(),
        }
    }

    /// Returns whether the flag counts as enabled.
    ///
    /// Booleans use their value. Strings are enabled unless empty or one of
    /// `false`, `off`, `disabled`. Numbers are enabled when non-zero.
    #[must_use]
    pub fn enabled(&self) -> bool {
        match &self.value {
            Value::Bool(b) => *b,
            Value::String(s) => {
                !(s.is_empty()
                    || s.eq_ignore_ascii_case("false")
                    || s.eq_ignore_ascii_case("off")
                    || s.eq_ignore_ascii_case("disabled"))
            }
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::Null => false,
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
        }
    }

    /// Returns the value as a variant name (`"true"`, `"blue"`, ...).
    #[must_use]
    pub fn variant(&self) -> String {
        crate::template::render(&self.value)
    }
}

/// Evaluates feature flags.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FlagEvaluator: Send + Sync {
    /// Evaluates `key` for the given context.
    async fn evaluate(
        &self,
        key: &str,
        context: &EvaluationContext,
    ) -> Result<FlagValue, StepflowError>;
}

/// In-memory flag evaluator.
///
/// Returns the same value for every evaluation context.
#[derive(Debug, Default)]
pub struct StaticFlagEvaluator {
    flags: RwLock<HashMap<String, Value>>,
}

impl StaticFlagEvaluator {
    /// Creates an evaluator with no flags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a flag.
    #[must_use]
    pub fn with_flag(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets or replaces a flag.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.flags.write().insert(key.into(), value.into());
    }
}

#[async_trait]
impl FlagEvaluator for StaticFlagEvaluator {
    async fn evaluate(
        &self,
        key: &str,
        _context: &EvaluationContext,
    ) -> Result<FlagValue, StepflowError> {
        self.flags
            .read()
            .get(key)
            .map(|value| FlagValue::new(key, value.clone(), "static"))
            .ok_or_else(|| StepflowError::collaborator("flags", format!("unknown flag '{key}'")))
    }
}
