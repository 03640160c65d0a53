//! Uniform access to the untyped config mapping of a step.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::context::Data;
use crate::errors::ConfigError;

/// Validating view over a step's `config` mapping.
///
/// Factories use it once at construction so that every missing or malformed
/// key produces the same kind of [`ConfigError`].
#[derive(Debug, Clone, Copy)]
pub struct StepConfig<'a> {
    step: &'a str,
    raw: &'a Data,
}

impl<'a> StepConfig<'a> {
    /// Wraps the config of step `step`.
    #[must_use]
    pub fn new(step: &'a str, raw: &'a Data) -> Self {
        Self { step, raw }
    }

    /// Returns the step name.
    #[must_use]
    pub fn step(&self) -> &'a str {
        self.step
    }

    /// Returns a raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.raw.get(key)
    }

    /// Returns a required non-empty string.
    pub fn require_str(&self, key: &str) -> Result<String, ConfigError> {
        match self.optional_str(key)? {
            Some(s) if !s.is_empty() => Ok(s),
            Some(_) => Err(self.invalid(key, "must not be empty")),
            None => Err(ConfigError::missing(self.step, key)),
        }
    }

    /// Returns an optional string. `null` counts as absent.
    pub fn optional_str(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.raw.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(key, "must be a string")),
        }
    }

    /// Returns an optional boolean, or `default` when absent.
    pub fn optional_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.raw.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(self.invalid(key, "must be a boolean")),
            },
            Some(_) => Err(self.invalid(key, "must be a boolean")),
        }
    }

    /// Returns an optional mapping.
    pub fn optional_map(&self, key: &str) -> Result<Option<Data>, ConfigError> {
        match self.raw.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map.clone())),
            Some(_) => Err(self.invalid(key, "must be a mapping")),
        }
    }

    /// Returns a required mapping.
    pub fn require_map(&self, key: &str) -> Result<Data, ConfigError> {
        self.optional_map(key)?
            .ok_or_else(|| ConfigError::missing(self.step, key))
    }

    /// Returns a mapping of strings to strings, empty when absent.
    pub fn string_map(&self, key: &str) -> Result<BTreeMap<String, String>, ConfigError> {
        let Some(map) = self.optional_map(key)? else {
            return Ok(BTreeMap::new());
        };
        map.into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => Ok((k, s)),
                _ => Err(self.invalid(key, format!("entry '{k}' must be a string"))),
            })
            .collect()
    }

    /// Returns a list of strings, empty when absent.
    pub fn string_list(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        match self.raw.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.invalid(key, "must be a list of strings"))
                })
                .collect(),
            Some(_) => Err(self.invalid(key, "must be a list of strings")),
        }
    }

    /// Deserializes the whole mapping into a typed config struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_json::from_value(Value::Object(self.raw.clone()))
            .map_err(|e| self.invalid("*", e.to_string()))
    }

    fn invalid(&self, key: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::invalid(self.step, key, reason)
    }
}
