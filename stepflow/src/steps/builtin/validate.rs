//! Checks that required fields are present.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cancellation::CancellationToken;
use crate::context::{Data, ExecutionContext};
use crate::errors::{ConfigError, StepflowError};
use crate::steps::{Step, StepConfig, StepResult};
use crate::template::TemplateResolver;

/// Reports whether every path in `required` resolves to a non-null value.
///
/// A failed check is a soft failure: the step succeeds with
/// `{"valid": false, "missing": [...], "reason": "..."}` so later steps can
/// branch on it.
#[derive(Debug, Clone)]
pub struct ValidateStep {
    name: String,
    required: Vec<String>,
}

impl ValidateStep {
    /// Creates the step.
    #[must_use]
    pub fn new(name: impl Into<String>, required: Vec<String>) -> Self {
        Self {
            name: name.into(),
            required,
        }
    }

    /// Builds the step from its config mapping.
    pub fn from_config(name: &str, config: &Data) -> Result<Self, StepflowError> {
        let required = StepConfig::new(name, config).string_list("required")?;
        if required.is_empty() {
            return Err(ConfigError::invalid(name, "required", "must list at least one field").into());
        }
        Ok(Self::new(name, required))
    }
}

#[async_trait]
impl Step for ValidateStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError> {
        let ctx: &ExecutionContext = ctx;
        let resolver = TemplateResolver::new();
        let missing: Vec<&str> = self
            .required
            .iter()
            .map(String::as_str)
            .filter(|path| !matches!(resolver.lookup(path, ctx), Ok(v) if !v.is_null()))
            .collect();

        let reason = if missing.is_empty() {
            Value::Null
        } else {
            Value::String(format!("missing required fields: {}", missing.join(", ")))
        };

        Ok(StepResult::empty()
            .with_value("valid", missing.is_empty())
            .with_value("missing", json!(missing))
            .with_value("reason", reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn step() -> ValidateStep {
        let config = json!({"required": ["email", "address.city", ".steps.fetch.id"]});
        ValidateStep::from_config("check", config.as_object().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_all_present() {
        let mut ctx = ExecutionContext::new(
            json!({"email": "a@example.com", "address": {"city": "Oslo"}})
                .as_object()
                .cloned()
                .unwrap(),
        );
        ctx.merge_step_output("fetch", json!({"id": 1}).as_object().cloned().unwrap())
            .unwrap();

        let result = step().execute(&CancellationToken::new(), &mut ctx).await.unwrap();
        assert_eq!(
            Value::Object(result.output),
            json!({"valid": true, "missing": [], "reason": null})
        );
    }

    #[tokio::test]
    async fn test_missing_is_soft_failure() {
        let mut ctx = ExecutionContext::new(json!({"email": null}).as_object().cloned().unwrap());

        let result = step().execute(&CancellationToken::new(), &mut ctx).await.unwrap();
        assert_eq!(result.output.get("valid"), Some(&json!(false)));
        assert_eq!(
            result.output.get("missing"),
            Some(&json!(["email", "address.city", ".steps.fetch.id"]))
        );
        assert!(result.output["reason"].as_str().unwrap().contains("email"));
    }

    #[test]
    fn test_requires_fields() {
        assert!(ValidateStep::from_config("check", &Data::new()).is_err());
    }
}
