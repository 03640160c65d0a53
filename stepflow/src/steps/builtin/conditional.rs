//! Routes to a step chosen by the value of a field.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::cancellation::CancellationToken;
use crate::context::{Data, ExecutionContext};
use crate::errors::{ConfigError, StepflowError};
use crate::steps::{Step, StepConfig, StepResult};
use crate::template::{render, TemplateResolver};

/// Resolves `field`, looks its rendered value up in `routes` and jumps to
/// the matching step, or to `default` when nothing matches.
///
/// `field` is either a template (`"{{ .status }}"`) or a bare dotted path
/// (`"status"`).
#[derive(Debug, Clone)]
pub struct ConditionalStep {
    name: String,
    field: String,
    routes: BTreeMap<String, String>,
    default: Option<String>,
}

impl ConditionalStep {
    /// Creates the step.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        field: impl Into<String>,
        routes: BTreeMap<String, String>,
        default: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            routes,
            default,
        }
    }

    /// Builds the step from its config mapping.
    pub fn from_config(name: &str, config: &Data) -> Result<Self, StepflowError> {
        let cfg = StepConfig::new(name, config);
        let field = cfg.require_str("field")?;
        let routes = cfg.string_map("routes")?;
        let default = cfg.optional_str("default")?;
        if routes.is_empty() && default.is_none() {
            return Err(ConfigError::invalid(name, "routes", "needs at least one route or a default").into());
        }
        Ok(Self::new(name, field, routes, default))
    }

    fn field_value(&self, ctx: &ExecutionContext) -> Result<Value, StepflowError> {
        let resolver = TemplateResolver::new();
        let value = if self.field.contains("{{") {
            resolver.resolve_value(&Value::String(self.field.clone()), ctx)?
        } else {
            resolver.lookup(&self.field, ctx)?
        };
        Ok(value)
    }
}

#[async_trait]
impl Step for ConditionalStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError> {
        let key = render(&self.field_value(ctx)?);
        let target = self
            .routes
            .get(&key)
            .or(self.default.as_ref())
            .ok_or_else(|| {
                StepflowError::execution(&self.name, format!("no route for value '{key}' and no default"))
            })?;

        Ok(StepResult::empty()
            .with_value("matched_value", key.clone())
            .jump_to(target.clone()))
    }

    fn jump_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.routes.values().cloned().collect();
        targets.extend(self.default.iter().cloned());
        targets.sort();
        targets.dedup();
        targets
    }
}
