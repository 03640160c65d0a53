//! Feature flag evaluation and gating.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::resolve_service;
use crate::cancellation::CancellationToken;
use crate::context::{Data, ExecutionContext};
use crate::errors::StepflowError;
use crate::services::{EvaluationContext, FlagEvaluator, FlagValue, ServiceRegistry, DEFAULT_FLAG_SERVICE};
use crate::steps::{Step, StepConfig, StepResult};
use crate::template::TemplateResolver;

/// The flag lookup shared by both flag steps.
#[derive(Clone)]
struct FlagLookup {
    flag: String,
    user_from: Option<String>,
    evaluator: Arc<dyn FlagEvaluator>,
}

impl FlagLookup {
    fn from_config(
        name: &str,
        cfg: &StepConfig<'_>,
        services: Option<&Arc<ServiceRegistry>>,
    ) -> Result<Self, StepflowError> {
        let flag = cfg.require_str("flag")?;
        let user_from = cfg.optional_str("user_from")?;
        let service = cfg
            .optional_str("service")?
            .unwrap_or_else(|| DEFAULT_FLAG_SERVICE.to_string());
        let evaluator = resolve_service::<dyn FlagEvaluator>(name, services, &service)?;
        Ok(Self {
            flag,
            user_from,
            evaluator,
        })
    }

    /// Resolves the flag name and evaluates it, returning both.
    async fn evaluate(&self, ctx: &ExecutionContext) -> Result<(String, FlagValue), StepflowError> {
        let resolver = TemplateResolver::new();
        let flag = resolver.resolve(&self.flag, ctx)?;
        let mut eval_ctx = EvaluationContext::new();
        if let Some(user_from) = &self.user_from {
            eval_ctx = eval_ctx.with_user(resolver.resolve(user_from, ctx)?);
        }
        let value = self.evaluator.evaluate(&flag, &eval_ctx).await?;
        Ok((flag, value))
    }
}

impl std::fmt::Debug for FlagLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagLookup")
            .field("flag", &self.flag)
            .field("user_from", &self.user_from)
            .finish_non_exhaustive()
    }
}

/// Evaluates a flag and outputs `{"enabled": bool, "variant": string}` under
/// `output_key`, which defaults to the resolved flag name.
///
/// The evaluator is resolved from the service named by `service` (default
/// `featureflag.service`) when the step is built.
#[derive(Debug, Clone)]
pub struct FeatureFlagStep {
    name: String,
    lookup: FlagLookup,
    output_key: Option<String>,
}

impl FeatureFlagStep {
    /// Creates the step with an explicit evaluator.
    #[must_use]
    pub fn new(name: impl Into<String>, flag: impl Into<String>, evaluator: Arc<dyn FlagEvaluator>) -> Self {
        Self {
            name: name.into(),
            output_key: None,
            lookup: FlagLookup {
                flag: flag.into(),
                user_from: None,
                evaluator,
            },
        }
    }

    /// Sets the output key.
    #[must_use]
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Sets the template that yields the user key.
    #[must_use]
    pub fn with_user_from(mut self, template: impl Into<String>) -> Self {
        self.lookup.user_from = Some(template.into());
        self
    }

    /// Builds the step from its config mapping.
    pub fn from_config(
        name: &str,
        config: &Data,
        services: Option<&Arc<ServiceRegistry>>,
    ) -> Result<Self, StepflowError> {
        let cfg = StepConfig::new(name, config);
        let lookup = FlagLookup::from_config(name, &cfg, services)?;
        let output_key = cfg.optional_str("output_key")?;
        Ok(Self {
            name: name.to_string(),
            lookup,
            output_key,
        })
    }
}

#[async_trait]
impl Step for FeatureFlagStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError> {
        let (flag, value) = self.lookup.evaluate(ctx).await?;
        let key = self.output_key.clone().unwrap_or(flag);
        Ok(StepResult::empty().with_value(
            key,
            json!({"enabled": value.enabled(), "variant": value.variant()}),
        ))
    }
}

/// Evaluates a flag and jumps to `on_enabled` or `on_disabled`.
///
/// Outputs `{"enabled": bool}`.
#[derive(Debug, Clone)]
pub struct FeatureFlagGateStep {
    name: String,
    lookup: FlagLookup,
    on_enabled: String,
    on_disabled: String,
}

impl FeatureFlagGateStep {
    /// Creates the step with an explicit evaluator.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        flag: impl Into<String>,
        on_enabled: impl Into<String>,
        on_disabled: impl Into<String>,
        evaluator: Arc<dyn FlagEvaluator>,
    ) -> Self {
        Self {
            name: name.into(),
            lookup: FlagLookup {
                flag: flag.into(),
                user_from: None,
                evaluator,
            },
            on_enabled: on_enabled.into(),
            on_disabled: on_disabled.into(),
        }
    }

    /// Builds the step from its config mapping.
    pub fn from_config(
        name: &str,
        config: &Data,
        services: Option<&Arc<ServiceRegistry>>,
    ) -> Result<Self, StepflowError> {
        let cfg = StepConfig::new(name, config);
        let on_enabled = cfg.require_str("on_enabled")?;
        let on_disabled = cfg.require_str("on_disabled")?;
        let lookup = FlagLookup::from_config(name, &cfg, services)?;
        Ok(Self {
            name: name.to_string(),
            lookup,
            on_enabled,
            on_disabled,
        })
    }
}

#[async_trait]
impl Step for FeatureFlagGateStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError> {
        let enabled = self.lookup.evaluate(ctx).await?.1.enabled();
        let target = if enabled { &self.on_enabled } else { &self.on_disabled };
        Ok(StepResult::empty()
            .with_value("enabled", enabled)
            .jump_to(target.clone()))
    }

    fn jump_targets(&self) -> Vec<String> {
        vec![self.on_enabled.clone(), self.on_disabled.clone()]
    }
}
