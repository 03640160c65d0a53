//! Writes resolved values into the context.

use async_trait::async_trait;

use crate::cancellation::CancellationToken;
use crate::context::{Data, ExecutionContext};
use crate::errors::StepflowError;
use crate::steps::{Step, StepConfig, StepResult};
use crate::template::TemplateResolver;

/// Resolves the `values` mapping and outputs it.
///
/// ```json
/// {"type": "step.set", "config": {"values": {"order_id": "{{ .id }}", "status": "new"}}}
/// ```
#[derive(Debug, Clone)]
pub struct SetStep {
    name: String,
    values: Data,
}

impl SetStep {
    /// Creates the step.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Data) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Builds the step from its config mapping.
    pub fn from_config(name: &str, config: &Data) -> Result<Self, StepflowError> {
        let values = StepConfig::new(name, config).require_map("values")?;
        Ok(Self::new(name, values))
    }
}

#[async_trait]
impl Step for SetStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError> {
        let output = TemplateResolver::new().resolve_map(&self.values, ctx)?;
        Ok(StepResult::new(output))
    }
}
