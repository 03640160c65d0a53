//! Logs a resolved message.

use async_trait::async_trait;
use tracing::{debug, error, info, warn, Level};

use crate::cancellation::CancellationToken;
use crate::context::{Data, ExecutionContext};
use crate::errors::{ConfigError, StepflowError};
use crate::steps::{Step, StepConfig, StepResult};
use crate::template::TemplateResolver;

/// Resolves `message` and logs it at `level` (`debug`, `info`, `warn` or
/// `error`; default `info`). Produces no output.
#[derive(Debug, Clone)]
pub struct LogStep {
    name: String,
    message: String,
    level: Level,
}

impl LogStep {
    /// Creates the step.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>, level: Level) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            level,
        }
    }

    /// Builds the step from its config mapping.
    pub fn from_config(name: &str, config: &Data) -> Result<Self, StepflowError> {
        let cfg = StepConfig::new(name, config);
        let message = cfg.require_str("message")?;
        let level = match cfg.optional_str("level")?.as_deref() {
            None | Some("info") => Level::INFO,
            Some("debug") => Level::DEBUG,
            Some("warn") => Level::WARN,
            Some("error") => Level::ERROR,
            Some(other) => {
                return Err(ConfigError::invalid(
                    name,
                    "level",
                    format!("unknown level '{other}'"),
                )
                .into())
            }
        };
        Ok(Self::new(name, message, level))
    }
}

#[async_trait]
impl Step for LogStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _cancel: &CancellationToken,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult, StepflowError> {
        let message = TemplateResolver::new().resolve(&self.message, ctx)?;
        match self.level {
            Level::ERROR => error!(step = %self.name, "{}", message),
            Level::WARN => warn!(step = %self.name, "{}", message),
            Level::DEBUG | Level::TRACE => debug!(step = %self.name, "{}", message),
            _ => info!(step = %self.name, "{}", message),
        }
        Ok(StepResult::empty())
    }
}
