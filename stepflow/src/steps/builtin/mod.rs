//! Built-in step kinds.
//!
//! | type                           | step                       |
//! |--------------------------------|----------------------------|
//! | `step.set`                     | [`SetStep`]                |
//! | `step.log`                     | [`LogStep`]                |
//! | `step.validate`                | [`ValidateStep`]           |
//! | `step.conditional`             | [`ConditionalStep`]        |
//! | `step.feature_flag`            | [`FeatureFlagStep`]        |
//! | `step.ff_gate`                 | [`FeatureFlagGateStep`]    |
//! | `step.statemachine_get`        | [`StateGetStep`]           |
//! | `step.statemachine_transition` | [`StateTransitionStep`]    |

mod conditional;
mod feature_flag;
mod log;
mod set;
mod statemachine;
mod validate;

pub use conditional::ConditionalStep;
pub use feature_flag::{FeatureFlagGateStep, FeatureFlagStep};
pub use log::LogStep;
pub use set::SetStep;
pub use statemachine::{StateGetStep, StateTransitionStep};
pub use validate::ValidateStep;

use std::sync::Arc;

use super::registry::StepRegistry;
use super::Step;
use crate::errors::ServiceError;
use crate::services::ServiceRegistry;

/// Type name of [`SetStep`].
pub const SET: &str = "step.set";
/// Type name of [`LogStep`].
pub const LOG: &str = "step.log";
/// Type name of [`ValidateStep`].
pub const VALIDATE: &str = "step.validate";
/// Type name of [`ConditionalStep`].
pub const CONDITIONAL: &str = "step.conditional";
/// Type name of [`FeatureFlagStep`].
pub const FEATURE_FLAG: &str = "step.feature_flag";
/// Type name of [`FeatureFlagGateStep`].
pub const FF_GATE: &str = "step.ff_gate";
/// Type name of [`StateGetStep`].
pub const STATEMACHINE_GET: &str = "step.statemachine_get";
/// Type name of [`StateTransitionStep`].
pub const STATEMACHINE_TRANSITION: &str = "step.statemachine_transition";

pub(crate) fn register_all(registry: &StepRegistry) {
    registry.register(SET, |name, config, _| {
        Ok(Arc::new(SetStep::from_config(name, config)?) as Arc<dyn Step>)
    });
    registry.register(LOG, |name, config, _| {
        Ok(Arc::new(LogStep::from_config(name, config)?) as Arc<dyn Step>)
    });
    registry.register(VALIDATE, |name, config, _| {
        Ok(Arc::new(ValidateStep::from_config(name, config)?) as Arc<dyn Step>)
    });
    registry.register(CONDITIONAL, |name, config, _| {
        Ok(Arc::new(ConditionalStep::from_config(name, config)?) as Arc<dyn Step>)
    });
    registry.register(FEATURE_FLAG, |name, config, services| {
        Ok(Arc::new(FeatureFlagStep::from_config(name, config, services)?) as Arc<dyn Step>)
    });
    registry.register(FF_GATE, |name, config, services| {
        Ok(Arc::new(FeatureFlagGateStep::from_config(name, config, services)?) as Arc<dyn Step>)
    });
    registry.register(STATEMACHINE_GET, |name, config, services| {
        Ok(Arc::new(StateGetStep::from_config(name, config, services)?) as Arc<dyn Step>)
    });
    registry.register(STATEMACHINE_TRANSITION, |name, config, services| {
        Ok(Arc::new(StateTransitionStep::from_config(name, config, services)?) as Arc<dyn Step>)
    });
}

/// Resolves capability `T` of `service`, tagging failures with the step name.
pub(crate) fn resolve_service<T>(
    step: &str,
    services: Option<&Arc<ServiceRegistry>>,
    service: &str,
) -> Result<Arc<T>, ServiceError>
where
    T: ?Sized + Send + Sync + 'static,
{
    services
        .ok_or_else(|| ServiceError::no_registry(service))
        .and_then(|registry| registry.get::<T>(service))
        .map_err(|e| e.for_step(step))
}
