//! Registry mapping step `type` names to factories.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::builtin;
use super::Step;
use crate::context::Data;
use crate::errors::{ContractErrorInfo, PipelineValidationError, StepflowError};
use crate::services::ServiceRegistry;

/// Builds a step from its name, config mapping and optional service registry.
pub type StepFactory = Arc<
    dyn Fn(&str, &Data, Option<&Arc<ServiceRegistry>>) -> Result<Arc<dyn Step>, StepflowError>
        + Send
        + Sync,
>;

/// Registry for step factories.
///
/// New step kinds are added by registering a factory under a type name; the
/// pipeline and this registry need no changes.
#[derive(Default)]
pub struct StepRegistry {
    factories: RwLock<HashMap<String, StepFactory>>,
}

impl StepRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in step kind.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtin::register_all(&registry);
        registry
    }

    /// Registers a factory, replacing any factory with the same type name.
    pub fn register<F>(&self, step_type: impl Into<String>, factory: F)
    where
        F: Fn(&str, &Data, Option<&Arc<ServiceRegistry>>) -> Result<Arc<dyn Step>, StepflowError>
            + Send
            + Sync
            + 'static,
    {
        self.factories
            .write()
            .insert(step_type.into(), Arc::new(factory));
    }

    /// Returns true if a factory is registered for `step_type`.
    #[must_use]
    pub fn contains(&self, step_type: &str) -> bool {
        self.factories.read().contains_key(step_type)
    }

    /// Returns the registered type names, sorted.
    #[must_use]
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Builds a step of type `step_type`.
    pub fn create(
        &self,
        step_type: &str,
        name: &str,
        config: &Data,
        services: Option<&Arc<ServiceRegistry>>,
    ) -> Result<Arc<dyn Step>, StepflowError> {
        let factory = self.factories.read().get(step_type).cloned();
        let Some(factory) = factory else {
            return Err(PipelineValidationError::new(format!(
                "step '{name}' has unknown type '{step_type}'"
            ))
            .with_steps(vec![name.to_string()])
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-003-UNKNOWN_TYPE", "Unknown step type")
                    .with_fix_hint(format!("Register a factory for '{step_type}' or fix the type name"))
                    .with_context_entry("type", step_type),
            )
            .into());
        };
        factory(name, config, services)
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("types", &self.types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{FnStep, StepResult};

    #[test]
    fn test_register_and_create() {
        let registry = StepRegistry::new();
        registry.register("custom.noop", |name, _config, _services| {
            Ok(Arc::new(FnStep::new(name, |_| Ok(StepResult::empty()))) as Arc<dyn Step>)
        });

        assert!(registry.contains("custom.noop"));
        let step = registry
            .create("custom.noop", "first", &Data::new(), None)
            .unwrap();
        assert_eq!(step.name(), "first");
    }

    #[test]
    fn test_unknown_type() {
        let registry = StepRegistry::new();
        let err = registry
            .create("nope", "first", &Data::new(), None)
            .unwrap_err();

        match err {
            StepflowError::Validation(e) => {
                assert_eq!(e.code(), Some("PIPELINE-003-UNKNOWN_TYPE"));
                assert_eq!(e.steps, vec!["first".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = StepRegistry::with_builtins();
        for step_type in [
            builtin::SET,
            builtin::LOG,
            builtin::VALIDATE,
            builtin::CONDITIONAL,
            builtin::FEATURE_FLAG,
            builtin::FF_GATE,
            builtin::STATEMACHINE_GET,
            builtin::STATEMACHINE_TRANSITION,
        ] {
            assert!(registry.contains(step_type), "missing {step_type}");
        }
        assert_eq!(registry.types().len(), 8);
    }
}
