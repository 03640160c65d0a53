//! Named collaborators that steps resolve at build or run time.
//!
//! Steps never hold direct references to engines or clients configured
//! elsewhere. They ask the [`ServiceRegistry`] for a name and a narrow
//! capability trait, so tests can register a mock implementing only that
//! capability.

mod flags;
mod registry;

pub use flags::{
    EvaluationContext, FlagEvaluator, FlagValue, StaticFlagEvaluator, DEFAULT_FLAG_SERVICE,
};
#[cfg(test)]
pub use flags::MockFlagEvaluator;
pub use registry::ServiceRegistry;
