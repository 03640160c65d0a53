//! Pipeline building and execution.
//!
//! This module provides:
//! - declarative pipeline definitions
//! - a builder that validates step names and jump targets
//! - the sequential executor with error strategies and compensation

mod builder;
mod definition;
mod executor;
#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use definition::{ErrorStrategy, PipelineDefinition, StepDefinition};
pub use executor::{Pipeline, RunFailure};
