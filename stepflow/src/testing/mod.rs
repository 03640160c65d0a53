//! Testing utilities for stepflow pipelines.
//!
//! This module provides:
//! - Mock, failing, recording and slow steps
//! - A recording [`TransitionTrigger`](crate::statemachine::TransitionTrigger) double
//! - Assertions for step results and run contexts

mod assertions;
mod mocks;

pub use assertions::{
    assert_jumps_to, assert_output_contains, assert_output_value, assert_step_output,
    assert_steps_executed,
};
pub use mocks::{
    execution_log, ExecutionLog, FailingStep, MockStep, MockTransitionTrigger, RecordingStep,
    SlowStep, TriggerCall,
};
