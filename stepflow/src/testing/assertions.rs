//! Test assertions for step results and run contexts.

use serde_json::Value;

use crate::context::ExecutionContext;
use crate::steps::{Flow, StepResult};

/// Asserts that the output contains a specific key.
pub fn assert_output_contains(result: &StepResult, key: &str) {
    assert!(
        result.output.contains_key(key),
        "Expected output to contain key '{}', but it doesn't. Keys: {:?}",
        key,
        result.output.keys().collect::<Vec<_>>()
    );
}

/// Asserts that the output holds `expected` under `key`.
pub fn assert_output_value(result: &StepResult, key: &str, expected: &Value) {
    let actual = result.output.get(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected value {expected:?} for key '{key}', got {actual:?}"
    );
}

/// Asserts that the result jumps to `target`.
pub fn assert_jumps_to(result: &StepResult, target: &str) {
    assert_eq!(
        result.flow,
        Flow::Jump(target.to_string()),
        "Expected a jump to '{}', got {:?}",
        target,
        result.flow
    );
}

/// Asserts that `step` completed and recorded `expected` under `key`.
pub fn assert_step_output(ctx: &ExecutionContext, step: &str, key: &str, expected: &Value) {
    let output = ctx
        .step_output(step)
        .unwrap_or_else(|| panic!("Expected step '{step}' to have output, but it didn't run"));
    assert_eq!(
        output.get(key),
        Some(expected),
        "Unexpected value for '{key}' in output of step '{step}'"
    );
}

/// Asserts that exactly `expected` steps completed, in that order.
pub fn assert_steps_executed(ctx: &ExecutionContext, expected: &[&str]) {
    let actual: Vec<&str> = ctx.executed_steps().iter().map(String::as_str).collect();
    assert_eq!(actual, expected, "Unexpected executed steps");
}
