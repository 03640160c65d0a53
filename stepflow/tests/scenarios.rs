//! End-to-end scenarios through the public API.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use stepflow::prelude::*;
use stepflow::steps::builtin::StateTransitionStep;
use stepflow::testing::{assert_step_output, MockStep, MockTransitionTrigger};

fn data(value: Value) -> Data {
    value.as_object().cloned().unwrap()
}

fn order_machine() -> Arc<StateMachineEngine> {
    let definition = StateMachineDefinition::new("order", "pending")
        .state(State::new("pending"))
        .state(State::new("approved"))
        .transition(Transition::new("approve", "pending", "approved"));
    Arc::new(StateMachineEngine::new("order-sm", definition).unwrap())
}

#[tokio::test]
async fn seeded_entity_transitions() {
    let machine = order_machine();
    machine.create_instance("order-1", Data::new()).await.unwrap();

    machine
        .trigger_transition(&CancellationToken::new(), "order-1", "approve", Data::new())
        .await
        .unwrap();

    let instance = machine.get_instance("order-1").await.unwrap();
    assert_eq!(instance.current_state, "approved");
    assert_eq!(instance.previous_state.as_deref(), Some("pending"));
}

#[tokio::test]
async fn invalid_transition_leaves_state_unchanged() {
    let machine = order_machine();
    machine
        .trigger_transition(&CancellationToken::new(), "order-1", "approve", Data::new())
        .await
        .unwrap();

    let err = machine
        .trigger_transition(&CancellationToken::new(), "order-1", "approve", Data::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TransitionError::InvalidTransition { ref state, .. } if state == "approved"));
    assert_eq!(machine.get_instance("order-1").await.unwrap().current_state, "approved");
}

#[tokio::test]
async fn lookup_never_creates_instances() {
    let machine = order_machine();

    let err = machine.get_instance("ghost").await.unwrap_err();

    assert!(matches!(err, TransitionError::InstanceNotFound { .. }));
    assert_eq!(machine.instance_count().await, 0);
}

#[tokio::test]
async fn rejected_first_event_creates_nothing() {
    let machine = order_machine();

    let err = machine
        .trigger_transition(&CancellationToken::new(), "fresh", "ship", Data::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TransitionError::InvalidTransition { ref state, .. } if state == "pending"));
    assert!(machine.get_instance("fresh").await.is_err());
    assert_eq!(machine.instance_count().await, 0);
}

#[tokio::test]
async fn later_output_wins_and_ledger_keeps_both() {
    let pipeline = PipelineBuilder::new("merge")
        .step(Arc::new(MockStep::new("stepA").with_output("x", 1)))
        .step(Arc::new(MockStep::new("stepB").with_output("x", 2)))
        .build()
        .unwrap();

    let ctx = pipeline.execute(&CancellationToken::new(), Data::new()).await.unwrap();

    assert_eq!(ctx.get("x"), Some(&json!(2)));
    assert_step_output(&ctx, "stepA", "x", &json!(1));
    assert_step_output(&ctx, "stepB", "x", &json!(2));
}

#[tokio::test]
async fn gate_branches_from_config() {
    let services = Arc::new(ServiceRegistry::new());
    let flags = Arc::new(StaticFlagEvaluator::new().with_flag("fast_path", true));
    services.provide::<dyn FlagEvaluator>("flags", flags);
    let config: EngineConfig = serde_json::from_value(json!({
        "pipelines": [{
            "name": "gated",
            "steps": [
                {"name": "gate", "type": "step.ff_gate",
                 "config": {"flag": "fast_path", "service": "flags", "on_enabled": "path-a", "on_disabled": "path-b"}},
                {"name": "path-b", "type": "step.set", "config": {"values": {"path": "b"}}},
                {"name": "path-a", "type": "step.set", "config": {"values": {"path": "a"}}}
            ]
        }]
    }))
    .unwrap();
    let engine = WorkflowEngine::with_services(&config, &StepRegistry::with_builtins(), services).unwrap();

    let ctx = engine
        .execute("gated", Data::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(ctx.get("path"), Some(&json!("a")));
    assert!(!ctx.has_step_output("path-b"));
}

#[tokio::test]
async fn reference_to_unrun_step_names_the_path() {
    let config: EngineConfig = serde_json::from_value(json!({
        "pipelines": [{
            "name": "early",
            "steps": [
                {"name": "use", "type": "step.set", "config": {"values": {"items": "{{.steps.fetch.items}}"}}},
                {"name": "fetch", "type": "step.set", "config": {"values": {"items": [1, 2]}}}
            ]
        }]
    }))
    .unwrap();
    let engine = WorkflowEngine::from_config(&config, &StepRegistry::with_builtins()).unwrap();

    let failure = engine
        .run("early", Data::new(), &CancellationToken::new())
        .await
        .unwrap_err();

    match failure.root_error() {
        StepflowError::Template(err) => assert_eq!(err.path(), "steps.fetch.items"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn transition_step_uses_narrow_capability() {
    let services = Arc::new(ServiceRegistry::new());
    let trigger = Arc::new(MockTransitionTrigger::new("order-sm", "pending").accepting("approve", "approved"));
    services.provide::<dyn TransitionTrigger>("order-sm", trigger.clone());
    let step = StateTransitionStep::from_config(
        "approve",
        &data(json!({
            "statemachine": "order-sm",
            "entity_id": "{{.order_id}}",
            "event": "approve",
            "data": {"approved_by": "{{.user_id}}"}
        })),
        Some(&services),
    )
    .unwrap();
    let pipeline = PipelineBuilder::new("approve").step(Arc::new(step)).build().unwrap();

    let out = pipeline
        .run(&CancellationToken::new(), data(json!({"order_id": "o-9", "user_id": "u-1"})))
        .await
        .unwrap();

    assert_eq!(out["new_state"], json!("approved"));
    let calls = trigger.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].entity_id, "o-9");
    assert_eq!(calls[0].data, data(json!({"approved_by": "u-1"})));
}
