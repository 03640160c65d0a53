//! Loading engine configuration from disk.

use serde_json::json;
use std::io::Write;
use stepflow::prelude::*;

const CONFIG: &str = r#"{
    "state_machines": [{
        "name": "ticket-sm",
        "definition": {
            "name": "ticket",
            "initialState": "open",
            "states": [
                {"name": "open"},
                {"name": "triaged"},
                {"name": "closed", "isFinal": true}
            ],
            "transitions": [
                {"name": "triage", "fromState": "open", "toState": "triaged"},
                {"name": "close", "fromState": "triaged", "toState": "closed"}
            ]
        }
    }],
    "pipelines": [{
        "name": "advance-ticket",
        "route_pattern": "/tickets/{id}/advance",
        "steps": [
            {"name": "advance", "type": "step.statemachine_transition",
             "config": {"statemachine": "ticket-sm", "entity_id": "{{.ticket_id}}", "event": "{{.event}}"}},
            {"name": "summary", "type": "step.set",
             "config": {"values": {"message": "ticket {{.ticket_id}} is {{ .steps.advance.new_state }}"}}}
        ]
    }]
}"#;

#[tokio::test]
async fn engine_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();

    let config = EngineConfig::from_path(file.path()).unwrap();
    let engine = WorkflowEngine::from_config(&config, &StepRegistry::with_builtins()).unwrap();
    let cancel = CancellationToken::new();

    for event in ["triage", "close"] {
        let trigger = json!({"ticket_id": "t-1", "event": event});
        engine
            .run("advance-ticket", trigger.as_object().cloned().unwrap(), &cancel)
            .await
            .unwrap();
    }

    let instance = engine
        .state_machine("ticket-sm")
        .unwrap()
        .get_instance("t-1")
        .await
        .unwrap();
    assert_eq!(instance.current_state, "closed");
    assert!(instance.completed);
    assert_eq!(instance.history.len(), 2);
}

#[tokio::test]
async fn summary_interpolates_new_state() {
    let config = EngineConfig::from_json_str(CONFIG).unwrap();
    let engine = WorkflowEngine::from_config(&config, &StepRegistry::with_builtins()).unwrap();

    let trigger = json!({"ticket_id": "t-2", "event": "triage"});
    let ctx = engine
        .execute("advance-ticket", trigger.as_object().cloned().unwrap(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(ctx.get("message"), Some(&json!("ticket t-2 is triaged")));
    assert_eq!(
        ctx.metadata().get_str(stepflow::context::META_ROUTE_PATTERN),
        Some("/tickets/{id}/advance")
    );
}

#[tokio::test]
async fn hard_transition_failure_aborts() {
    let config = EngineConfig::from_json_str(CONFIG).unwrap();
    let engine = WorkflowEngine::from_config(&config, &StepRegistry::with_builtins()).unwrap();

    let trigger = json!({"ticket_id": "t-3", "event": "close"});
    let failure = engine
        .run("advance-ticket", trigger.as_object().cloned().unwrap(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(failure.root_error().is_invalid_transition());
    assert!(!failure.context.has_step_output("summary"));
}

#[test]
fn unreadable_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EngineConfig::from_path(dir.path().join("missing.json")).unwrap_err();
    assert!(matches!(err, StepflowError::Io(_)));
}
