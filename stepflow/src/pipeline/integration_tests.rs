//! Integration tests for pipeline execution.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::context::{
        Data, ExecutionContext, META_COMPLETED_AT, META_EXECUTION_ID, META_PIPELINE,
        META_ROUTE_PATTERN, META_STARTED_AT,
    };
    use crate::errors::{StepflowError, TemplateError};
    use crate::events::{event_types, CollectingEventSink};
    use crate::pipeline::{ErrorStrategy, Pipeline, PipelineBuilder};
    use crate::services::StaticFlagEvaluator;
    use crate::steps::builtin::{FeatureFlagGateStep, SetStep};
    use crate::steps::{FnStep, Step, StepResult};
    use crate::testing::{
        assert_step_output, assert_steps_executed, execution_log, FailingStep, MockStep,
        RecordingStep, SlowStep,
    };
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn data(value: Value) -> Data {
        value.as_object().cloned().unwrap()
    }

    fn mock(name: &str, key: &str, value: Value) -> Arc<dyn Step> {
        Arc::new(MockStep::new(name).with_output(key, value))
    }

    async fn run(pipeline: &Pipeline, trigger: Value) -> Result<ExecutionContext, crate::pipeline::RunFailure> {
        pipeline.execute(&CancellationToken::new(), data(trigger)).await
    }

    #[tokio::test]
    async fn test_last_write_wins_and_ledger() {
        let pipeline = PipelineBuilder::new("merge")
            .step(mock("stepA", "x", json!(1)))
            .step(mock("stepB", "x", json!(2)))
            .build()
            .unwrap();

        let ctx = run(&pipeline, json!({"x": 0})).await.unwrap();

        assert_eq!(ctx.get("x"), Some(&json!(2)));
        assert_step_output(&ctx, "stepA", "x", &json!(1));
        assert_step_output(&ctx, "stepB", "x", &json!(2));
        assert_eq!(ctx.trigger().get("x"), Some(&json!(0)));
        assert_steps_executed(&ctx, &["stepA", "stepB"]);
    }

    #[tokio::test]
    async fn test_gate_skips_structural_next_step() {
        let flags = Arc::new(StaticFlagEvaluator::new().with_flag("new_checkout", true));
        let log = execution_log();
        let pipeline = PipelineBuilder::new("gated")
            .step(Arc::new(FeatureFlagGateStep::new("gate", "new_checkout", "path-a", "path-b", flags.clone())))
            .step(Arc::new(RecordingStep::new("path-b", &log)))
            .step(Arc::new(RecordingStep::new("path-a", &log)))
            .build()
            .unwrap();

        let ctx = run(&pipeline, json!({})).await.unwrap();
        assert_eq!(*log.lock(), vec!["path-a".to_string()]);
        assert!(!ctx.has_step_output("path-b"));
        assert_eq!(ctx.get("enabled"), Some(&json!(true)));

        flags.set("new_checkout", false);
        log.lock().clear();
        run(&pipeline, json!({})).await.unwrap();
        assert_eq!(*log.lock(), vec!["path-b".to_string(), "path-a".to_string()]);
    }

    #[tokio::test]
    async fn test_reference_to_later_step_fails() {
        let values = data(json!({"items": "{{.steps.fetch.items}}"}));
        let pipeline = PipelineBuilder::new("early")
            .step(Arc::new(SetStep::new("use", values)))
            .step(mock("fetch", "items", json!([1, 2])))
            .build()
            .unwrap();

        let failure = run(&pipeline, json!({})).await.unwrap_err();

        match failure.root_error() {
            StepflowError::Template(err) => {
                assert_eq!(err.path(), "steps.fetch.items");
                assert!(matches!(err, TemplateError::Field { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(failure.to_string().contains("steps.fetch.items"));
        assert!(failure.context.step_outputs().is_empty());
    }

    #[tokio::test]
    async fn test_type_preserved_through_step_reference() {
        let values = data(json!({"copied": "{{ .steps.fetch.items }}", "label": "n={{.steps.fetch.count}}"}));
        let pipeline = PipelineBuilder::new("copy")
            .step(Arc::new(MockStep::new("fetch").with_output("items", json!([1, 2])).with_output("count", 2)))
            .step(Arc::new(SetStep::new("use", values)))
            .build()
            .unwrap();

        let ctx = run(&pipeline, json!({})).await.unwrap();
        assert_eq!(ctx.get("copied"), Some(&json!([1, 2])));
        assert_eq!(ctx.get("label"), Some(&json!("n=2")));
    }

    #[tokio::test]
    async fn test_hard_error_returns_partial_context() {
        let after = Arc::new(MockStep::new("after"));
        let pipeline = PipelineBuilder::new("abort")
            .step(mock("before", "done", json!(true)))
            .step(Arc::new(FailingStep::new("explode", "database unavailable")))
            .step(after.clone())
            .build()
            .unwrap();

        let failure = run(&pipeline, json!({})).await.unwrap_err();

        assert!(matches!(failure.error, StepflowError::StepFailed { ref step, .. } if step == "explode"));
        assert_eq!(failure.to_string(), "step 'explode' failed: step 'explode': database unavailable");
        assert_steps_executed(&failure.context, &["before"]);
        assert!(!failure.context.has_step_output("explode"));
        assert_eq!(after.call_count(), 0);
        assert!(failure.context.metadata().get(META_COMPLETED_AT).is_none());
    }

    #[tokio::test]
    async fn test_soft_failure_continues() {
        let validate = FnStep::new("validate", |_: &ExecutionContext| {
            Ok(StepResult::empty().with_value("valid", false).with_value("reason", "missing email"))
        });
        let pipeline = PipelineBuilder::new("soft")
            .step(Arc::new(validate))
            .step(mock("respond", "status", json!(422)))
            .build()
            .unwrap();

        let ctx = run(&pipeline, json!({})).await.unwrap();
        assert_eq!(ctx.get("valid"), Some(&json!(false)));
        assert_eq!(ctx.get("status"), Some(&json!(422)));
    }

    #[tokio::test]
    async fn test_runtime_jump_to_unknown_step() {
        let router = FnStep::new("route", |_: &ExecutionContext| Ok(StepResult::empty().jump_to("nowhere")));
        let pipeline = PipelineBuilder::new("routes")
            .step(Arc::new(router))
            .step(Arc::new(MockStep::new("next")))
            .build()
            .unwrap();

        let failure = run(&pipeline, json!({})).await.unwrap_err();
        assert!(matches!(
            failure.error,
            StepflowError::UnknownNextStep { ref step, ref target } if step == "route" && target == "nowhere"
        ));
        assert_steps_executed(&failure.context, &["route"]);
    }

    #[tokio::test]
    async fn test_jump_back_is_rejected() {
        let looping = FnStep::new("loop", |_: &ExecutionContext| Ok(StepResult::empty().jump_to("first")));
        let pipeline = PipelineBuilder::new("loops")
            .step(Arc::new(MockStep::new("first")))
            .step(Arc::new(looping))
            .build()
            .unwrap();

        let failure = run(&pipeline, json!({})).await.unwrap_err();
        assert!(matches!(failure.error, StepflowError::StepRevisited { ref target, .. } if target == "first"));
    }

    #[tokio::test]
    async fn test_stop_ends_run_successfully() {
        let tail = Arc::new(MockStep::new("tail"));
        let pipeline = PipelineBuilder::new("stops")
            .step(Arc::new(MockStep::new("done").with_output("status", "ok").stopping()))
            .step(tail.clone())
            .build()
            .unwrap();

        let ctx = run(&pipeline, json!({})).await.unwrap();
        assert_eq!(ctx.get("status"), Some(&json!("ok")));
        assert_eq!(tail.call_count(), 0);
        assert!(ctx.metadata().get(META_COMPLETED_AT).is_some());
    }

    #[tokio::test]
    async fn test_skip_strategy() {
        let pipeline = PipelineBuilder::new("lenient")
            .on_error(ErrorStrategy::Skip)
            .step(Arc::new(FailingStep::new("flaky", "timeout")))
            .step(mock("next", "ran", json!(true)))
            .build()
            .unwrap();

        let ctx = run(&pipeline, json!({})).await.unwrap();
        assert_eq!(ctx.skipped_steps(), vec!["flaky".to_string()]);
        assert!(!ctx.has_step_output("flaky"));
        assert_eq!(ctx.get("ran"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_compensation_runs_in_reverse() {
        let log = execution_log();
        let pipeline = PipelineBuilder::new("saga")
            .on_error(ErrorStrategy::Compensate)
            .step(Arc::new(RecordingStep::new("reserve", &log)))
            .step(Arc::new(FailingStep::new("charge", "card declined")))
            .compensation_step(Arc::new(RecordingStep::new("release", &log)))
            .compensation_step(Arc::new(RecordingStep::new("notify", &log)))
            .build()
            .unwrap();

        let failure = run(&pipeline, json!({})).await.unwrap_err();

        assert!(matches!(failure.error, StepflowError::StepFailed { ref step, .. } if step == "charge"));
        assert_eq!(
            *log.lock(),
            vec!["reserve".to_string(), "notify".to_string(), "release".to_string()]
        );
        assert!(failure.context.has_step_output("release"));
    }

    #[tokio::test]
    async fn test_compensation_failure_is_reported() {
        let pipeline = PipelineBuilder::new("saga")
            .on_error(ErrorStrategy::Compensate)
            .step(Arc::new(FailingStep::new("charge", "card declined")))
            .compensation_step(Arc::new(FailingStep::new("refund", "ledger offline")))
            .build()
            .unwrap();

        let failure = run(&pipeline, json!({})).await.unwrap_err();
        match &failure.error {
            StepflowError::CompensationFailed { step, compensation, .. } => {
                assert_eq!(step, "charge");
                assert!(compensation.contains("ledger offline"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(failure.root_error().to_string().contains("card declined"));
    }

    #[tokio::test]
    async fn test_stop_strategy_ignores_compensation() {
        let undo = Arc::new(MockStep::new("undo"));
        let pipeline = PipelineBuilder::new("plain")
            .step(Arc::new(FailingStep::new("charge", "declined")))
            .compensation_step(undo.clone())
            .build()
            .unwrap();

        run(&pipeline, json!({})).await.unwrap_err();
        assert_eq!(undo.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_between_steps() {
        let later = Arc::new(MockStep::new("later"));
        let cancel = Arc::new(CancellationToken::new());
        let canceller = Arc::clone(&cancel);
        let cancelling = FnStep::new("cancel", move |_: &ExecutionContext| {
            canceller.cancel("client disconnected");
            Ok(StepResult::empty().with_value("first", true))
        });
        let pipeline = PipelineBuilder::new("cancelled")
            .step(Arc::new(cancelling))
            .step(later.clone())
            .build()
            .unwrap();

        let failure = pipeline.execute(&cancel, Data::new()).await.unwrap_err();

        assert!(matches!(failure.error, StepflowError::Cancelled(ref r) if r == "client disconnected"));
        assert_eq!(failure.context.get("first"), Some(&json!(true)));
        assert_eq!(later.call_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_step_observes_cancellation() {
        let cancel = Arc::new(CancellationToken::new());
        let pipeline = PipelineBuilder::new("slow")
            .step(Arc::new(SlowStep::with_delay_ms("wait", 5_000)))
            .build()
            .unwrap();
        let canceller = Arc::clone(&cancel);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            canceller.cancel("deadline");
        });

        let failure = pipeline.execute(&cancel, Data::new()).await.unwrap_err();
        assert!(matches!(failure.root_error(), StepflowError::Cancelled(r) if r == "deadline"));
    }

    #[tokio::test]
    async fn test_run_metadata() {
        let pipeline = PipelineBuilder::new("orders")
            .route_pattern("/orders/{id}")
            .metadata("tenant", "acme")
            .step(Arc::new(MockStep::new("a")))
            .build()
            .unwrap();

        let first = run(&pipeline, json!({})).await.unwrap();
        let second = run(&pipeline, json!({})).await.unwrap();

        let meta = first.metadata();
        assert_eq!(meta.get_str(META_PIPELINE), Some("orders"));
        assert_eq!(meta.get_str(META_ROUTE_PATTERN), Some("/orders/{id}"));
        assert_eq!(meta.get_str("tenant"), Some("acme"));
        assert!(meta.get_str(META_STARTED_AT).is_some());
        assert!(meta.get_str(META_COMPLETED_AT).is_some());
        assert_ne!(
            meta.get_str(META_EXECUTION_ID),
            second.metadata().get_str(META_EXECUTION_ID)
        );
    }

    #[tokio::test]
    async fn test_events_emitted_in_order() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = PipelineBuilder::new("evented")
            .on_error(ErrorStrategy::Skip)
            .event_sink(sink.clone())
            .step(Arc::new(MockStep::new("a")))
            .step(Arc::new(FailingStep::new("b", "nope")))
            .build()
            .unwrap();

        let ctx = run(&pipeline, json!({})).await.unwrap();

        assert_eq!(
            sink.event_types(),
            vec![
                event_types::EXECUTION_STARTED,
                event_types::STEP_STARTED,
                event_types::STEP_COMPLETED,
                event_types::STEP_STARTED,
                event_types::STEP_FAILED,
                event_types::STEP_SKIPPED,
                event_types::EXECUTION_COMPLETED,
            ]
        );
        let (_, payload) = &sink.events()[0];
        let payload = payload.as_ref().unwrap();
        assert_eq!(payload["pipeline"], json!("evented"));
        assert_eq!(
            payload["execution_id"].as_str(),
            ctx.metadata().get_str(META_EXECUTION_ID)
        );
    }

    #[tokio::test]
    async fn test_saga_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = PipelineBuilder::new("saga")
            .on_error(ErrorStrategy::Compensate)
            .event_sink(sink.clone())
            .step(Arc::new(FailingStep::new("charge", "declined")))
            .compensation_step(Arc::new(MockStep::new("refund")))
            .build()
            .unwrap();

        run(&pipeline, json!({})).await.unwrap_err();

        let types = sink.event_types();
        assert!(types.contains(&event_types::SAGA_COMPENSATING.to_string()));
        assert!(types.contains(&event_types::SAGA_COMPENSATED.to_string()));
        assert_eq!(types.last().map(String::as_str), Some(event_types::EXECUTION_FAILED));
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let values = data(json!({"echo": "{{.n}}"}));
        let pipeline = Arc::new(
            PipelineBuilder::new("echo")
                .step(Arc::new(SetStep::new("echo", values)))
                .build()
                .unwrap(),
        );

        let handles: Vec<_> = (0..16)
            .map(|n| {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    let out = pipeline
                        .run(&CancellationToken::new(), data(json!({"n": n})))
                        .await
                        .unwrap();
                    (n, out)
                })
            })
            .collect();

        for handle in handles {
            let (n, out) = handle.await.unwrap();
            assert_eq!(out.get("echo"), Some(&json!(n)));
        }
    }
}
