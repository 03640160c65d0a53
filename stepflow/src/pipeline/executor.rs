//! Sequential pipeline execution.

use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::definition::ErrorStrategy;
use crate::cancellation::CancellationToken;
use crate::context::{
    Data, ExecutionContext, META_COMPLETED_AT, META_EXECUTION_ID, META_PIPELINE, META_STARTED_AT,
};
use crate::errors::StepflowError;
use crate::events::{event_types, EventSink};
use crate::steps::{Flow, Step, StepResult};

/// A failed run: the error together with the partial context.
///
/// Steps that completed before the failure keep their outputs, so callers can
/// inspect what happened, including whether a response was already written.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    /// The error that ended the run.
    pub error: StepflowError,
    /// The context as it was when the run ended.
    pub context: Box<ExecutionContext>,
}

impl RunFailure {
    /// Returns the innermost error, unwrapping step failure wrappers.
    #[must_use]
    pub fn root_error(&self) -> &StepflowError {
        self.error.root()
    }

    /// Discards the context and returns the error.
    #[must_use]
    pub fn into_error(self) -> StepflowError {
        self.error
    }
}

/// An executable pipeline.
///
/// Immutable once built and safe to run from many tasks at once; every run
/// gets its own [`ExecutionContext`].
pub struct Pipeline {
    pub(super) name: String,
    pub(super) steps: Vec<Arc<dyn Step>>,
    pub(super) index: HashMap<String, usize>,
    pub(super) compensation: Vec<Arc<dyn Step>>,
    pub(super) on_error: ErrorStrategy,
    pub(super) metadata: Data,
    pub(super) sink: Arc<dyn EventSink>,
}

impl Pipeline {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the step names in declaration order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Returns the error strategy.
    #[must_use]
    pub fn error_strategy(&self) -> ErrorStrategy {
        self.on_error
    }

    /// Runs the pipeline and returns the finished working set.
    pub async fn run(&self, cancel: &CancellationToken, trigger: Data) -> Result<Data, RunFailure> {
        self.execute(cancel, trigger).await.map(ExecutionContext::into_current)
    }

    /// Runs the pipeline against `trigger`.
    ///
    /// Steps run in declaration order unless a step jumps or stops. The
    /// cancellation token is checked before every step.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        trigger: Data,
    ) -> Result<ExecutionContext, RunFailure> {
        let execution_id = Uuid::new_v4().to_string();
        let mut ctx = ExecutionContext::new(trigger).with_metadata(self.metadata.clone());
        let meta = ctx.metadata_mut();
        meta.insert(META_PIPELINE, self.name.clone());
        meta.insert(META_EXECUTION_ID, execution_id.clone());
        meta.insert(META_STARTED_AT, Utc::now().to_rfc3339());

        let start = Instant::now();
        info!(pipeline = %self.name, execution_id = %execution_id, "Pipeline started");
        self.emit(event_types::EXECUTION_STARTED, &execution_id, json!({})).await;

        match self.walk(cancel, &mut ctx, &execution_id).await {
            Ok(()) => {
                ctx.metadata_mut().insert(META_COMPLETED_AT, Utc::now().to_rfc3339());
                let elapsed_ms = elapsed_ms(start);
                info!(
                    pipeline = %self.name,
                    execution_id = %execution_id,
                    steps = ctx.executed_steps().len(),
                    elapsed_ms,
                    "Pipeline completed"
                );
                self.emit(
                    event_types::EXECUTION_COMPLETED,
                    &execution_id,
                    json!({ "duration_ms": elapsed_ms }),
                )
                .await;
                Ok(ctx)
            }
            Err(err) => {
                let err = match err {
                    StepflowError::StepFailed { step, source } if self.on_error == ErrorStrategy::Compensate => {
                        self.compensate(&mut ctx, &execution_id, step, source).await
                    }
                    other => other,
                };
                let elapsed_ms = elapsed_ms(start);
                error!(
                    pipeline = %self.name,
                    execution_id = %execution_id,
                    error = %err,
                    elapsed_ms,
                    "Pipeline failed"
                );
                self.emit(
                    event_types::EXECUTION_FAILED,
                    &execution_id,
                    json!({ "error": err.to_string(), "duration_ms": elapsed_ms }),
                )
                .await;
                Err(RunFailure {
                    error: err,
                    context: Box::new(ctx),
                })
            }
        }
    }

    async fn walk(
        &self,
        cancel: &CancellationToken,
        ctx: &mut ExecutionContext,
        execution_id: &str,
    ) -> Result<(), StepflowError> {
        let mut position = 0;
        let mut visited = HashSet::new();

        while let Some(step) = self.steps.get(position) {
            if cancel.is_cancelled() {
                return Err(StepflowError::Cancelled(cancel.reason().unwrap_or_default()));
            }
            visited.insert(position);
            let name = step.name();

            debug!(pipeline = %self.name, step = %name, "Step started");
            self.emit(event_types::STEP_STARTED, execution_id, json!({ "step": name }))
                .await;
            let step_start = Instant::now();

            let StepResult { output, flow } = match step.execute(cancel, ctx).await {
                Ok(result) => result,
                Err(err) => {
                    let elapsed_ms = elapsed_ms(step_start);
                    warn!(pipeline = %self.name, step = %name, error = %err, elapsed_ms, "Step failed");
                    self.emit(
                        event_types::STEP_FAILED,
                        execution_id,
                        json!({ "step": name, "error": err.to_string(), "duration_ms": elapsed_ms }),
                    )
                    .await;

                    if self.on_error == ErrorStrategy::Skip {
                        ctx.record_skipped(name, &err.to_string());
                        self.emit(event_types::STEP_SKIPPED, execution_id, json!({ "step": name }))
                            .await;
                        position += 1;
                        continue;
                    }
                    return Err(StepflowError::StepFailed {
                        step: name.to_string(),
                        source: Box::new(err),
                    });
                }
            };

            ctx.merge_step_output(name, output)?;
            let elapsed_ms = elapsed_ms(step_start);
            info!(pipeline = %self.name, step = %name, elapsed_ms, "Step completed");
            self.emit(
                event_types::STEP_COMPLETED,
                execution_id,
                json!({ "step": name, "duration_ms": elapsed_ms }),
            )
            .await;

            position = match flow {
                Flow::Continue => position + 1,
                Flow::Stop => {
                    debug!(pipeline = %self.name, step = %name, "Run stopped by step");
                    break;
                }
                Flow::Jump(target) => {
                    let Some(&next) = self.index.get(&target) else {
                        return Err(StepflowError::UnknownNextStep {
                            step: name.to_string(),
                            target,
                        });
                    };
                    if visited.contains(&next) {
                        return Err(StepflowError::StepRevisited {
                            step: name.to_string(),
                            target,
                        });
                    }
                    debug!(pipeline = %self.name, step = %name, target = %target, "Jumping");
                    next
                }
            };
        }

        Ok(())
    }

    /// Runs the compensation steps in reverse order and builds the final error.
    async fn compensate(
        &self,
        ctx: &mut ExecutionContext,
        execution_id: &str,
        step: String,
        source: Box<StepflowError>,
    ) -> StepflowError {
        if self.compensation.is_empty() {
            return StepflowError::StepFailed { step, source };
        }

        info!(pipeline = %self.name, failed_step = %step, "Compensating");
        self.emit(event_types::SAGA_COMPENSATING, execution_id, json!({ "failed_step": step }))
            .await;

        // The run's token may already be cancelled; compensation always runs.
        let token = CancellationToken::new();
        let mut first_error: Option<String> = None;
        for undo in self.compensation.iter().rev() {
            let outcome = match undo.execute(&token, ctx).await {
                Ok(result) => ctx.merge_step_output(undo.name(), result.output),
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                warn!(pipeline = %self.name, step = %undo.name(), error = %err, "Compensation step failed");
                first_error.get_or_insert_with(|| format!("step '{}': {err}", undo.name()));
            }
        }

        self.emit(
            event_types::SAGA_COMPENSATED,
            execution_id,
            json!({ "failed_step": step, "ok": first_error.is_none() }),
        )
        .await;

        match first_error {
            None => StepflowError::StepFailed { step, source },
            Some(compensation) => StepflowError::CompensationFailed {
                step,
                source,
                compensation,
            },
        }
    }

    async fn emit(&self, event_type: &str, execution_id: &str, mut data: Value) {
        if let Value::Object(map) = &mut data {
            map.insert("pipeline".to_string(), Value::String(self.name.clone()));
            map.insert("execution_id".to_string(), Value::String(execution_id.to_string()));
        }
        self.sink.emit(event_type, Some(data)).await;
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .field("compensation", &self.compensation.len())
            .field("on_error", &self.on_error)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
