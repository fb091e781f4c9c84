use crate::definition::{StepNode, WorkflowDefinition};
use crate::state::ExecutionState;
use chrono::Utc;
use stepcore::{
    evaluate_retry, route_catch, AuditSink, Disposition, EngineError, EventBus, ExecutionEvent,
    ExecutionId, Failure, Payload, RetryDecision, StepContext, Transition, TransitionOutcome,
    TransitionRecord, WorkflowError, ERROR_KEY,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};

/// Drives one workflow run at a time through its steps.
///
/// A run is strictly sequential: one attempt in flight, the only wait being
/// the backoff before a retry. Separate runs share nothing but the
/// definition, so any number may be awaited concurrently.
pub struct WorkflowExecutor {
    event_bus: Arc<EventBus>,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl WorkflowExecutor {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus,
            sinks: Vec::new(),
        }
    }

    /// Also append every transition record to `sink`
    pub fn add_audit_sink(&mut self, sink: Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }

    /// Run `definition` from its entry step with `payload`, within `budget`
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        payload: Payload,
        budget: Duration,
    ) -> Result<RunResult, EngineError> {
        let execution_id = ExecutionId::new_v4();
        let mut node = definition.entry();
        let mut state = ExecutionState::new(execution_id, &node.name, payload, budget);

        self.event_bus.emit(ExecutionEvent::RunStarted {
            execution_id,
            workflow: definition.name().to_string(),
            timestamp: Utc::now(),
        });

        tracing::info!(
            "Starting run {} of '{}' (budget {:?})",
            execution_id,
            definition.name(),
            budget
        );

        let end = loop {
            let attempt = state.begin_attempt();

            if state.is_expired() {
                self.record(&mut state, TransitionOutcome::TimedOut);
                break RunEnd::TimedOut;
            }

            tracing::debug!("Step '{}' attempt {}", node.name, attempt);

            let ctx = StepContext {
                execution_id,
                workflow: definition.name().to_string(),
                step: node.name.clone(),
                attempt,
                payload: state.payload().clone(),
                events: self.event_bus.create_emitter(execution_id, &node.name),
            };

            let result = match timeout(state.remaining(), node.executor.execute(ctx)).await {
                Ok(result) => result,
                Err(_) => {
                    self.record(&mut state, TransitionOutcome::TimedOut);
                    break RunEnd::TimedOut;
                }
            };

            match result {
                Ok(output) => {
                    self.record(&mut state, TransitionOutcome::Succeeded);
                    state.replace_payload(output);

                    match &node.transition {
                        Transition::Next { step } => {
                            node = lookup(definition, step)?;
                            state.enter(&node.name);
                        }
                        Transition::Succeed => break RunEnd::Succeeded,
                        Transition::Fail { error, cause } => {
                            break RunEnd::Failed(fail_state_failure(
                                error,
                                cause.as_deref(),
                                state.payload(),
                            ));
                        }
                    }
                }
                Err(failure) => {
                    if self.schedule_retry(&mut state, node, &failure, attempt).await {
                        continue;
                    }

                    match route_catch(&failure, &node.catch) {
                        Some(rule) => {
                            tracing::warn!(
                                "Step '{}' failed with {}; caught, continuing at '{}'",
                                node.name,
                                failure,
                                rule.next
                            );
                            self.record(
                                &mut state,
                                TransitionOutcome::Caught {
                                    error: failure.kind.clone(),
                                    next: rule.next.clone(),
                                },
                            );
                            state.catch(&failure);
                            node = lookup(definition, &rule.next)?;
                            state.enter(&node.name);
                        }
                        None => {
                            self.record(
                                &mut state,
                                TransitionOutcome::Fatal {
                                    error: failure.kind.clone(),
                                },
                            );
                            break RunEnd::Unhandled(failure);
                        }
                    }
                }
            }
        };

        Ok(self.finish(definition, state, end))
    }

    /// Consult the retry rules; sleeps and returns true when the step should run again
    async fn schedule_retry(
        &self,
        state: &mut ExecutionState,
        node: &StepNode,
        failure: &Failure,
        attempt: u32,
    ) -> bool {
        match evaluate_retry(failure, &node.retry, attempt) {
            RetryDecision::Retry { delay } if state.can_wait(delay) => {
                tracing::warn!(
                    "Step '{}' attempt {} failed with {}; retrying in {:?}",
                    node.name,
                    attempt,
                    failure,
                    delay
                );
                self.record(
                    state,
                    TransitionOutcome::RetryScheduled {
                        error: failure.kind.clone(),
                        delay_ms: delay.as_millis() as u64,
                    },
                );
                sleep(delay).await;
                true
            }
            RetryDecision::Retry { delay } => {
                tracing::warn!(
                    "Step '{}': backoff of {:?} does not fit the remaining {:?}; not retrying",
                    node.name,
                    delay,
                    state.remaining()
                );
                false
            }
            RetryDecision::Exhausted { max_attempts } => {
                tracing::warn!(
                    "Step '{}' exhausted {} attempts on {}",
                    node.name,
                    max_attempts,
                    failure.kind
                );
                false
            }
            RetryDecision::NoRetry => false,
        }
    }

    fn record(&self, state: &mut ExecutionState, outcome: TransitionOutcome) {
        let record = state.record(outcome);
        self.event_bus.append(record);
        for sink in &self.sinks {
            sink.append(record);
        }
    }

    fn finish(
        &self,
        definition: &WorkflowDefinition,
        state: ExecutionState,
        end: RunEnd,
    ) -> RunResult {
        let execution_id = state.execution_id();
        let step = state.current().to_string();
        let budget = state.budget();
        let recovered = state.recovered();
        let elapsed = state.elapsed();

        let (disposition, failure) = match end {
            RunEnd::Succeeded if recovered => (Disposition::HandledFailure, None),
            RunEnd::Succeeded => (Disposition::Success, None),
            RunEnd::Failed(failure) => {
                (Disposition::Failure, Some(RunFailure::Failed { step, failure }))
            }
            RunEnd::Unhandled(failure) => {
                (Disposition::Failure, Some(RunFailure::Unhandled { step, failure }))
            }
            RunEnd::TimedOut => (Disposition::Failure, Some(RunFailure::Timeout { step, budget })),
        };

        match &failure {
            None => tracing::info!(
                "Run {} of '{}' finished as {:?} in {:?}",
                execution_id,
                definition.name(),
                disposition,
                elapsed
            ),
            Some(err) => tracing::error!(
                "Run {} of '{}' failed after {:?}: {}",
                execution_id,
                definition.name(),
                elapsed,
                err
            ),
        }

        self.event_bus.emit(ExecutionEvent::RunCompleted {
            execution_id,
            disposition,
            duration_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
        });

        let (payload, transitions) = state.into_parts();
        RunResult {
            execution_id,
            workflow: definition.name().to_string(),
            disposition,
            payload,
            transitions,
            failure,
            elapsed,
        }
    }
}

fn lookup<'a>(
    definition: &'a WorkflowDefinition,
    step: &str,
) -> Result<&'a StepNode, WorkflowError> {
    definition
        .node(step)
        .ok_or_else(|| WorkflowError::StepNotFound(step.to_string()))
}

/// Failure reported by a `Fail` terminal; detail is the caught error, if any
fn fail_state_failure(error: &str, cause: Option<&str>, payload: &Payload) -> Failure {
    let mut failure = Failure::new(error);
    if let Some(cause) = cause {
        failure = failure.with_message(cause);
    }
    if let Some(caught) = payload.get(ERROR_KEY) {
        failure = failure.with_detail(caught.clone());
    }
    failure
}

enum RunEnd {
    Succeeded,
    Failed(Failure),
    Unhandled(Failure),
    TimedOut,
}

/// Why a run ended in `Disposition::Failure`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunFailure {
    #[error("Step '{step}' failed with unhandled error {failure}")]
    Unhandled { step: String, failure: Failure },

    #[error("Run exceeded its time budget of {budget:?} at step '{step}'")]
    Timeout { step: String, budget: Duration },

    #[error("Step '{step}' ended the run as failed: {failure}")]
    Failed { step: String, failure: Failure },
}

impl RunFailure {
    pub fn step(&self) -> &str {
        match self {
            RunFailure::Unhandled { step, .. }
            | RunFailure::Timeout { step, .. }
            | RunFailure::Failed { step, .. } => step,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RunFailure::Timeout { .. })
    }

    /// The classified failure, with timeouts reported as `TimeoutExceeded`
    pub fn failure(&self) -> Failure {
        match self {
            RunFailure::Unhandled { failure, .. } | RunFailure::Failed { failure, .. } => {
                failure.clone()
            }
            RunFailure::Timeout { step, budget } => {
                Failure::timeout(format!("budget of {:?} exhausted at step '{}'", budget, step))
            }
        }
    }
}

/// Result of one workflow run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub execution_id: ExecutionId,
    pub workflow: String,
    pub disposition: Disposition,
    pub payload: Payload,
    pub transitions: Vec<TransitionRecord>,
    pub failure: Option<RunFailure>,
    pub elapsed: Duration,
}

impl RunResult {
    /// Final payload for Success/HandledFailure, the fatal cause otherwise
    pub fn into_result(self) -> Result<Payload, RunFailure> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self.payload),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.failure.as_ref().is_some_and(RunFailure::is_timeout)
    }

    /// Attempts that ran on `step`, across every entry into it
    pub fn attempts(&self, step: &str) -> usize {
        self.transitions
            .iter()
            .filter(|r| r.step == step && r.outcome != TransitionOutcome::TimedOut)
            .count()
    }

    /// Steps in execution order, consecutive attempts collapsed
    pub fn visited(&self) -> Vec<&str> {
        let mut steps: Vec<&str> = Vec::new();
        for record in &self.transitions {
            if steps.last() != Some(&record.step.as_str()) {
                steps.push(&record.step);
            }
        }
        steps
    }
}
