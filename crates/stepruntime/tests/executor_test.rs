// crates/stepruntime/tests/executor_test.rs

use async_trait::async_trait;
use stepcore::{
    CatchRule, Disposition, ExecutionEvent, Failure, MemoryAuditLog, Payload, RetryRule,
    StepContext, StepExecutor, TransitionOutcome, Value, ERROR_KEY,
};
use stepruntime::{RunFailure, RuntimeConfig, StepNode, StepRuntime, WorkflowDefinition};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Step that follows a script of outcomes, one per call; the last entry repeats.
/// `None` means success.
struct ScriptedStep {
    script: Vec<Option<&'static str>>,
    work: Duration,
    calls: AtomicUsize,
    seen: Mutex<Vec<(u32, Instant)>>,
}

impl ScriptedStep {
    fn new(script: Vec<Option<&'static str>>) -> Arc<Self> {
        Self::slow(script, Duration::ZERO)
    }

    fn ok() -> Arc<Self> {
        Self::new(vec![None])
    }

    fn slow(script: Vec<Option<&'static str>>, work: Duration) -> Arc<Self> {
        Arc::new(Self {
            script,
            work,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn attempts_seen(&self) -> Vec<u32> {
        self.seen.lock().unwrap().iter().map(|(a, _)| *a).collect()
    }

    fn started_at(&self) -> Vec<Instant> {
        self.seen.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl StepExecutor for ScriptedStep {
    fn step_type(&self) -> &str {
        "test.scripted"
    }

    async fn execute(&self, ctx: StepContext) -> Result<Payload, Failure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((ctx.attempt, Instant::now()));

        if !self.work.is_zero() {
            tokio::time::sleep(self.work).await;
        }

        let outcome = self.script.get(call).or(self.script.last()).copied().flatten();
        match outcome {
            Some(kind) => Err(Failure::new(kind).with_message(format!("call {}", call + 1))),
            None => {
                let mut output = ctx.payload;
                output.insert(ctx.step.clone(), Value::from(true));
                Ok(output)
            }
        }
    }
}

fn node(name: &str, step: &Arc<ScriptedStep>) -> StepNode {
    StepNode::new(name, step.clone())
}

fn order_payload() -> Payload {
    let mut payload = Payload::new();
    payload.insert("productoId".to_string(), Value::from("P1"));
    payload.insert("cantidad".to_string(), Value::from(2.0));
    payload
}

fn runtime() -> StepRuntime {
    StepRuntime::with_config(RuntimeConfig::default())
}

const BUDGET: Duration = Duration::from_secs(300);

#[tokio::test(start_paused = true)]
async fn test_retries_exactly_max_attempts_with_backoff() {
    let flaky = ScriptedStep::new(vec![Some("ErrorA")]);
    let def = WorkflowDefinition::builder("retry", "A")
        .step(
            node("A", &flaky)
                .with_retry(RetryRule::new(["ErrorA"], Duration::from_secs(2), 4, 2.0)),
        )
        .build()
        .unwrap();

    let result = runtime().start(&def, Payload::new(), BUDGET).await.unwrap();

    assert_eq!(flaky.calls(), 4);
    assert_eq!(flaky.attempts_seen(), vec![1, 2, 3, 4]);

    let starts = flaky.started_at();
    let gaps: Vec<Duration> = starts.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps,
        vec![Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)]
    );

    assert_eq!(result.disposition, Disposition::Failure);
    let retries: Vec<u64> = result
        .transitions
        .iter()
        .filter_map(|r| match &r.outcome {
            TransitionOutcome::RetryScheduled { delay_ms, .. } => Some(*delay_ms),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![2000, 4000, 8000]);
}

#[tokio::test(start_paused = true)]
async fn test_retriable_then_success() {
    let flaky = ScriptedStep::new(vec![Some("ErrorA"), Some("ErrorA"), None]);
    let next = ScriptedStep::ok();
    let def = WorkflowDefinition::builder("retry-then-ok", "Validar")
        .step(
            node("Validar", &flaky)
                .with_retry(RetryRule::new(["ErrorA"], Duration::from_secs(2), 3, 2.0))
                .next("Pagar"),
        )
        .step(node("Pagar", &next))
        .build()
        .unwrap();

    let result = runtime().start(&def, order_payload(), BUDGET).await.unwrap();

    assert_eq!(result.disposition, Disposition::Success);
    assert_eq!(result.attempts("Validar"), 3);
    assert_eq!(next.calls(), 1);
    assert!(result.failure.is_none());
    assert_eq!(result.payload["productoId"], Value::from("P1"));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_without_catch_is_fatal() {
    let flaky = ScriptedStep::new(vec![Some("ErrorA")]);
    let next = ScriptedStep::ok();
    let def = WorkflowDefinition::builder("exhausted", "Validar")
        .step(
            node("Validar", &flaky)
                .with_retry(RetryRule::new(["ErrorA"], Duration::from_secs(2), 3, 2.0))
                .with_catch(CatchRule::new(["ErrorZ"], "Pagar"))
                .next("Pagar"),
        )
        .step(node("Pagar", &next))
        .build()
        .unwrap();

    let result = runtime().start(&def, order_payload(), BUDGET).await.unwrap();

    assert_eq!(result.disposition, Disposition::Failure);
    assert_eq!(flaky.calls(), 3);
    assert_eq!(next.calls(), 0);
    assert_eq!(result.visited(), vec!["Validar"]);

    let last = result.transitions.last().unwrap();
    assert_eq!(
        last.outcome,
        TransitionOutcome::Fatal {
            error: "ErrorA".to_string()
        }
    );

    let err = result.into_result().unwrap_err();
    assert!(!err.is_timeout());
    assert_eq!(err.step(), "Validar");
    assert_eq!(err.failure().kind, "ErrorA");
    assert_eq!(err.failure().message.as_deref(), Some("call 3"));
}

#[tokio::test]
async fn test_non_retriable_caught_to_notification() {
    let payment = ScriptedStep::new(vec![Some("ErrorB")]);
    let confirm = ScriptedStep::ok();
    let notify = ScriptedStep::ok();
    let def = WorkflowDefinition::builder("caught", "Pagar")
        .step(
            node("Pagar", &payment)
                .with_retry(RetryRule::new(["ErrorA"], Duration::from_secs(2), 3, 2.0))
                .with_catch(CatchRule::any("Notificar"))
                .next("Confirmar"),
        )
        .step(node("Confirmar", &confirm))
        .step(node("Notificar", &notify).succeed())
        .build()
        .unwrap();

    let result = runtime().start(&def, order_payload(), BUDGET).await.unwrap();

    assert_eq!(result.disposition, Disposition::HandledFailure);
    assert_eq!(payment.calls(), 1);
    assert_eq!(notify.calls(), 1);
    assert_eq!(confirm.calls(), 0);

    assert_eq!(result.transitions.iter().filter(|r| r.is_retry()).count(), 0);
    assert_eq!(result.transitions.iter().filter(|r| r.is_catch()).count(), 1);

    let error = result.payload[ERROR_KEY].as_object().unwrap();
    assert_eq!(error["kind"], Value::from("ErrorB"));
    assert_eq!(result.payload["productoId"], Value::from("P1"));
    assert!(result.into_result().is_ok());
}

#[tokio::test]
async fn test_specific_catch_wins_over_wildcard() {
    let failing = ScriptedStep::new(vec![Some("PaymentRejected")]);
    let generic = ScriptedStep::ok();
    let specific = ScriptedStep::ok();
    let def = WorkflowDefinition::builder("routes", "A")
        .step(
            node("A", &failing)
                .with_catch(CatchRule::new(["PaymentRejected"], "Specific"))
                .with_catch(CatchRule::any("Generic")),
        )
        .step(node("Generic", &generic))
        .step(node("Specific", &specific))
        .build()
        .unwrap();

    let result = runtime().start(&def, Payload::new(), BUDGET).await.unwrap();

    assert_eq!(specific.calls(), 1);
    assert_eq!(generic.calls(), 0);
    assert_eq!(result.visited(), vec!["A", "Specific"]);
}

#[tokio::test(start_paused = true)]
async fn test_retry_applies_before_catch() {
    let flaky = ScriptedStep::new(vec![Some("ErrorA"), None]);
    let fallback = ScriptedStep::ok();
    let def = WorkflowDefinition::builder("retry-first", "A")
        .step(
            node("A", &flaky)
                .with_retry(RetryRule::new(["ErrorA"], Duration::from_secs(1), 2, 1.0))
                .with_catch(CatchRule::new(["ErrorA"], "Fallback")),
        )
        .step(node("Fallback", &fallback))
        .build()
        .unwrap();

    let result = runtime().start(&def, Payload::new(), BUDGET).await.unwrap();

    assert_eq!(result.disposition, Disposition::Success);
    assert_eq!(flaky.calls(), 2);
    assert_eq!(fallback.calls(), 0);
}

#[tokio::test]
async fn test_kind_matching_is_case_sensitive() {
    let failing = ScriptedStep::new(vec![Some("errora")]);
    let fallback = ScriptedStep::ok();
    let def = WorkflowDefinition::builder("case", "A")
        .step(
            node("A", &failing)
                .with_retry(RetryRule::new(["ErrorA"], Duration::from_secs(1), 3, 2.0))
                .with_catch(CatchRule::new(["ErrorA"], "Fallback")),
        )
        .step(node("Fallback", &fallback))
        .build()
        .unwrap();

    let result = runtime().start(&def, Payload::new(), BUDGET).await.unwrap();

    assert_eq!(failing.calls(), 1);
    assert_eq!(fallback.calls(), 0);
    assert!(matches!(result.failure, Some(RunFailure::Unhandled { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_reentry_resets_attempts() {
    // A fails twice (exhausting its retry), gets caught to B, B loops back to A
    let a = ScriptedStep::new(vec![Some("ErrorA"), Some("ErrorA"), None]);
    let b = ScriptedStep::ok();
    let done = ScriptedStep::ok();
    let def = WorkflowDefinition::builder("loop", "A")
        .step(
            node("A", &a)
                .with_retry(RetryRule::new(["ErrorA"], Duration::from_millis(10), 2, 1.0))
                .with_catch(CatchRule::new(["ErrorA"], "B"))
                .next("Done"),
        )
        .step(node("B", &b).next("A"))
        .step(node("Done", &done))
        .build()
        .unwrap();

    let result = runtime().start(&def, Payload::new(), BUDGET).await.unwrap();

    assert_eq!(a.attempts_seen(), vec![1, 2, 1]);
    assert_eq!(result.visited(), vec!["A", "B", "A", "Done"]);
    assert_eq!(result.disposition, Disposition::HandledFailure);
}

#[tokio::test]
async fn test_fail_terminal_reports_caught_error() {
    let failing = ScriptedStep::new(vec![Some("ErrorA")]);
    let pass = ScriptedStep::ok();
    let def = WorkflowDefinition::builder("fail-state", "A")
        .step(node("A", &failing).with_catch(CatchRule::new(["ErrorA"], "Failed")))
        .step(node("Failed", &pass).fail("InventarioFallo", Some("sin stock")))
        .build()
        .unwrap();

    let result = runtime().start(&def, Payload::new(), BUDGET).await.unwrap();
    assert_eq!(result.disposition, Disposition::Failure);

    match result.failure {
        Some(RunFailure::Failed { step, failure }) => {
            assert_eq!(step, "Failed");
            assert_eq!(failure.kind, "InventarioFallo");
            assert_eq!(failure.message.as_deref(), Some("sin stock"));
            let detail = failure.detail.unwrap();
            assert_eq!(detail.as_object().unwrap()["kind"], Value::from("ErrorA"));
        }
        other => panic!("unexpected failure: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_steps_time_out() {
    let slow = ScriptedStep::slow(vec![None], Duration::from_secs(3));
    let def = WorkflowDefinition::builder("slow", "A")
        .step(node("A", &slow).next("B"))
        .step(node("B", &slow))
        .build()
        .unwrap();

    let result = runtime()
        .start(&def, Payload::new(), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(result.disposition, Disposition::Failure);
    assert!(result.is_timeout());
    assert_eq!(result.transitions.last().unwrap().outcome, TransitionOutcome::TimedOut);
    assert_eq!(result.transitions.last().unwrap().step, "B");

    let err = result.into_result().unwrap_err();
    assert_eq!(err.failure().kind, stepcore::TIMEOUT_EXCEEDED);
}

#[tokio::test(start_paused = true)]
async fn test_attempts_plus_backoff_past_budget_time_out() {
    // attempt 1: 0s-2s, backoff 1s, attempt 2 starts at 3s and is cut at 4.5s
    let slow = ScriptedStep::slow(vec![Some("ErrorA"), None], Duration::from_secs(2));
    let def = WorkflowDefinition::builder("slow-retry", "A")
        .step(
            node("A", &slow)
                .with_retry(RetryRule::new(["ErrorA"], Duration::from_secs(1), 5, 1.0))
                .with_catch(CatchRule::any("A")),
        )
        .build()
        .unwrap();

    let result = runtime()
        .start(&def, Payload::new(), Duration::from_millis(4500))
        .await
        .unwrap();

    assert!(result.is_timeout());
    assert_eq!(result.disposition, Disposition::Failure);
    assert_eq!(slow.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_that_overruns_budget_falls_through_to_catch() {
    let flaky = ScriptedStep::new(vec![Some("ErrorA")]);
    let fallback = ScriptedStep::ok();
    let def = WorkflowDefinition::builder("early-catch", "A")
        .step(
            node("A", &flaky)
                .with_retry(RetryRule::new(["ErrorA"], Duration::from_secs(10), 3, 2.0))
                .with_catch(CatchRule::new(["ErrorA"], "Fallback")),
        )
        .step(node("Fallback", &fallback))
        .build()
        .unwrap();

    let result = runtime()
        .start(&def, Payload::new(), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(flaky.calls(), 1);
    assert_eq!(fallback.calls(), 1);
    assert_eq!(result.disposition, Disposition::HandledFailure);
    assert!(result.elapsed < Duration::from_secs(5));
}

#[tokio::test]
async fn test_expired_budget_runs_nothing() {
    let step = ScriptedStep::ok();
    let def = WorkflowDefinition::builder("zero", "A")
        .step(node("A", &step))
        .build()
        .unwrap();

    let result = runtime().start(&def, Payload::new(), Duration::ZERO).await.unwrap();

    assert_eq!(step.calls(), 0);
    assert!(result.is_timeout());
    assert_eq!(result.transitions.len(), 1);
}

#[tokio::test]
async fn test_identical_inputs_give_identical_payloads() {
    let a = ScriptedStep::ok();
    let b = ScriptedStep::ok();
    let def = WorkflowDefinition::builder("pure", "A")
        .step(node("A", &a).next("B"))
        .step(node("B", &b))
        .build()
        .unwrap();

    let rt = runtime();
    let first = rt.start(&def, order_payload(), BUDGET).await.unwrap();
    let second = rt.start(&def, order_payload(), BUDGET).await.unwrap();

    assert_eq!(first.payload, second.payload);
    assert_ne!(first.execution_id, second.execution_id);
}

#[tokio::test]
async fn test_concurrent_runs_do_not_interfere() {
    let a = ScriptedStep::ok();
    let b = ScriptedStep::ok();
    let def = Arc::new(
        WorkflowDefinition::builder("shared", "A")
            .step(node("A", &a).next("B"))
            .step(node("B", &b))
            .build()
            .unwrap(),
    );
    let rt = Arc::new(runtime());

    let runs = (0..16).map(|i| {
        let def = def.clone();
        let rt = rt.clone();
        tokio::spawn(async move {
            let mut payload = Payload::new();
            payload.insert("orden".to_string(), Value::from(i as f64));
            rt.start(&def, payload, BUDGET).await.unwrap()
        })
    });

    let results = futures::future::join_all(runs).await;
    for (i, result) in results.into_iter().enumerate() {
        let result = result.unwrap();
        assert_eq!(result.payload["orden"], Value::from(i as f64));
        assert_eq!(result.transitions.len(), 2);
        assert!(result
            .transitions
            .iter()
            .all(|r| r.execution_id == result.execution_id));
    }
    assert_eq!(a.calls(), 16);
}

#[tokio::test]
async fn test_transitions_reach_audit_sink_and_event_bus() {
    let audit = Arc::new(MemoryAuditLog::new());
    let rt = runtime().with_audit_sink(audit.clone());
    let mut events = rt.subscribe_events();

    let payment = ScriptedStep::new(vec![Some("ErrorB")]);
    let notify = ScriptedStep::ok();
    let def = WorkflowDefinition::builder("audited", "Pagar")
        .step(node("Pagar", &payment).with_catch(CatchRule::any("Notificar")))
        .step(node("Notificar", &notify))
        .build()
        .unwrap();

    let result = rt.start(&def, Payload::new(), BUDGET).await.unwrap();

    assert_eq!(audit.for_execution(result.execution_id), result.transitions);

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(match event {
            ExecutionEvent::RunStarted { .. } => "started",
            ExecutionEvent::Transition(_) => "transition",
            ExecutionEvent::RunCompleted { disposition, .. } => {
                assert_eq!(disposition, Disposition::HandledFailure);
                "completed"
            }
            ExecutionEvent::StepEvent { .. } => continue,
        });
    }
    assert_eq!(kinds, vec!["started", "transition", "transition", "completed"]);
}

#[tokio::test]
async fn test_registered_workflow_uses_its_own_budget() {
    let step = ScriptedStep::ok();
    let def = WorkflowDefinition::builder("named", "A")
        .step(node("A", &step))
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap();

    let rt = runtime();
    rt.register_workflow(Arc::new(def)).await;

    let result = rt.execute_workflow("named", order_payload()).await.unwrap();
    assert_eq!(result.disposition, Disposition::Success);
    assert_eq!(result.workflow, "named");
}

#[test]
fn test_init_tracing_is_idempotent() {
    stepruntime::init_tracing("warn");
    assert!(!stepruntime::init_tracing("warn"));
}
