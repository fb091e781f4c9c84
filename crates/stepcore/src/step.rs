use crate::{events::EventEmitter, ExecutionId, Failure, Payload, Value};
use async_trait::async_trait;

/// Core trait that all executable steps implement.
///
/// The engine retries a step by calling `execute` again with the same
/// payload. It does not deduplicate attempts, so a step whose side effect is
/// not safely repeatable has to guard it itself, e.g. with an idempotency
/// token carried in the payload.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Unique type identifier (e.g., "payment.process", "notify.incident")
    fn step_type(&self) -> &str;

    /// Run one attempt of the step
    async fn execute(&self, ctx: StepContext) -> Result<Payload, Failure>;
}

/// Context passed to each step attempt
#[derive(Clone)]
pub struct StepContext {
    pub execution_id: ExecutionId,

    /// Name of the workflow being run
    pub workflow: String,

    /// Name of the node being executed
    pub step: String,

    /// 1-based attempt number on this node
    pub attempt: u32,

    /// Output of the previous step (or the run's initial payload)
    pub payload: Payload,

    /// Event emitter for real-time updates
    pub events: EventEmitter,
}

impl StepContext {
    /// Get required payload field or fail with `kind`
    pub fn require(&self, field: &str, kind: &str) -> Result<&Value, Failure> {
        self.payload
            .get(field)
            .ok_or_else(|| Failure::new(kind).with_message(format!("Missing field: {}", field)))
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.payload.get(field).and_then(Value::as_f64)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }

    /// True when `field` is present and truthy
    pub fn flag(&self, field: &str) -> bool {
        self.payload.get(field).is_some_and(Value::is_truthy)
    }
}
