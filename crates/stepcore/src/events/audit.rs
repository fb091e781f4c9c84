use super::{EventBus, ExecutionEvent, ExecutionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// What happened to one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Succeeded,
    RetryScheduled { error: String, delay_ms: u64 },
    Caught { error: String, next: String },
    Fatal { error: String },
    TimedOut,
}

/// One audit record per attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub execution_id: ExecutionId,
    pub step: String,
    pub attempt: u32,
    pub outcome: TransitionOutcome,
    pub timestamp: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl TransitionRecord {
    pub fn is_catch(&self) -> bool {
        matches!(self.outcome, TransitionOutcome::Caught { .. })
    }

    pub fn is_retry(&self) -> bool {
        matches!(self.outcome, TransitionOutcome::RetryScheduled { .. })
    }
}

/// Append-only destination for transition records.
///
/// Appends are fire-and-forget: the engine never waits for an
/// acknowledgement and a sink must not fail the run.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &TransitionRecord);
}

impl AuditSink for EventBus {
    fn append(&self, record: &TransitionRecord) {
        self.emit(ExecutionEvent::Transition(record.clone()));
    }
}

/// In-memory sink, mostly for tests and local tooling
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<TransitionRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TransitionRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn for_execution(&self, execution_id: ExecutionId) -> Vec<TransitionRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.execution_id == execution_id)
            .collect()
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, record: &TransitionRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}
