use chrono::Utc;
use stepcore::{ExecutionId, Failure, Payload, TransitionOutcome, TransitionRecord};
use std::time::Duration;
use tokio::time::Instant;

/// Mutable record threaded through a single run.
///
/// Owned by exactly one run; never shared.
#[derive(Debug)]
pub struct ExecutionState {
    execution_id: ExecutionId,
    current: String,
    payload: Payload,
    /// Attempts made on `current` since it was last entered
    attempt: u32,
    started_at: Instant,
    budget: Duration,
    /// Set once any catch rule has fired
    recovered: bool,
    transitions: Vec<TransitionRecord>,
}

impl ExecutionState {
    pub fn new(
        execution_id: ExecutionId,
        entry: impl Into<String>,
        payload: Payload,
        budget: Duration,
    ) -> Self {
        Self {
            execution_id,
            current: entry.into(),
            payload,
            attempt: 0,
            started_at: Instant::now(),
            budget,
            recovered: false,
            transitions: Vec::new(),
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn recovered(&self) -> bool {
        self.recovered
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Move to `step`; its attempt counter starts over even on re-entry
    pub fn enter(&mut self, step: &str) {
        self.current = step.to_string();
        self.attempt = 0;
    }

    /// Count a new attempt on the current step and return its number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Whether a backoff of `delay` still leaves budget for the retry
    pub fn can_wait(&self, delay: Duration) -> bool {
        delay < self.remaining()
    }

    pub fn replace_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    /// Merge a caught failure into the payload
    pub fn catch(&mut self, failure: &Failure) {
        failure.merge_into(&mut self.payload);
        self.recovered = true;
    }

    /// Append a transition for the current attempt and return it
    pub fn record(&mut self, outcome: TransitionOutcome) -> &TransitionRecord {
        self.transitions.push(TransitionRecord {
            execution_id: self.execution_id,
            step: self.current.clone(),
            attempt: self.attempt,
            outcome,
            timestamp: Utc::now(),
            elapsed_ms: self.elapsed().as_millis() as u64,
        });
        &self.transitions[self.transitions.len() - 1]
    }

    pub fn into_parts(self) -> (Payload, Vec<TransitionRecord>) {
        (self.payload, self.transitions)
    }
}
