//! Retry and catch rules, and the pure functions that evaluate them.
//!
//! Both rule kinds share the same selection order: the first rule that names
//! the failure kind explicitly wins; only when no rule names it does the
//! first wildcard rule apply.

use crate::{Failure, WorkflowError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Spellings accepted for "match every error kind"
pub const WILDCARD: &str = "*";
pub const STATES_ALL: &str = "States.ALL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorMatcher {
    Kind(String),
    Any,
}

impl ErrorMatcher {
    pub fn kind(kind: impl Into<String>) -> Self {
        ErrorMatcher::Kind(kind.into())
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, ErrorMatcher::Any)
    }
}

impl From<String> for ErrorMatcher {
    fn from(s: String) -> Self {
        if s == WILDCARD || s == STATES_ALL {
            ErrorMatcher::Any
        } else {
            ErrorMatcher::Kind(s)
        }
    }
}

impl From<&str> for ErrorMatcher {
    fn from(s: &str) -> Self {
        ErrorMatcher::from(s.to_string())
    }
}

impl From<ErrorMatcher> for String {
    fn from(m: ErrorMatcher) -> Self {
        match m {
            ErrorMatcher::Kind(kind) => kind,
            ErrorMatcher::Any => WILDCARD.to_string(),
        }
    }
}

/// Common view over the matcher list of retry and catch rules
pub trait MatchesErrors {
    fn matchers(&self) -> &[ErrorMatcher];

    fn names_kind(&self, kind: &str) -> bool {
        self.matchers()
            .iter()
            .any(|m| matches!(m, ErrorMatcher::Kind(k) if k == kind))
    }

    fn has_wildcard(&self) -> bool {
        self.matchers().iter().any(ErrorMatcher::is_wildcard)
    }
}

/// Pick the rule for `kind`: explicit names first, then wildcards
pub fn select_rule<'a, R: MatchesErrors>(rules: &'a [R], kind: &str) -> Option<&'a R> {
    rules
        .iter()
        .find(|r| r.names_kind(kind))
        .or_else(|| rules.iter().find(|r| r.has_wildcard()))
}

/// Retry rule for a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryRule {
    pub errors: Vec<ErrorMatcher>,
    pub interval_ms: u64,
    /// Total attempts, the first one included
    pub max_attempts: u32,
    #[serde(default = "default_backoff_rate")]
    pub backoff_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

fn default_backoff_rate() -> f64 {
    2.0
}

impl RetryRule {
    pub fn new<I, M>(errors: I, interval: Duration, max_attempts: u32, backoff_rate: f64) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<ErrorMatcher>,
    {
        Self {
            errors: errors.into_iter().map(Into::into).collect(),
            interval_ms: interval.as_millis() as u64,
            max_attempts,
            backoff_rate,
            max_delay_ms: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_ms = Some(max_delay.as_millis() as u64);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Wait before the next attempt, given how many attempts already ran
    pub fn delay_after(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1) as i32;
        let millis = self.interval_ms as f64 * self.backoff_rate.powi(exponent);
        let delay = Duration::try_from_secs_f64(millis / 1000.0).unwrap_or(Duration::MAX);

        match self.max_delay_ms {
            Some(cap) => delay.min(Duration::from_millis(cap)),
            None => delay,
        }
    }

    pub fn validate(&self, step: &str) -> Result<(), WorkflowError> {
        let invalid = |reason: &str| WorkflowError::InvalidRetryRule {
            step: step.to_string(),
            reason: reason.to_string(),
        };

        if self.errors.is_empty() {
            return Err(invalid("no error matchers"));
        }
        if self.max_attempts < 1 {
            return Err(invalid("max_attempts must be at least 1"));
        }
        if !self.backoff_rate.is_finite() || self.backoff_rate < 1.0 {
            return Err(invalid("backoff_rate must be a finite number >= 1.0"));
        }
        Ok(())
    }
}

impl MatchesErrors for RetryRule {
    fn matchers(&self) -> &[ErrorMatcher] {
        &self.errors
    }
}

/// Catch rule: where to go when a failure is not (or no longer) retried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchRule {
    pub errors: Vec<ErrorMatcher>,
    pub next: String,
}

impl CatchRule {
    pub fn new<I, M>(errors: I, next: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<ErrorMatcher>,
    {
        Self {
            errors: errors.into_iter().map(Into::into).collect(),
            next: next.into(),
        }
    }

    pub fn any(next: impl Into<String>) -> Self {
        Self {
            errors: vec![ErrorMatcher::Any],
            next: next.into(),
        }
    }
}

impl MatchesErrors for CatchRule {
    fn matchers(&self) -> &[ErrorMatcher] {
        &self.errors
    }
}

/// A wildcard catch anywhere but last would shadow the rules after it
pub fn validate_catch_rules(step: &str, rules: &[CatchRule]) -> Result<(), WorkflowError> {
    let last = rules.len().saturating_sub(1);
    match rules.iter().position(|r| r.has_wildcard()) {
        Some(idx) if idx < last => Err(WorkflowError::ShadowingCatch(step.to_string())),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// No rule covers the failure kind
    NoRetry,
    /// Run the step again after `delay`
    Retry { delay: Duration },
    /// A rule matched but its attempts are used up
    Exhausted { max_attempts: u32 },
}

impl RetryDecision {
    pub fn delay(&self) -> Option<Duration> {
        match self {
            RetryDecision::Retry { delay } => Some(*delay),
            _ => None,
        }
    }
}

/// Decide whether a failed step runs again.
///
/// `attempts` is the number of attempts already made on the current node,
/// including the one that produced `failure`.
pub fn evaluate_retry(failure: &Failure, rules: &[RetryRule], attempts: u32) -> RetryDecision {
    let Some(rule) = select_rule(rules, &failure.kind) else {
        return RetryDecision::NoRetry;
    };

    if attempts < rule.max_attempts {
        RetryDecision::Retry {
            delay: rule.delay_after(attempts),
        }
    } else {
        RetryDecision::Exhausted {
            max_attempts: rule.max_attempts,
        }
    }
}

/// Find the catch rule that handles `failure`, if any
pub fn route_catch<'a>(failure: &Failure, rules: &'a [CatchRule]) -> Option<&'a CatchRule> {
    select_rule(rules, &failure.kind)
}
