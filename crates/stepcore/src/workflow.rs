use crate::{CatchRule, RetryRule, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declarative workflow, as loaded from JSON or built in code.
///
/// A spec names step types; the runtime resolves them against its registry
/// to produce an executable definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_at: String,
    pub steps: Vec<StepSpec>,
    /// Run budget; the runtime default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl WorkflowSpec {
    pub fn new(name: impl Into<String>, start_at: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            start_at: start_at.into(),
            steps: Vec::new(),
            timeout_ms: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn step(mut self, step: StepSpec) -> Self {
        self.steps.push(step);
        self
    }

    pub fn find_step(&self, name: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Step specification in a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    pub step_type: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default)]
    pub retry: Vec<RetryRule>,
    #[serde(default)]
    pub catch: Vec<CatchRule>,
    pub transition: Transition,
}

impl StepSpec {
    /// New step that ends the run successfully unless told otherwise
    pub fn new(name: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            step_type: step_type.into(),
            config: HashMap::new(),
            retry: Vec::new(),
            catch: Vec::new(),
            transition: Transition::Succeed,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_retry(mut self, rule: RetryRule) -> Self {
        self.retry.push(rule);
        self
    }

    pub fn with_catch(mut self, rule: CatchRule) -> Self {
        self.catch.push(rule);
        self
    }

    pub fn next(mut self, step: impl Into<String>) -> Self {
        self.transition = Transition::Next { step: step.into() };
        self
    }

    pub fn succeed(mut self) -> Self {
        self.transition = Transition::Succeed;
        self
    }

    pub fn fail(mut self, error: impl Into<String>, cause: Option<&str>) -> Self {
        self.transition = Transition::Fail {
            error: error.into(),
            cause: cause.map(str::to_string),
        };
        self
    }
}

/// Where a step goes after a successful attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transition {
    Next {
        step: String,
    },
    /// Terminal: the run succeeds (or counts as a handled failure)
    Succeed,
    /// Terminal: the run fails with the given classification
    Fail {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
}

impl Transition {
    pub fn successor(&self) -> Option<&str> {
        match self {
            Transition::Next { step } => Some(step),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Transition::Next { .. })
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Success,
    /// Reached a success terminal after at least one catch fired
    HandledFailure,
    Failure,
}
