use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Problems found while turning a spec into an executable definition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Workflow '{0}' has no steps")]
    Empty(String),

    #[error("Duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Unknown step type: {0}")]
    UnknownStepType(String),

    #[error("Invalid retry rule on step '{step}': {reason}")]
    InvalidRetryRule { step: String, reason: String },

    #[error("Wildcard catch rule on step '{0}' must be the last catch rule")]
    ShadowingCatch(String),

    #[error("Step '{0}' is unreachable from the entry step")]
    Unreachable(String),

    #[error("Step creation failed: {0}")]
    StepCreation(String),
}
