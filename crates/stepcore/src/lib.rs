//! Core abstractions for the step engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: payload values, classified failures, the step
//! trait, retry/catch rules with their evaluators, workflow specs and the
//! execution event stream. It holds no engine loop.

mod error;
pub mod events;
mod failure;
pub mod policy;
mod step;
mod value;
mod workflow;

pub use error::{EngineError, WorkflowError};
pub use events::*;
pub use failure::{Failure, ERROR_KEY, TIMEOUT_EXCEEDED};
pub use policy::{
    evaluate_retry, route_catch, CatchRule, ErrorMatcher, RetryDecision, RetryRule,
};
pub use step::{StepContext, StepExecutor};
pub use value::{payload_from_json, payload_to_json, Payload, Value};
pub use workflow::{Disposition, StepSpec, Transition, WorkflowSpec};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
