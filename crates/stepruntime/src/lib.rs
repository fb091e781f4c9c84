//! Workflow execution runtime
//!
//! This crate provides the engine that runs workflows: the step registry,
//! definition building and validation, the per-run execution state, and the
//! executor that applies retry, catch and time-budget rules step by step.

mod definition;
mod executor;
mod loader;
mod logging;
mod registry;
mod runtime;
mod state;

pub use definition::{StepNode, WorkflowBuilder, WorkflowDefinition};
pub use executor::{RunFailure, RunResult, WorkflowExecutor};
pub use loader::{load_workflow_dir, load_workflow_file};
pub use logging::init_tracing;
pub use registry::{StepFactory, StepMetadata, StepRegistry};
pub use runtime::{RuntimeConfig, StepRuntime};
pub use state::ExecutionState;
