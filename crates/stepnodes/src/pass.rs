use async_trait::async_trait;
use stepcore::{Failure, Payload, StepContext, StepExecutor, Value, WorkflowError};
use stepruntime::{StepFactory, StepMetadata};
use std::collections::HashMap;
use std::sync::Arc;

/// Passes its input through, optionally merging fixed `result` fields.
///
/// Used where the workflow needs a node but no work, e.g. as the landing
/// node of a `Fail` terminal.
pub struct PassStep {
    result: Payload,
}

impl PassStep {
    pub fn new() -> Self {
        Self {
            result: Payload::new(),
        }
    }

    pub fn with_result(result: Payload) -> Self {
        Self { result }
    }
}

impl Default for PassStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepExecutor for PassStep {
    fn step_type(&self) -> &str {
        "flow.pass"
    }

    async fn execute(&self, ctx: StepContext) -> Result<Payload, Failure> {
        ctx.events.info(format!("Passing {} fields through", ctx.payload.len()));

        let mut output = ctx.payload;
        output.extend(self.result.clone());
        Ok(output)
    }
}

pub struct PassStepFactory;

impl StepFactory for PassStepFactory {
    fn create(
        &self,
        config: &HashMap<String, Value>,
    ) -> Result<Arc<dyn StepExecutor>, WorkflowError> {
        match config.get("result") {
            None => Ok(Arc::new(PassStep::new())),
            Some(Value::Object(result)) => Ok(Arc::new(PassStep::with_result(result.clone()))),
            Some(_) => Err(WorkflowError::StepCreation(
                "flow.pass: 'result' must be an object".to_string(),
            )),
        }
    }

    fn step_type(&self) -> &str {
        "flow.pass"
    }

    fn metadata(&self) -> StepMetadata {
        StepMetadata {
            description: "Pass the payload through unchanged".to_string(),
            category: "flow".to_string(),
        }
    }
}
