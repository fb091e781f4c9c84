use stepcore::{StepExecutor, Value, WorkflowError};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating step instances
pub trait StepFactory: Send + Sync {
    /// Create a new instance of the step with given configuration
    fn create(
        &self,
        config: &HashMap<String, Value>,
    ) -> Result<Arc<dyn StepExecutor>, WorkflowError>;

    /// Get step type identifier
    fn step_type(&self) -> &str;

    /// Optional: Get step metadata (description, category)
    fn metadata(&self) -> StepMetadata {
        StepMetadata::default()
    }
}

/// Metadata about a step type
#[derive(Debug, Clone)]
pub struct StepMetadata {
    pub description: String,
    pub category: String,
}

impl Default for StepMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Registry of available step types
pub struct StepRegistry {
    factories: HashMap<String, Arc<dyn StepFactory>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a step factory; a later factory for the same type wins
    pub fn register(&mut self, factory: Arc<dyn StepFactory>) {
        let step_type = factory.step_type().to_string();
        if self.contains(&step_type) {
            tracing::warn!("Replacing factory for step type: {}", step_type);
        } else {
            tracing::info!("Registering step type: {}", step_type);
        }
        self.factories.insert(step_type, factory);
    }

    /// Create a step instance from a step type and config
    pub fn create_step(
        &self,
        step_type: &str,
        config: &HashMap<String, Value>,
    ) -> Result<Arc<dyn StepExecutor>, WorkflowError> {
        let factory = self
            .factories
            .get(step_type)
            .ok_or_else(|| WorkflowError::UnknownStepType(step_type.to_string()))?;

        factory.create(config)
    }

    /// Get all registered step types, sorted
    pub fn list_step_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a step type
    pub fn get_metadata(&self, step_type: &str) -> Option<StepMetadata> {
        self.factories.get(step_type).map(|f| f.metadata())
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.factories.contains_key(step_type)
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
