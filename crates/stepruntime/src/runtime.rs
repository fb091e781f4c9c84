use crate::{registry::StepRegistry, RunResult, WorkflowDefinition, WorkflowExecutor};
use serde::{Deserialize, Serialize};
use stepcore::{AuditSink, EngineError, EventBus, Payload, WorkflowError, WorkflowSpec};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Main runtime for executing workflows
pub struct StepRuntime {
    registry: Arc<StepRegistry>,
    executor: WorkflowExecutor,
    event_bus: Arc<EventBus>,
    workflows: Arc<RwLock<HashMap<String, Arc<WorkflowDefinition>>>>,
    config: RuntimeConfig,
}

impl StepRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let registry = Arc::new(StepRegistry::new());
        Self::with_registry(registry, config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<StepRegistry>, config: RuntimeConfig) -> Self {
        if config.event_buffer_size == 0 {
            tracing::warn!("event_buffer_size of 0 is not usable; using 1");
        }
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size.max(1)));
        let executor = WorkflowExecutor::new(event_bus.clone());

        Self {
            registry,
            executor,
            event_bus,
            workflows: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Append transition records to `sink` in addition to the event bus
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.executor.add_audit_sink(sink);
        self
    }

    /// Get access to the step registry
    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Resolve a spec into an executable definition without registering it
    pub fn build(&self, spec: &WorkflowSpec) -> Result<Arc<WorkflowDefinition>, EngineError> {
        let definition = WorkflowDefinition::from_spec(spec, &self.registry)?;
        Ok(Arc::new(definition))
    }

    /// Register a definition under its name, replacing any previous one
    pub async fn register_workflow(&self, definition: Arc<WorkflowDefinition>) {
        let name = definition.name().to_string();
        tracing::info!("Registering workflow: {}", name);
        self.workflows.write().await.insert(name, definition);
    }

    /// Resolve and register a spec
    pub async fn register_spec(
        &self,
        spec: &WorkflowSpec,
    ) -> Result<Arc<WorkflowDefinition>, EngineError> {
        let definition = self.build(spec)?;
        self.register_workflow(definition.clone()).await;
        Ok(definition)
    }

    pub async fn workflow(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.read().await.get(name).cloned()
    }

    /// Execute a registered workflow by name
    pub async fn execute_workflow(
        &self,
        name: &str,
        payload: Payload,
    ) -> Result<RunResult, EngineError> {
        let definition = self
            .workflow(name)
            .await
            .ok_or_else(|| WorkflowError::NotFound(name.to_string()))?;

        self.execute(&definition, payload).await
    }

    /// Execute a workflow directly with its own or the default budget
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        payload: Payload,
    ) -> Result<RunResult, EngineError> {
        let budget = definition
            .timeout()
            .unwrap_or_else(|| self.config.default_time_budget());
        self.start(definition, payload, budget).await
    }

    /// Execute a workflow with an explicit time budget
    pub async fn start(
        &self,
        definition: &WorkflowDefinition,
        payload: Payload,
        budget: Duration,
    ) -> Result<RunResult, EngineError> {
        self.executor.execute(definition, payload, budget).await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<stepcore::ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for StepRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Budget for workflows that do not declare their own
    pub default_time_budget_ms: u64,
    pub event_buffer_size: usize,
}

impl RuntimeConfig {
    pub fn default_time_budget(&self) -> Duration {
        Duration::from_millis(self.default_time_budget_ms)
    }

    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        let config: RuntimeConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.default_time_budget_ms == 0 {
            return Err(EngineError::Configuration(
                "default_time_budget_ms must be positive".to_string(),
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(EngineError::Configuration(
                "event_buffer_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_time_budget_ms: 5 * 60 * 1000,
            event_buffer_size: 1000,
        }
    }
}
