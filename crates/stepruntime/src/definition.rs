use crate::registry::StepRegistry;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use stepcore::policy::validate_catch_rules;
use stepcore::{CatchRule, RetryRule, StepExecutor, Transition, WorkflowError, WorkflowSpec};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A step bound to its executor, rules and transition
#[derive(Clone)]
pub struct StepNode {
    pub name: String,
    pub executor: Arc<dyn StepExecutor>,
    pub retry: Vec<RetryRule>,
    pub catch: Vec<CatchRule>,
    pub transition: Transition,
}

impl StepNode {
    pub fn new(name: impl Into<String>, executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            name: name.into(),
            executor,
            retry: Vec::new(),
            catch: Vec::new(),
            transition: Transition::Succeed,
        }
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

impl fmt::Debug for StepNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepNode")
            .field("name", &self.name)
            .field("step_type", &self.executor.step_type())
            .field("retry", &self.retry)
            .field("catch", &self.catch)
            .field("transition", &self.transition)
            .finish()
    }
}

/// Validated, immutable workflow ready to run.
///
/// Share it behind an `Arc`; every run borrows it read-only.
#[derive(Debug)]
pub struct WorkflowDefinition {
    name: String,
    entry: usize,
    nodes: Vec<StepNode>,
    index: HashMap<String, usize>,
    timeout: Option<Duration>,
}

impl WorkflowDefinition {
    pub fn builder(name: impl Into<String>, entry: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder {
            name: name.into(),
            entry: entry.into(),
            nodes: Vec::new(),
            timeout: None,
        }
    }

    /// Resolve a declarative spec against the registry
    pub fn from_spec(spec: &WorkflowSpec, registry: &StepRegistry) -> Result<Self, WorkflowError> {
        let mut builder = Self::builder(&spec.name, &spec.start_at);
        if let Some(timeout_ms) = spec.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }

        for step in &spec.steps {
            let executor = registry.create_step(&step.step_type, &step.config)?;
            builder = builder.step(StepNode {
                name: step.name.clone(),
                executor,
                retry: step.retry.clone(),
                catch: step.catch.clone(),
                transition: step.transition.clone(),
            });
        }

        builder.build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &StepNode {
        &self.nodes[self.entry]
    }

    pub fn node(&self, name: &str) -> Option<&StepNode> {
        self.index.get(name).map(|&idx| &self.nodes[idx])
    }

    pub fn nodes(&self) -> &[StepNode] {
        &self.nodes
    }

    /// Budget declared by the workflow itself, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

pub struct WorkflowBuilder {
    name: String,
    entry: String,
    nodes: Vec<StepNode>,
    timeout: Option<Duration>,
}

impl WorkflowBuilder {
    pub fn step(mut self, node: StepNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<WorkflowDefinition, WorkflowError> {
        if self.nodes.is_empty() {
            return Err(WorkflowError::Empty(self.name));
        }

        let mut index = HashMap::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            if index.insert(node.name.clone(), idx).is_some() {
                return Err(WorkflowError::DuplicateStep(node.name.clone()));
            }
        }

        let entry = *index
            .get(&self.entry)
            .ok_or_else(|| WorkflowError::StepNotFound(self.entry.clone()))?;

        for node in &self.nodes {
            for rule in &node.retry {
                rule.validate(&node.name)?;
            }
            validate_catch_rules(&node.name, &node.catch)?;

            let targets = node
                .transition
                .successor()
                .into_iter()
                .chain(node.catch.iter().map(|c| c.next.as_str()));
            for target in targets {
                if !index.contains_key(target) {
                    return Err(WorkflowError::StepNotFound(target.to_string()));
                }
            }
        }

        check_reachability(&self.nodes, &index, entry)?;

        tracing::debug!(
            "Built workflow '{}' with {} steps, entry '{}'",
            self.name,
            self.nodes.len(),
            self.entry
        );

        Ok(WorkflowDefinition {
            name: self.name,
            entry,
            nodes: self.nodes,
            index,
            timeout: self.timeout,
        })
    }
}

/// Every step must be reachable from the entry through successors or catch routes
fn check_reachability(
    nodes: &[StepNode],
    index: &HashMap<String, usize>,
    entry: usize,
) -> Result<(), WorkflowError> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let handles: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();

    for (idx, node) in nodes.iter().enumerate() {
        let targets = node
            .transition
            .successor()
            .into_iter()
            .chain(node.catch.iter().map(|c| c.next.as_str()));
        for target in targets {
            graph.add_edge(handles[idx], handles[index[target]], ());
        }
    }

    let mut visited = vec![false; nodes.len()];
    let mut dfs = Dfs::new(&graph, handles[entry]);
    while let Some(nx) = dfs.next(&graph) {
        visited[graph[nx]] = true;
    }

    match visited.iter().position(|seen| !seen) {
        Some(idx) => Err(WorkflowError::Unreachable(nodes[idx].name.clone())),
        None => Ok(()),
    }
}
