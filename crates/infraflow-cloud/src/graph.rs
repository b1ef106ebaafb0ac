//! Dependency graph of resource descriptors
//!
//! An edge A -> B means B must wait for A: B references an output of A,
//! nests under A, or explicitly depends on A. The graph is validated once
//! at build time; its shape never changes afterwards, only node states do.

use crate::adapter::Outputs;
use crate::descriptor::ResourceDescriptor;
use crate::error::{GraphError, NodeError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle state of a node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Every dependency is created; waiting to be dispatched
    Pending,
    /// Waiting for at least one dependency
    Blocked,
    /// Adapter call in flight
    Creating,
    Created,
    Failed,
    /// Never dispatched because a dependency failed or the run was cancelled
    Skipped,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Created | NodeState::Failed | NodeState::Skipped
        )
    }

    /// Whether moving from `self` to `next` keeps the state machine monotonic
    pub fn can_transition_to(self, next: NodeState) -> bool {
        use NodeState::*;
        matches!(
            (self, next),
            (Blocked, Pending)
                | (Pending, Creating)
                | (Creating, Created)
                | (Creating, Failed)
                | (Pending, Skipped)
                | (Blocked, Skipped)
        )
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Pending => write!(f, "pending"),
            NodeState::Blocked => write!(f, "blocked"),
            NodeState::Creating => write!(f, "creating"),
            NodeState::Created => write!(f, "created"),
            NodeState::Failed => write!(f, "failed"),
            NodeState::Skipped => write!(f, "skipped"),
        }
    }
}

/// A descriptor placed in the graph, plus its run state
#[derive(Debug, Clone)]
pub struct ResourceNode {
    descriptor: ResourceDescriptor,
    depends_on: BTreeSet<String>,
    state: NodeState,
    outputs: Option<Arc<Outputs>>,
    error: Option<NodeError>,
    duration: Option<Duration>,
}

impl ResourceNode {
    fn new(descriptor: ResourceDescriptor, depends_on: BTreeSet<String>) -> Self {
        let state = if depends_on.is_empty() {
            NodeState::Pending
        } else {
            NodeState::Blocked
        };
        Self {
            descriptor,
            depends_on,
            state,
            outputs: None,
            error: None,
            duration: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn kind(&self) -> &str {
        &self.descriptor.kind
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Direct dependencies
    pub fn depends_on(&self) -> &BTreeSet<String> {
        &self.depends_on
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Outputs, present only once the node is `Created`
    pub fn outputs(&self) -> Option<&Arc<Outputs>> {
        self.outputs.as_ref()
    }

    /// Failure or skip reason
    pub fn error(&self) -> Option<&NodeError> {
        self.error.as_ref()
    }

    /// Wall time of the adapter call
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Move to `next`, refusing transitions that would break monotonicity
    pub(crate) fn transition(&mut self, next: NodeState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::error!(
                node = %self.descriptor.id,
                from = %self.state,
                to = %next,
                "Rejected illegal state transition"
            );
            return false;
        }
        self.state = next;
        true
    }

    pub(crate) fn mark_created(&mut self, outputs: Arc<Outputs>, duration: Duration) -> bool {
        if !self.transition(NodeState::Created) {
            return false;
        }
        self.outputs = Some(outputs);
        self.duration = Some(duration);
        true
    }

    pub(crate) fn mark_failed(&mut self, error: NodeError, duration: Option<Duration>) -> bool {
        if !self.transition(NodeState::Failed) {
            return false;
        }
        self.error = Some(error);
        self.duration = duration;
        true
    }

    pub(crate) fn mark_skipped(&mut self, reason: NodeError) -> bool {
        if !self.transition(NodeState::Skipped) {
            return false;
        }
        self.error = Some(reason);
        true
    }
}

/// Validated dependency graph for one provisioning run
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: BTreeMap<String, ResourceNode>,
    /// Forward edges: producer -> consumers
    dependents: BTreeMap<String, BTreeSet<String>>,
    /// Dependencies before dependents
    order: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

impl Graph {
    /// Build a graph from descriptors
    ///
    /// # Errors
    ///
    /// Fails on duplicate ids, references to unknown resources, duplicate
    /// export names and dependency cycles. Nothing is executed.
    pub fn build(
        descriptors: impl IntoIterator<Item = ResourceDescriptor>,
    ) -> Result<Self, GraphError> {
        let mut by_id: BTreeMap<String, ResourceDescriptor> = BTreeMap::new();
        for descriptor in descriptors {
            if by_id.contains_key(&descriptor.id) {
                return Err(GraphError::DuplicateId(descriptor.id));
            }
            by_id.insert(descriptor.id.clone(), descriptor);
        }

        let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut export_owner: HashMap<&str, &str> = HashMap::new();
        for (id, descriptor) in &by_id {
            let deps = descriptor.dependency_ids();
            for dep in &deps {
                if !by_id.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        node: id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            for export in &descriptor.exports {
                if let Some(first) = export_owner.insert(&export.name, id) {
                    return Err(GraphError::DuplicateExport {
                        name: export.name.clone(),
                        first: first.to_string(),
                        second: id.clone(),
                    });
                }
            }
            edges.insert(id.clone(), deps);
        }

        let order = topological_order(&edges)?;

        let mut dependents: BTreeMap<String, BTreeSet<String>> =
            by_id.keys().map(|id| (id.clone(), BTreeSet::new())).collect();
        for (id, deps) in &edges {
            for dep in deps {
                if let Some(consumers) = dependents.get_mut(dep) {
                    consumers.insert(id.clone());
                }
            }
        }

        let nodes = by_id
            .into_iter()
            .map(|(id, descriptor)| {
                let deps = edges.remove(&id).unwrap_or_default();
                (id, ResourceNode::new(descriptor, deps))
            })
            .collect();

        Ok(Self {
            nodes,
            dependents,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut ResourceNode> {
        self.nodes.get_mut(id)
    }

    /// Nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    /// Ids ordered so every dependency precedes its dependents
    pub fn topological_order(&self) -> &[String] {
        &self.order
    }

    /// Direct dependencies of `id`
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        self.nodes
            .get(id)
            .map(|n| n.depends_on.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Direct dependents of `id`
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.dependents
            .get(id)
            .map(|d| d.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Every node with a dependency path from `id`, nearest first
    pub fn transitive_dependents(&self, id: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut found = Vec::new();
        let mut queue: VecDeque<&str> = self.dependents(id).into_iter().collect();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            found.push(current.to_string());
            queue.extend(self.dependents(current));
        }
        found
    }

    /// Waves of nodes that can run in parallel; wave N only depends on
    /// waves before it
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut levels: Vec<Vec<String>> = Vec::new();
        for id in &self.order {
            let level = self.nodes[id]
                .depends_on
                .iter()
                .filter_map(|dep| depth.get(dep.as_str()))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id, level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(id.clone());
        }
        for level in &mut levels {
            level.sort();
        }
        levels
    }

    pub(crate) fn into_nodes(self) -> BTreeMap<String, ResourceNode> {
        self.nodes
    }
}

/// Depth-first topological sort over dependency edges.
///
/// A back edge to a node still on the stack is a cycle; the cycle is reported
/// in traversal order, closed with its first id.
fn topological_order(edges: &BTreeMap<String, BTreeSet<String>>) -> Result<Vec<String>, GraphError> {
    fn visit<'a>(
        id: &'a str,
        edges: &'a BTreeMap<String, BTreeSet<String>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        match marks.get(id) {
            Some(Mark::Visited) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|s| *s == id).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(id.to_string());
                return Err(GraphError::CycleDetected { cycle });
            }
            None => {}
        }

        marks.insert(id, Mark::Visiting);
        stack.push(id);
        if let Some(deps) = edges.get(id) {
            for dep in deps {
                visit(dep, edges, marks, stack, order)?;
            }
        }
        stack.pop();
        marks.insert(id, Mark::Visited);
        order.push(id.to_string());
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut stack = Vec::new();
    let mut order = Vec::with_capacity(edges.len());
    for id in edges.keys() {
        visit(id, edges, &mut marks, &mut stack, &mut order)?;
    }
    Ok(order)
}
