//! Deployment results
//!
//! The scheduler returns one [`DeploymentResult`] per run: the terminal state
//! of every node and the values of every declared export.

use crate::adapter::Outputs;
use crate::error::NodeError;
use crate::graph::{Graph, NodeState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every node was created
    Succeeded,
    /// At least one node failed or was skipped
    PartialFailure,
    /// Cancellation was requested before the run finished
    Cancelled,
}

/// Terminal record of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub id: String,
    pub kind: String,
    pub state: NodeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    #[serde(default, skip_serializing_if = "Outputs::is_empty")]
    pub outputs: Outputs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Value of a named export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportValue {
    Available { node: String, value: Value },
    Unavailable { node: String, reason: String },
}

impl ExportValue {
    pub fn value(&self) -> Option<&Value> {
        match self {
            ExportValue::Available { value, .. } => Some(value),
            ExportValue::Unavailable { .. } => None,
        }
    }

    pub fn node(&self) -> &str {
        match self {
            ExportValue::Available { node, .. } | ExportValue::Unavailable { node, .. } => node,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub outcome: RunOutcome,
    pub nodes: BTreeMap<String, NodeReport>,
    pub exports: BTreeMap<String, ExportValue>,
    pub duration_ms: u64,
}

impl DeploymentResult {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    pub fn node(&self, id: &str) -> Option<&NodeReport> {
        self.nodes.get(id)
    }

    pub fn state_of(&self, id: &str) -> Option<NodeState> {
        self.nodes.get(id).map(|n| n.state)
    }

    pub fn export(&self, name: &str) -> Option<&Value> {
        self.exports.get(name).and_then(ExportValue::value)
    }

    /// Nodes that ended in `state`, in id order
    pub fn in_state(&self, state: NodeState) -> impl Iterator<Item = &NodeReport> {
        self.nodes.values().filter(move |n| n.state == state)
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for node in self.nodes.values() {
            match node.state {
                NodeState::Created => summary.created += 1,
                NodeState::Failed => summary.failed += 1,
                NodeState::Skipped => summary.skipped += 1,
                _ => {}
            }
        }
        summary
    }
}

/// Per-state node counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub created: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} failed, {} skipped",
            self.created, self.failed, self.skipped
        )
    }
}

/// Collapse a drained graph into its result
pub(crate) fn aggregate(graph: Graph, cancelled: bool, elapsed: Duration) -> DeploymentResult {
    let mut exports = BTreeMap::new();
    let mut nodes = BTreeMap::new();
    let mut all_created = true;

    for (id, node) in graph.into_nodes() {
        let state = node.state();
        all_created &= state == NodeState::Created;
        let outputs: Outputs = node.outputs().map(|o| (**o).clone()).unwrap_or_default();

        for export in &node.descriptor().exports {
            let value = match (state, outputs.get(&export.output)) {
                (NodeState::Created, Some(value)) => ExportValue::Available {
                    node: id.clone(),
                    value: value.clone(),
                },
                (NodeState::Created, None) => ExportValue::Unavailable {
                    node: id.clone(),
                    reason: format!("output '{}' was not produced", export.output),
                },
                (state, _) => ExportValue::Unavailable {
                    node: id.clone(),
                    reason: format!("resource {state}"),
                },
            };
            exports.insert(export.name.clone(), value);
        }

        let report = NodeReport {
            id: id.clone(),
            kind: node.kind().to_string(),
            state,
            error: node.error().cloned(),
            outputs,
            duration_ms: node.duration().map(|d| d.as_millis() as u64),
        };
        nodes.insert(id, report);
    }

    let outcome = if cancelled {
        RunOutcome::Cancelled
    } else if all_created {
        RunOutcome::Succeeded
    } else {
        RunOutcome::PartialFailure
    };

    DeploymentResult {
        outcome,
        nodes,
        exports,
        duration_ms: elapsed.as_millis() as u64,
    }
}
