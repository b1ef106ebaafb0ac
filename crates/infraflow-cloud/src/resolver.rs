//! Future-value resolution
//!
//! Tracks which dependencies each node is still waiting for, holds the
//! published outputs of created nodes, and materializes a node's
//! configuration by substituting every output reference.

use crate::adapter::Outputs;
use crate::descriptor::{Input, OutputRef, ResourceDescriptor};
use crate::error::NodeError;
use crate::graph::Graph;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub struct Resolver {
    /// node -> dependencies not yet created
    outstanding: HashMap<String, BTreeSet<String>>,
    /// producer -> outputs, set once
    published: HashMap<String, Arc<Outputs>>,
}

impl Resolver {
    pub fn new(graph: &Graph) -> Self {
        let outstanding = graph
            .nodes()
            .map(|node| (node.id().to_string(), node.depends_on().clone()))
            .collect();
        Self {
            outstanding,
            published: HashMap::new(),
        }
    }

    /// Whether every dependency of `id` has been published
    pub fn is_ready(&self, id: &str) -> bool {
        self.outstanding
            .get(id)
            .map(|deps| deps.is_empty())
            .unwrap_or(false)
    }

    /// Record the outputs of a created producer.
    ///
    /// Returns the direct dependents whose last outstanding dependency was
    /// `producer`. Outputs are immutable once published; a second publish
    /// for the same producer is ignored.
    pub fn publish(&mut self, graph: &Graph, producer: &str, outputs: Arc<Outputs>) -> Vec<String> {
        if self.published.contains_key(producer) {
            tracing::warn!(node = %producer, "Outputs already published, ignoring");
            return Vec::new();
        }
        self.published.insert(producer.to_string(), outputs);

        let mut ready = Vec::new();
        for consumer in graph.dependents(producer) {
            if let Some(deps) = self.outstanding.get_mut(consumer)
                && deps.remove(producer)
                && deps.is_empty()
            {
                ready.push(consumer.to_string());
            }
        }
        ready
    }

    /// Build the adapter-facing configuration of `descriptor`.
    ///
    /// Values are copied verbatim from the producers' outputs.
    ///
    /// # Errors
    ///
    /// `MissingOutput` when a referenced producer never produced the named
    /// output; `Internal` when a producer has not been published yet, which
    /// means the node was dispatched too early.
    pub fn materialize(&self, descriptor: &ResourceDescriptor) -> Result<Map<String, Value>, NodeError> {
        descriptor
            .config
            .iter()
            .map(|(key, input)| Ok((key.clone(), self.resolve(input)?)))
            .collect()
    }

    fn resolve(&self, input: &Input) -> Result<Value, NodeError> {
        match input {
            Input::Value(value) => Ok(value.clone()),
            Input::Output(reference) => self.lookup(reference),
            Input::List(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Input::Map(entries) => entries
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.resolve(item)?)))
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
        }
    }

    fn lookup(&self, reference: &OutputRef) -> Result<Value, NodeError> {
        let outputs = self
            .published
            .get(&reference.producer)
            .ok_or_else(|| NodeError::Internal {
                message: format!(
                    "'{}' resolved before '{}' was created",
                    reference, reference.producer
                ),
            })?;
        outputs
            .get(&reference.output)
            .cloned()
            .ok_or_else(|| NodeError::MissingOutput {
                producer: reference.producer.clone(),
                output: reference.output.clone(),
            })
    }
}
