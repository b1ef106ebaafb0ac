//! Resource descriptors and output references
//!
//! A [`ResourceDescriptor`] is the caller's declaration of one desired
//! resource. Its configuration is a tree of [`Input`]s, any of which may be an
//! [`OutputRef`] to a value another resource only produces once it exists.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Configuration of a resource, keyed by setting name
pub type Config = BTreeMap<String, Input>;

/// Placeholder for an output of another resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    /// Id of the resource producing the value
    pub producer: String,

    /// Name of the output on the producer
    pub output: String,
}

impl OutputRef {
    pub fn new(producer: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            output: output.into(),
        }
    }

    /// Parse the `producer.output` shorthand.
    ///
    /// The producer id ends at the first dot; the rest names the output.
    pub fn parse(reference: &str) -> Option<Self> {
        let (producer, output) = reference.split_once('.')?;
        if producer.is_empty() || output.is_empty() {
            return None;
        }
        Some(Self::new(producer, output))
    }
}

impl std::fmt::Display for OutputRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.producer, self.output)
    }
}

/// One configuration value, possibly still unresolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Input {
    /// Literal value, passed to the adapter as-is
    Value(Value),
    /// Output of another resource, substituted once that resource is created
    Output(OutputRef),
    List(Vec<Input>),
    Map(BTreeMap<String, Input>),
}

impl Input {
    pub fn value(value: impl Into<Value>) -> Self {
        Input::Value(value.into())
    }

    pub fn output(producer: impl Into<String>, output: impl Into<String>) -> Self {
        Input::Output(OutputRef::new(producer, output))
    }

    /// Every output reference in this value, depth first
    pub fn references(&self) -> Vec<&OutputRef> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a OutputRef>) {
        match self {
            Input::Value(_) => {}
            Input::Output(reference) => refs.push(reference),
            Input::List(items) => {
                for item in items {
                    item.collect_references(refs);
                }
            }
            Input::Map(entries) => {
                for item in entries.values() {
                    item.collect_references(refs);
                }
            }
        }
    }
}

/// Output of a resource published under a deployment-wide name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    /// Name in `DeploymentResult::exports`
    pub name: String,

    /// Output of the declaring resource
    pub output: String,
}

/// Declaration of one desired resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Logical name, unique within a deployment
    pub id: String,

    /// Resource type tag routed to the adapter (e.g. "Microsoft.Network/virtualNetworks")
    pub kind: String,

    /// Desired configuration
    pub config: Config,

    /// Resource this one nests under
    pub parent: Option<String>,

    /// Additional ordering dependencies not expressed through outputs
    pub depends_on: Vec<String>,

    /// Outputs published in the deployment result
    pub exports: Vec<Export>,

    /// Per-resource override of the creation timeout
    pub timeout: Option<Duration>,
}

impl ResourceDescriptor {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            config: Config::new(),
            parent: None,
            depends_on: Vec::new(),
            exports: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, input: Input) -> Self {
        self.config.insert(key.into(), input);
        self
    }

    pub fn with_value(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_input(key, Input::value(value))
    }

    pub fn with_output(
        self,
        key: impl Into<String>,
        producer: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        self.with_input(key, Input::output(producer, output))
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    pub fn with_export(mut self, name: impl Into<String>, output: impl Into<String>) -> Self {
        self.exports.push(Export {
            name: name.into(),
            output: output.into(),
        });
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Every output reference in the configuration
    pub fn references(&self) -> Vec<&OutputRef> {
        self.config
            .values()
            .flat_map(|input| input.references())
            .collect()
    }

    /// Ids this resource must wait for: referenced producers, the parent and
    /// explicit dependencies. Nesting and output threading are the same edge.
    pub fn dependency_ids(&self) -> BTreeSet<String> {
        let mut ids: BTreeSet<String> = self
            .references()
            .into_iter()
            .map(|r| r.producer.clone())
            .collect();
        ids.extend(self.parent.iter().cloned());
        ids.extend(self.depends_on.iter().cloned());
        ids
    }
}
