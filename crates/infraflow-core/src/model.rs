//! Deployment model

use infraflow_cloud::{Graph, GraphError, ResourceDescriptor};
use serde::{Deserialize, Serialize};

/// Resources declared by one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,

    /// Descriptors in declaration order
    pub resources: Vec<ResourceDescriptor>,
}

impl Deployment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
        }
    }

    pub fn resource(&self, id: &str) -> Option<&ResourceDescriptor> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Overlay `other` onto this deployment.
    ///
    /// A resource with an id already present replaces it in place; new ids
    /// are appended. The overlay's project name wins when it declares one.
    pub fn merge(&mut self, other: Deployment, rename: bool) {
        if rename {
            self.name = other.name;
        }
        for resource in other.resources {
            match self.resources.iter_mut().find(|r| r.id == resource.id) {
                Some(existing) => {
                    tracing::debug!(resource = %resource.id, "Overriding resource");
                    *existing = resource;
                }
                None => self.resources.push(resource),
            }
        }
    }

    /// Validate and build the dependency graph
    pub fn graph(&self) -> std::result::Result<Graph, GraphError> {
        Graph::build(self.resources.iter().cloned())
    }
}
