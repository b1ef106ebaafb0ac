//! Error types for the provisioning core

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Structural errors raised while building a [`Graph`](crate::Graph).
///
/// All of these abort the run before any resource is created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate resource id: {0}")]
    DuplicateId(String),

    #[error("Resource '{node}' depends on unknown resource '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("Export '{name}' is declared by both '{first}' and '{second}'")]
    DuplicateExport {
        name: String,
        first: String,
        second: String,
    },

    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },
}

/// Whether a provider failure is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Permanent,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
        }
    }
}

/// Failure reported by a [`ProvisioningAdapter`](crate::ProvisioningAdapter)
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{class} provider error: {message}")]
pub struct ProviderError {
    pub class: ErrorClass,
    pub message: String,
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class == ErrorClass::Transient
    }
}

/// Why a single node ended `Failed` or `Skipped`
///
/// These never abort the run; they terminate the node and its dependents only.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NodeError {
    #[error("Output '{output}' was never produced by '{producer}'")]
    MissingOutput { producer: String, output: String },

    #[error(transparent)]
    Provider(ProviderError),

    #[error("Timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Cancelled before creation")]
    Cancelled,

    #[error("Dependency '{dependency}' failed")]
    DependencyFailed { dependency: String },

    #[error("Scheduler invariant violated: {message}")]
    Internal { message: String },
}

impl From<ProviderError> for NodeError {
    fn from(err: ProviderError) -> Self {
        NodeError::Provider(err)
    }
}

/// Errors of the crate's fallible, non-scheduling operations
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("State file error: {0}")]
    State(String),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
