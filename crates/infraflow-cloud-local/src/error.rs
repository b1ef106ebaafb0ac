//! Local provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalError {
    #[error("State error: {0}")]
    State(#[from] infraflow_cloud::Error),

    #[error("Resource kind '{0}' is configured to fail")]
    FailingKind(String),
}

pub type Result<T> = std::result::Result<T, LocalError>;
