use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error: {path}\nreason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource '{resource}' references environment variable '{name}', which is not set")]
    MissingEnv { resource: String, name: String },

    #[error(
        "Project root not found\nsearched from: {0}\nhint: run inside a directory containing infra.kdl"
    )]
    ProjectRootNotFound(PathBuf),

    #[error("Invalid deployment graph: {0}")]
    Graph(#[from] infraflow_cloud::GraphError),
}

pub type Result<T> = std::result::Result<T, FlowError>;
