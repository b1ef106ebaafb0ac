use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration directory could not be determined")]
    ConfigDirNotFound,

    #[error(
        "Deployment file not found. Looked for:\n\
        - ./infra.kdl\n\
        - ./.infraflow/infra.kdl\n\
        Set INFRAFLOW_FILE to point at a file directly"
    )]
    DeploymentFileNotFound,

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
