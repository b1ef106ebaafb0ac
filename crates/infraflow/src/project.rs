//! Deployment resolution shared by the commands

use anyhow::Context;
use infraflow_config::ConfigError;
use infraflow_core::{Deployment, DeploymentFiles};
use std::path::Path;

/// Load the deployment named by `--file`, `INFRAFLOW_FILE`, the current
/// directory, or the nearest ancestor holding `infra.kdl`, in that order.
pub fn load(file: Option<&Path>) -> anyhow::Result<(DeploymentFiles, Deployment)> {
    if let Some(file) = file {
        return infraflow_core::load_file(file)
            .with_context(|| format!("failed to load {}", file.display()));
    }

    match infraflow_config::find_deployment_file() {
        Ok(path) => infraflow_core::load_file(&path)
            .with_context(|| format!("failed to load {}", path.display())),
        Err(ConfigError::DeploymentFileNotFound) => Ok(infraflow_core::load_project()?),
        Err(e) => Err(e.into()),
    }
}
