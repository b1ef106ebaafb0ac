//! Deployment loader
//!
//! Ties discovery and parsing together and applies the local override.

use crate::discovery::{DeploymentFiles, discover_files, files_for_file, find_project_root};
use crate::error::{FlowError, Result};
use crate::model::Deployment;
use crate::parser::parse_document;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Find the project from the current directory and load it
#[instrument]
pub fn load_project() -> Result<(DeploymentFiles, Deployment)> {
    let project_root = find_project_root()?;
    load_project_from_root(&project_root)
}

/// Load the project rooted at `project_root`
#[instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn load_project_from_root(project_root: &Path) -> Result<(DeploymentFiles, Deployment)> {
    let files = discover_files(project_root)?;
    let deployment = load_deployment(&files)?;
    Ok((files, deployment))
}

/// Load an explicitly named deployment file, plus its local override
#[instrument(skip(file), fields(file = %file.display()))]
pub fn load_file(file: &Path) -> Result<(DeploymentFiles, Deployment)> {
    let files = files_for_file(file);
    let deployment = load_deployment(&files)?;
    Ok((files, deployment))
}

/// Parse the root file and merge `infra.local.kdl` over it.
///
/// Resources declared in the override replace those with the same id.
pub fn load_deployment(files: &DeploymentFiles) -> Result<Deployment> {
    let default_name = files
        .project_root
        .canonicalize()
        .unwrap_or_else(|_| files.project_root.clone())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();

    debug!(file = %files.root.display(), "Loading root file");
    let (mut deployment, _) = parse_document(&read(&files.root)?, default_name.clone())?;

    if let Some(local) = &files.local_override {
        debug!(file = %local.display(), "Applying local override");
        let (overlay, named) = parse_document(&read(local)?, default_name)?;
        deployment.merge(overlay, named);
    }

    info!(
        project = %deployment.name,
        resources = deployment.resources.len(),
        "Deployment loaded"
    );
    Ok(deployment)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| FlowError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
