//! Project discovery
//!
//! Locates the project root and the deployment files inside it.

use crate::error::{FlowError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const PROJECT_ROOT_ENV: &str = "INFRAFLOW_PROJECT_ROOT";
pub const ROOT_FILE: &str = "infra.kdl";
pub const LOCAL_FILE: &str = "infra.local.kdl";
pub const PROJECT_DIR: &str = ".infraflow";

/// Deployment files of one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentFiles {
    /// Directory holding project state
    pub project_root: PathBuf,
    /// `infra.kdl` or `.infraflow/infra.kdl`
    pub root: PathBuf,
    /// `infra.local.kdl` next to the root file
    pub local_override: Option<PathBuf>,
}

/// Find the project root.
///
/// Search order:
/// 1. `INFRAFLOW_PROJECT_ROOT`
/// 2. the current directory and its ancestors, looking for `infra.kdl` or
///    `.infraflow/infra.kdl`
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var(PROJECT_ROOT_ENV) {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking {}", PROJECT_ROOT_ENV);
        if has_root_file(&path) {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
        warn!(env_root = %root, "No infra.kdl under {}", PROJECT_ROOT_ENV);
    }

    let start_dir = std::env::current_dir()?;
    let mut current = start_dir.clone();
    debug!(start_dir = %start_dir.display(), "Searching for project root");

    loop {
        if has_root_file(&current) {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }
        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(FlowError::ProjectRootNotFound(start_dir))
}

fn has_root_file(dir: &Path) -> bool {
    dir.join(ROOT_FILE).exists() || dir.join(PROJECT_DIR).join(ROOT_FILE).exists()
}

/// Discover the deployment files under `project_root`.
///
/// `./infra.kdl` takes priority over `./.infraflow/infra.kdl`.
#[tracing::instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn discover_files(project_root: &Path) -> Result<DeploymentFiles> {
    let root = [
        project_root.join(ROOT_FILE),
        project_root.join(PROJECT_DIR).join(ROOT_FILE),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| FlowError::ProjectRootNotFound(project_root.to_path_buf()))?;

    debug!(file = %root.display(), "Found root file");
    Ok(files_for(project_root.to_path_buf(), root))
}

/// Deployment files for an explicitly chosen file.
///
/// The project root is the file's directory, or the directory above it when
/// the file lives in `.infraflow/`.
pub fn files_for_file(file: &Path) -> DeploymentFiles {
    let dir = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let project_root = if dir.file_name().is_some_and(|n| n == PROJECT_DIR) {
        dir.parent().unwrap_or(dir).to_path_buf()
    } else {
        dir.to_path_buf()
    };
    files_for(project_root, file.to_path_buf())
}

fn files_for(project_root: PathBuf, root: PathBuf) -> DeploymentFiles {
    let local_override = root
        .parent()
        .map(|dir| dir.join(LOCAL_FILE))
        .filter(|p| p.exists() && *p != root);
    if let Some(local) = &local_override {
        debug!(file = %local.display(), "Found local override");
    }
    DeploymentFiles {
        project_root,
        root,
        local_override,
    }
}
