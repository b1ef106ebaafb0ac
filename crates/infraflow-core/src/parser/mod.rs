//! KDL parser
//!
//! Parses InfraFlow deployment files. Each top-level node kind is handled in
//! its own module.

mod resource;
mod value;

pub use resource::parse_resource;

use crate::error::Result;
use crate::model::Deployment;
use kdl::KdlDocument;
use std::fs;
use std::path::Path;

/// Parse a deployment file; the project name defaults to the directory name
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<Deployment> {
    let content = fs::read_to_string(path.as_ref())?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_kdl_string(&content, name)
}

/// Parse deployment KDL
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<Deployment> {
    parse_document(content, default_name).map(|(deployment, _)| deployment)
}

/// Parse deployment KDL, also reporting whether a `project` node named it
pub(crate) fn parse_document(content: &str, default_name: String) -> Result<(Deployment, bool)> {
    let doc: KdlDocument = content.parse()?;

    let mut deployment = Deployment::new(default_name);
    let mut named = false;

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if let Some(project_name) =
                    node.entries().first().and_then(|e| e.value().as_string())
                {
                    deployment.name = project_name.to_string();
                    named = true;
                }
            }
            "resource" => {
                deployment.resources.push(parse_resource(node)?);
            }
            other => {
                tracing::warn!(node = %other, "Ignoring unknown top-level node");
            }
        }
    }

    tracing::debug!(
        project = %deployment.name,
        resources = deployment.resources.len(),
        "Parsed deployment"
    );
    Ok((deployment, named))
}
