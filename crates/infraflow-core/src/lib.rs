//! InfraFlow deployment files
//!
//! Reads KDL deployment files into [`ResourceDescriptor`](infraflow_cloud::ResourceDescriptor)s
//! and locates projects on disk.

pub mod discovery;
pub mod error;
pub mod loader;
pub mod model;
pub mod parser;

pub use discovery::{DeploymentFiles, discover_files, files_for_file, find_project_root};
pub use error::{FlowError, Result};
pub use loader::{load_deployment, load_file, load_project, load_project_from_root};
pub use model::Deployment;
pub use parser::{parse_kdl_file, parse_kdl_string};
