//! Local provisioning adapter for InfraFlow
//!
//! Implements [`ProvisioningAdapter`](infraflow_cloud::ProvisioningAdapter)
//! against the project's `.infraflow/state.json` instead of a cloud API.
//! Resource ids follow the Azure Resource Manager layout, so deployments can
//! be rehearsed and their exports inspected without credentials.
//!
//! # Example
//!
//! ```ignore
//! use infraflow_cloud_local::LocalProvider;
//! use infraflow_config::ProviderSettings;
//!
//! let provider = LocalProvider::open(".", ProviderSettings::from_env()).await?;
//! let result = infraflow_cloud::execute(graph, Arc::new(provider), options).await;
//! ```

pub mod error;
pub mod provider;

pub use error::{LocalError, Result};
pub use provider::LocalProvider;
