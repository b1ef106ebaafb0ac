//! InfraFlow provisioning core
//!
//! Turns a set of resource descriptors into a dependency graph and executes
//! it against a provisioning adapter, creating independent resources
//! concurrently and threading each resource's outputs into the resources
//! that reference them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  InfraFlow CLI                   │
//! │            (iflow validate/plan/apply)           │
//! └─────────────────┬───────────────────────────────┘
//!                   │ Vec<ResourceDescriptor>
//! ┌─────────────────▼───────────────────────────────┐
//! │                infraflow-cloud                   │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │    Graph     │─▶│  Scheduler   │             │
//! │  └──────────────┘  └──────┬───────┘             │
//! │                 ┌─────────▼────────┐            │
//! │                 │     Resolver     │            │
//! │                 └─────────┬────────┘            │
//! │  ┌────────────────────────▼─────────────────┐   │
//! │  │  trait ProvisioningAdapter { create }    │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │ local adapter │  (infraflow-cloud-local)
//! └───────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use infraflow_cloud::{ExecuteOptions, Graph, ResourceDescriptor, execute};
//! # use infraflow_cloud::ProvisioningAdapter;
//! # use std::sync::Arc;
//! # async fn run(adapter: Arc<dyn ProvisioningAdapter>) -> infraflow_cloud::Result<()> {
//! let graph = Graph::build(vec![
//!     ResourceDescriptor::new("rg", "Microsoft.Resources/resourceGroups")
//!         .with_value("location", "westus"),
//!     ResourceDescriptor::new("vnet", "Microsoft.Network/virtualNetworks")
//!         .with_output("location", "rg", "location")
//!         .with_export("vnetId", "id"),
//! ])?;
//!
//! let result = execute(graph, adapter, ExecuteOptions::new()).await;
//! println!("{}", result.summary());
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod resolver;
pub mod result;
pub mod scheduler;
pub mod state;

// Re-exports
pub use adapter::{CreateRequest, Outputs, ProvisioningAdapter, RetryConfig, RetryingAdapter};
pub use descriptor::{Config, Export, Input, OutputRef, ResourceDescriptor};
pub use error::{Error, ErrorClass, GraphError, NodeError, ProviderError, Result};
pub use graph::{Graph, NodeState, ResourceNode};
pub use resolver::Resolver;
pub use result::{DeploymentResult, ExportValue, NodeReport, RunOutcome, RunSummary};
pub use scheduler::{CancelHandle, ExecuteOptions, execute};
pub use state::{GlobalState, ResourceRecord, StateLock, StateManager};
