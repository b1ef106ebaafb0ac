//! File-backed provider implementation

use crate::error::{LocalError, Result};
use async_trait::async_trait;
use infraflow_cloud::{
    CreateRequest, GlobalState, Outputs, ProviderError, ProvisioningAdapter, ResourceRecord,
    StateManager,
};
use infraflow_config::ProviderSettings;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

const RESOURCE_GROUP_KIND: &str = "Microsoft.Resources/resourceGroups";
const VAULT_KIND: &str = "Microsoft.KeyVault/vaults";

/// Provider that records resources in the project state file
pub struct LocalProvider {
    settings: ProviderSettings,
    manager: StateManager,
    state: Mutex<GlobalState>,
    fail_kinds: BTreeSet<String>,
    remote_writes: AtomicUsize,
}

impl LocalProvider {
    /// Open the state of the project at `project_root`
    pub async fn open(project_root: impl AsRef<Path>, settings: ProviderSettings) -> Result<Self> {
        let manager = StateManager::new(project_root);
        let state = manager.load().await?;
        tracing::debug!(
            resources = state.resources.len(),
            subscription = %settings.subscription_id,
            "Opened local provider"
        );
        Ok(Self {
            settings,
            manager,
            state: Mutex::new(state),
            fail_kinds: BTreeSet::new(),
            remote_writes: AtomicUsize::new(0),
        })
    }

    /// Make every create of `kind` fail permanently
    pub fn with_failing_kind(mut self, kind: impl Into<String>) -> Self {
        self.fail_kinds.insert(kind.into());
        self
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Creates and updates performed since opening; unchanged re-runs don't count
    pub fn remote_writes(&self) -> usize {
        self.remote_writes.load(Ordering::SeqCst)
    }

    /// Snapshot of the current state
    pub async fn state(&self) -> GlobalState {
        self.state.lock().await.clone()
    }

    fn resource_group<'a>(&'a self, config: &'a Map<String, Value>) -> &'a str {
        config
            .get("resourceGroupName")
            .and_then(Value::as_str)
            .unwrap_or(&self.settings.resource_group)
    }

    fn remote_id(&self, request: &CreateRequest, name: &str) -> String {
        let sub = &self.settings.subscription_id;
        if request.kind == RESOURCE_GROUP_KIND {
            format!("/subscriptions/{sub}/resourceGroups/{name}")
        } else {
            format!(
                "/subscriptions/{sub}/resourceGroups/{}/providers/{}/{name}",
                self.resource_group(&request.config),
                request.kind
            )
        }
    }

    /// Scalar configuration echoed back, plus identity outputs
    fn outputs(&self, request: &CreateRequest, remote_id: &str, name: &str) -> Outputs {
        let mut outputs: Outputs = request
            .config
            .iter()
            .filter(|(_, v)| !v.is_object() && !v.is_array())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let location = request
            .get_config::<String>("location")
            .unwrap_or_else(|| self.settings.region.clone());

        outputs.insert("id".to_string(), Value::String(remote_id.to_string()));
        outputs.insert("name".to_string(), Value::String(name.to_string()));
        outputs.insert("location".to_string(), Value::String(location));
        outputs.insert(
            "provisioningState".to_string(),
            Value::String("Succeeded".to_string()),
        );
        if request.kind == VAULT_KIND {
            outputs.insert(
                "vaultUri".to_string(),
                Value::String(format!("https://{name}.vault.azure.net/")),
            );
        }
        outputs
    }
}

/// Name the resource gets remotely
fn resource_name(request: &CreateRequest) -> &str {
    let key = if request.kind == RESOURCE_GROUP_KIND {
        "resourceGroupName"
    } else {
        "resourceName"
    };
    request
        .config
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(&request.id)
}

#[async_trait]
impl ProvisioningAdapter for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn create(&self, request: &CreateRequest) -> std::result::Result<Outputs, ProviderError> {
        if self.fail_kinds.contains(&request.kind) {
            return Err(ProviderError::permanent(
                LocalError::FailingKind(request.kind.clone()).to_string(),
            ));
        }

        let mut state = self.state.lock().await;

        if let Some(record) = state.get(&request.id)
            && record.is_current(&request.kind, &request.config)
        {
            tracing::debug!(node = %request.id, remote_id = %record.remote_id, "Already exists, unchanged");
            return Ok(record.outputs.clone());
        }

        let name = resource_name(request);
        let remote_id = self.remote_id(request, name);
        let outputs = self.outputs(request, &remote_id, name);

        let record = match state.resources.get(&request.id).cloned() {
            Some(mut record) if record.kind == request.kind && record.remote_id == remote_id => {
                tracing::info!(node = %request.id, remote_id = %remote_id, "Updating resource");
                record.update(request.config.clone(), outputs.clone());
                record
            }
            _ => {
                tracing::info!(node = %request.id, remote_id = %remote_id, "Creating resource");
                ResourceRecord::new(&remote_id, &request.kind, request.config.clone(), outputs.clone())
            }
        };
        // Memory only follows once the write has reached disk
        let mut next = state.clone();
        next.upsert(&request.id, record);
        self.manager
            .save(&next)
            .await
            .map_err(|e| ProviderError::transient(format!("failed to persist state: {e}")))?;
        *state = next;
        self.remote_writes.fetch_add(1, Ordering::SeqCst);

        Ok(outputs)
    }
}
