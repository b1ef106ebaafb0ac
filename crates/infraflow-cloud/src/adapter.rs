//! Provisioning adapter trait definition

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Concrete outputs of a created resource, keyed by output name
pub type Outputs = BTreeMap<String, Value>;

/// Fully resolved create-or-update call for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Logical id; adapters key idempotence on it
    pub id: String,

    /// Resource type tag
    pub kind: String,

    /// Configuration with every output reference substituted
    pub config: Map<String, Value>,
}

impl CreateRequest {
    /// Get a configuration value as a specific type
    pub fn get_config<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Capability that performs the remote create-or-update call
///
/// Implementations must be idempotent with respect to `request.id`: calling
/// `create` again with an unchanged configuration must not create a second
/// remote resource. The scheduler calls `create` at most once per node per run.
#[async_trait]
pub trait ProvisioningAdapter: Send + Sync {
    /// Returns the adapter name (e.g., "local")
    fn name(&self) -> &str;

    /// Create or update the resource and return its outputs
    async fn create(&self, request: &CreateRequest) -> Result<Outputs, ProviderError>;
}

#[async_trait]
impl<A: ProvisioningAdapter + ?Sized> ProvisioningAdapter for Arc<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn create(&self, request: &CreateRequest) -> Result<Outputs, ProviderError> {
        (**self).create(request).await
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first call included
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before the retry following `attempt` (1-based)
    ///
    /// Saturates at `max_delay`, whatever the multiplier or attempt count.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if secs.is_finite() && secs < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            self.max_delay
        }
    }
}

/// Adapter wrapper that retries transient provider errors with backoff
///
/// The wrapped adapter must be idempotent per `request.id`.
pub struct RetryingAdapter<A> {
    inner: A,
    config: RetryConfig,
}

impl<A: ProvisioningAdapter> RetryingAdapter<A> {
    pub fn new(inner: A, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: ProvisioningAdapter> ProvisioningAdapter for RetryingAdapter<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn create(&self, request: &CreateRequest) -> Result<Outputs, ProviderError> {
        let mut attempt = 1;
        loop {
            match self.inner.create(request).await {
                Ok(outputs) => return Ok(outputs),
                Err(err) if err.is_transient() && attempt < self.config.max_attempts => {
                    let delay = self.config.delay_after(attempt);
                    tracing::warn!(
                        node = %request.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
