//! Settings read from the environment
//!
//! Provider credentials and run tuning are resolved once, up front, and
//! handed to the adapter and scheduler as plain values.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const SUBSCRIPTION_ENV: &str = "INFRAFLOW_SUBSCRIPTION_ID";
pub const REGION_ENV: &str = "INFRAFLOW_REGION";
pub const RESOURCE_GROUP_ENV: &str = "INFRAFLOW_RESOURCE_GROUP";
pub const NODE_TIMEOUT_ENV: &str = "INFRAFLOW_NODE_TIMEOUT_SECS";
pub const MAX_PARALLEL_ENV: &str = "INFRAFLOW_MAX_PARALLEL";

const DEFAULT_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";
const DEFAULT_REGION: &str = "westus";
const DEFAULT_RESOURCE_GROUP: &str = "rg1";

/// Account and placement defaults given to a provider at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub subscription_id: String,
    pub region: String,
    pub resource_group: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            subscription_id: DEFAULT_SUBSCRIPTION.to_string(),
            region: DEFAULT_REGION.to_string(),
            resource_group: DEFAULT_RESOURCE_GROUP.to_string(),
        }
    }
}

impl ProviderSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let settings = Self {
            subscription_id: env_or(SUBSCRIPTION_ENV, defaults.subscription_id),
            region: env_or(REGION_ENV, defaults.region),
            resource_group: env_or(RESOURCE_GROUP_ENV, defaults.resource_group),
        };
        tracing::debug!(
            subscription = %settings.subscription_id,
            region = %settings.region,
            resource_group = %settings.resource_group,
            "Provider settings resolved"
        );
        settings
    }
}

/// Scheduler tuning for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSettings {
    pub node_timeout: Option<Duration>,
    pub max_parallel: Option<usize>,
}

impl RunSettings {
    /// # Errors
    ///
    /// `InvalidValue` when a variable is set but not a positive integer.
    pub fn from_env() -> Result<Self> {
        let node_timeout = parse_env::<u64>(NODE_TIMEOUT_ENV)?.map(Duration::from_secs);
        let max_parallel = parse_env::<usize>(MAX_PARALLEL_ENV)?;
        Ok(Self {
            node_timeout,
            max_parallel,
        })
    }

    /// Command-line values take precedence over the environment
    pub fn merge(self, node_timeout: Option<Duration>, max_parallel: Option<usize>) -> Self {
        Self {
            node_timeout: node_timeout.or(self.node_timeout),
            max_parallel: max_parallel.or(self.max_parallel),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    let invalid = |reason: String| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.clone(),
        reason,
    };
    let value = raw.trim().parse::<T>().map_err(|e| invalid(e.to_string()))?;
    if value == T::default() {
        return Err(invalid("must be greater than zero".to_string()));
    }
    Ok(Some(value))
}
