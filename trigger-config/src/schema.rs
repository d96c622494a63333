//! Strongly typed configuration schema.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use trigger_executor::{ExecutionMode, ExecutionPolicy, PoolConfig};
use trigger_primitives::TriggerType;

use crate::error::{ConfigError, ConfigResult};

const DEFAULT_WORKER_POOL_SIZE: usize = 8;
const DEFAULT_LOG_FILTER: &str = "info";

/// Execution policy as written in configuration.
///
/// `async_mode = true` runs inline on the caller's task; `false` offloads to
/// the worker pool. `timeout_secs` may be fractional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySettings {
    /// Observational priority.
    #[serde(default)]
    pub priority: u32,
    /// Inline (`true`) or offloaded (`false`) execution.
    #[serde(default = "default_async_mode")]
    pub async_mode: bool,
    /// Per-attempt timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
    /// Additional attempts after the first.
    #[serde(default)]
    pub retry_count: u32,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            priority: 0,
            async_mode: default_async_mode(),
            timeout_secs: None,
            retry_count: 0,
        }
    }
}

impl PolicySettings {
    /// Converts the settings into an [`ExecutionPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the timeout is negative, zero,
    /// not finite, or too large to represent.
    pub fn to_policy(&self) -> ConfigResult<ExecutionPolicy> {
        let mode = if self.async_mode {
            ExecutionMode::Inline
        } else {
            ExecutionMode::Offloaded
        };

        let mut policy = ExecutionPolicy::new()
            .with_priority(self.priority)
            .with_mode(mode)
            .with_retry_count(self.retry_count);

        if let Some(secs) = self.timeout_secs {
            let timeout = Duration::try_from_secs_f64(secs)
                .ok()
                .filter(|timeout| !timeout.is_zero())
                .ok_or_else(|| {
                    ConfigError::invalid(format!("timeout_secs must be positive, got {secs}"))
                })?;
            policy = policy.with_timeout(timeout);
        }

        Ok(policy)
    }
}

const fn default_async_mode() -> bool {
    true
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Number of workers available to offloaded attempts.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Fail startup when two handlers claim the same trigger type.
    #[serde(default)]
    pub strict_capabilities: bool,
    /// Policy for built-in handlers without an entry in `handler_policies`.
    /// When absent those handlers are invoked directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_policy: Option<PolicySettings>,
    /// Per trigger type policies for the built-in handlers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub handler_policies: BTreeMap<TriggerType, PolicySettings>,
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            strict_capabilities: false,
            default_policy: None,
            handler_policies: BTreeMap::new(),
            log_filter: default_log_filter(),
        }
    }
}

fn default_worker_pool_size() -> usize {
    DEFAULT_WORKER_POOL_SIZE
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

impl RuntimeConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown fields and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, plus every
    /// error [`from_json_str`](Self::from_json_str) can return.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded runtime config");
        Self::from_json_str(&json)
    }

    /// Checks every value that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero worker pool, an empty log
    /// filter, or any policy with an invalid timeout.
    pub fn validate(&self) -> ConfigResult<()> {
        self.pool_config()?;

        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::invalid("log_filter cannot be empty"));
        }

        if let Some(policy) = &self.default_policy {
            policy.to_policy()?;
        }
        for policy in self.handler_policies.values() {
            policy.to_policy()?;
        }

        Ok(())
    }

    /// Returns the worker pool configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `worker_pool_size` is zero.
    pub fn pool_config(&self) -> ConfigResult<PoolConfig> {
        NonZeroUsize::new(self.worker_pool_size)
            .map(PoolConfig::new)
            .ok_or_else(|| ConfigError::invalid("worker_pool_size must be at least 1"))
    }

    /// Returns the policy the built-in handler for `trigger_type` runs under,
    /// or `None` when it is invoked directly.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the selected policy is invalid.
    pub fn policy_for(&self, trigger_type: TriggerType) -> ConfigResult<Option<ExecutionPolicy>> {
        self.handler_policies
            .get(&trigger_type)
            .or(self.default_policy.as_ref())
            .map(PolicySettings::to_policy)
            .transpose()
    }
}
