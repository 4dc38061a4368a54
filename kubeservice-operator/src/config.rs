//! Operator configuration.
//!
//! Values are read once at startup and injected into the controllers, the
//! cluster-scope gate and the manager notifier.

use std::env;
use std::time::Duration;

/// Default number of conditions kept in a status history.
pub const DEFAULT_CONDITION_HISTORY: usize = 10;

/// Runtime configuration for the operator.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Identity of the cluster this process materializes workloads in.
    cluster_name: Option<String>,
    /// Base URL of the central manager, if multi-cluster sync is enabled.
    manager_url: Option<String>,
    /// Maximum number of conditions kept per status object.
    condition_history_limit: usize,
    /// Timeout for a single manager push.
    manager_timeout: Duration,
    /// Requeue delay after a successful pass.
    resync_interval: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            cluster_name: None,
            manager_url: None,
            condition_history_limit: DEFAULT_CONDITION_HISTORY,
            manager_timeout: Duration::from_secs(30),
            resync_interval: Duration::from_secs(300),
        }
    }
}

impl OperatorConfig {
    /// Create configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CLUSTER_NAME` (or legacy `cluster_name`): cluster identity
    /// - `MANAGER_URL` (or legacy `manager_url`): central manager endpoint
    /// - `KUBESERVICE_CONDITION_HISTORY`: conditions kept per status
    /// - `KUBESERVICE_MANAGER_TIMEOUT_SECS`: manager push timeout
    /// - `KUBESERVICE_RESYNC_SECS`: periodic resync interval
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            cluster_name: non_empty("CLUSTER_NAME").or_else(|| non_empty("cluster_name")),
            manager_url: non_empty("MANAGER_URL")
                .or_else(|| non_empty("manager_url"))
                .map(|url| url.trim_end_matches('/').to_string()),
            condition_history_limit: non_empty("KUBESERVICE_CONDITION_HISTORY")
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.condition_history_limit),
            manager_timeout: non_empty("KUBESERVICE_MANAGER_TIMEOUT_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.manager_timeout),
            resync_interval: non_empty("KUBESERVICE_RESYNC_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.resync_interval),
        }
    }

    /// Set the cluster identity.
    pub fn with_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = Some(name.into());
        self
    }

    /// Set the manager base URL.
    pub fn with_manager_url(mut self, url: impl Into<String>) -> Self {
        self.manager_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    /// Set the condition history limit (at least one condition is always kept).
    pub fn with_condition_history_limit(mut self, limit: usize) -> Self {
        self.condition_history_limit = limit.max(1);
        self
    }

    /// Set the manager push timeout.
    pub fn with_manager_timeout(mut self, timeout: Duration) -> Self {
        self.manager_timeout = timeout;
        self
    }

    /// Set the resync interval.
    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    /// Get the cluster identity.
    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    /// Get the manager base URL.
    pub fn manager_url(&self) -> Option<&str> {
        self.manager_url.as_deref()
    }

    /// Get the condition history limit.
    pub fn condition_history_limit(&self) -> usize {
        self.condition_history_limit
    }

    /// Get the manager push timeout.
    pub fn manager_timeout(&self) -> Duration {
        self.manager_timeout
    }

    /// Get the resync interval.
    pub fn resync_interval(&self) -> Duration {
        self.resync_interval
    }
}
