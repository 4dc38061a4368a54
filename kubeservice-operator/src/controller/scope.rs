//! Cluster-scope gate.
//!
//! One control plane may hold MicroServices meant for several physical
//! clusters. Each operator only materializes Deployments for the
//! MicroServices that target its own cluster. An unset name on either side
//! counts as the empty name, so an untargeted MicroService belongs only to
//! an operator without a cluster identity.

use crate::config::OperatorConfig;

/// Decides which MicroServices this operator materializes workloads for.
#[derive(Debug, Clone, Default)]
pub struct ClusterScope {
    cluster_name: Option<String>,
}

impl ClusterScope {
    /// Gate for the given cluster identity.
    pub fn new(cluster_name: Option<String>) -> Self {
        Self {
            cluster_name: cluster_name.filter(|name| !name.is_empty()),
        }
    }

    /// Gate for the cluster named in the configuration.
    pub fn from_config(config: &OperatorConfig) -> Self {
        Self::new(config.cluster_name().map(str::to_string))
    }

    /// The identity of this cluster.
    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    /// Whether a MicroService targeting `target` is materialized here.
    pub fn admits(&self, target: Option<&str>) -> bool {
        target.unwrap_or_default() == self.cluster_name().unwrap_or_default()
    }
}
