//! Desired-state builders.
//!
//! Pure functions turning a declaration into the child objects it implies.
//! They never fail and never touch the store: the same input always yields
//! the same names, labels and specs, which the apply engine relies on when
//! deciding whether a live object has drifted.

mod loadbalance;
mod microservice;
mod workload;

pub use loadbalance::{
    build_load_balance, canary_annotations, canary_ingress_name, version_service_name,
    LoadBalancePlan,
};
pub use microservice::{build_microservices, microservice_name};
pub use workload::{build_deployment, build_deployments, workload_name};

use crate::labels::Labels;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;

/// Object metadata shared by every generated child.
fn child_meta(
    name: String,
    namespace: Option<String>,
    labels: Labels,
    owner: &OwnerReference,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace,
        labels: Some(labels),
        owner_references: Some(vec![owner.clone()]),
        ..Default::default()
    }
}

/// Parent labels plus the given extra pairs.
fn extend_labels(parent: Option<&Labels>, extra: &[(&str, &str)]) -> Labels {
    let mut labels = parent.cloned().unwrap_or_default();
    for (k, v) in extra {
        labels.insert(k.to_string(), v.to_string());
    }
    labels
}
