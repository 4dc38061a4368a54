//! MicroService version → Deployment expansion.

use super::{child_meta, extend_labels};
use crate::crd::{DeployVersion, MicroService};
use crate::labels::{SERVICE_LABEL, VERSION_LABEL};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

/// Name of the Deployment generated for a version.
pub fn workload_name(service_name: &str, version_name: &str) -> String {
    format!("{}-{}", service_name, version_name)
}

/// Build the Deployment for one version.
pub fn build_deployment(
    service: &MicroService,
    version: &DeployVersion,
    owner: &OwnerReference,
) -> Deployment {
    let service_name = service.name_any();
    let labels = extend_labels(
        service.metadata.labels.as_ref(),
        &[
            (SERVICE_LABEL, service_name.as_str()),
            (VERSION_LABEL, version.name.as_str()),
        ],
    );

    Deployment {
        metadata: child_meta(
            workload_name(&service_name, &version.name),
            service.namespace(),
            labels,
            owner,
        ),
        spec: Some(version.template.clone()),
        status: None,
    }
}

/// Build one Deployment per declared version, in declaration order.
pub fn build_deployments(service: &MicroService, owner: &OwnerReference) -> Vec<Deployment> {
    service
        .spec
        .versions
        .iter()
        .map(|version| build_deployment(service, version, owner))
        .collect()
}
