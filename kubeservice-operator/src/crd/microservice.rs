//! MicroService Custom Resource Definition.
//!
//! A MicroService declares the deployable versions of one service and how
//! traffic reaches them. It is owned by exactly one App.

use super::condition::Condition;
use k8s_openapi::api::apps::v1::DeploymentSpec;
use k8s_openapi::api::core::v1::ServiceSpec;
use k8s_openapi::api::networking::v1::IngressSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// MicroService is the Schema for the microservices API.
///
/// The operator expands each version into a Deployment and, when a
/// [`LoadBalance`] is declared, into Services and Ingresses (including
/// canary Ingresses for versions that declare a [`Canary`]).
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "app.o0w0o.cn",
    version = "v1",
    kind = "MicroService",
    plural = "microservices",
    shortname = "ms",
    namespaced,
    status = "MicroServiceStatus",
    printcolumn = r#"{"name":"Current", "type":"string", "jsonPath":".spec.currentVersionName"}"#,
    printcolumn = r#"{"name":"Available", "type":"integer", "jsonPath":".status.availableVersions"}"#,
    printcolumn = r#"{"name":"Total", "type":"integer", "jsonPath":".status.totalVersions"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MicroServiceSpec {
    /// Routing declaration. Absent means no managed Services or Ingresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balance: Option<LoadBalance>,

    /// Deployable versions, in declaration order.
    #[serde(default)]
    pub versions: Vec<DeployVersion>,

    /// Name of the stable version. Falls back to the first version when unset or unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version_name: Option<String>,

    /// Cluster the workloads of this MicroService belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
}

impl MicroServiceSpec {
    /// The version that receives primary traffic.
    ///
    /// Returns the version named by `currentVersionName`, or the first
    /// version when the name is unset or matches nothing.
    pub fn current_version(&self) -> Option<&DeployVersion> {
        self.named_current_version().or_else(|| self.versions.first())
    }

    /// Whether `currentVersionName` is set but names no declared version.
    pub fn has_dangling_current_version(&self) -> bool {
        self.current_version_name.is_some() && self.named_current_version().is_none()
    }

    fn named_current_version(&self) -> Option<&DeployVersion> {
        let wanted = self.current_version_name.as_deref()?;
        self.versions.iter().find(|v| v.name == wanted)
    }
}

/// One deployable variant of a MicroService.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeployVersion {
    /// Version name, unique within the MicroService.
    pub name: String,

    /// Deployment spec copied verbatim into the generated Deployment.
    pub template: DeploymentSpec,

    /// Name of the per-version Service. Defaults to `<microservice>-<version>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Canary routing rule. Versions without one receive no canary Ingress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canary: Option<Canary>,
}

impl DeployVersion {
    /// Pod labels selected by this version's Deployment.
    pub fn match_labels(&self) -> BTreeMap<String, String> {
        self.template
            .selector
            .match_labels
            .clone()
            .unwrap_or_default()
    }
}

/// Canary routing rule for a version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Canary {
    /// Percentage of traffic sent to this version.
    #[schemars(range(min = 1, max = 100))]
    pub weight: i32,

    /// Name of the canary Ingress. Defaults to `<microservice>-<version>-canary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canary_ingress_name: Option<String>,

    /// Request header that routes to the canary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,

    /// Value of `header` that routes to the canary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_value: Option<String>,

    /// Cookie that routes to the canary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
}

/// Service exposed for a MicroService.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLoadBalance {
    /// Name Ingress backends use to refer to the primary Service.
    pub name: String,

    /// Service spec template.
    pub spec: ServiceSpec,
}

/// Ingress exposed for a MicroService.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressLoadBalance {
    /// Name of the primary Ingress.
    pub name: String,

    /// Ingress spec template.
    pub spec: IngressSpec,
}

/// Routing declaration of a MicroService.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalance {
    /// Service exposure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceLoadBalance>,

    /// Ingress exposure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressLoadBalance>,
}

/// MicroService status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MicroServiceStatus {
    /// Condition history, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Number of Deployments found for this MicroService.
    #[serde(default)]
    pub available_versions: i32,

    /// Number of declared versions.
    #[serde(default)]
    pub total_versions: i32,
}
