//! Label and annotation keys shared by every reconciler.
//!
//! Ownership garbage collection selects children by these labels, so the keys
//! are part of the operator's contract with existing clusters and must not change.

use std::collections::BTreeMap;

/// Label on a MicroService naming the App that declared it.
pub const APP_LABEL: &str = "app.o0w0o.cn/app";

/// Label on Deployments, Services and Ingresses naming the owning MicroService.
pub const SERVICE_LABEL: &str = "app.o0w0o.cn/service";

/// Label naming the DeployVersion a child was generated for.
pub const VERSION_LABEL: &str = "app.o0w0o.cn/version";

/// Prefix of the NGINX ingress controller canary annotations.
pub const INGRESS_ANNOTATION_PREFIX: &str = "nginx.ingress.kubernetes.io/";

/// Marks an Ingress as a canary of another Ingress with the same host/path.
pub const CANARY: &str = "nginx.ingress.kubernetes.io/canary";

/// Percentage of traffic routed to the canary.
pub const CANARY_WEIGHT: &str = "nginx.ingress.kubernetes.io/canary-weight";

/// Request header that forces routing to the canary.
pub const CANARY_BY_HEADER: &str = "nginx.ingress.kubernetes.io/canary-by-header";

/// Header value that forces routing to the canary.
pub const CANARY_BY_HEADER_VALUE: &str = "nginx.ingress.kubernetes.io/canary-by-header-value";

/// Cookie that forces routing to the canary.
pub const CANARY_BY_COOKIE: &str = "nginx.ingress.kubernetes.io/canary-by-cookie";

/// Annotations this operator writes and therefore owns on an Ingress.
pub const MANAGED_ANNOTATIONS: [&str; 5] = [
    CANARY,
    CANARY_WEIGHT,
    CANARY_BY_HEADER,
    CANARY_BY_HEADER_VALUE,
    CANARY_BY_COOKIE,
];

/// Annotation holding the serialized spec the operator last wrote to a child.
pub const LAST_APPLIED_ANNOTATION: &str = "app.o0w0o.cn/last-applied-spec";

/// Label map type used throughout the operator.
pub type Labels = BTreeMap<String, String>;

/// Selector matching every MicroService declared by an App.
pub fn app_selector(app_name: &str) -> Labels {
    BTreeMap::from([(APP_LABEL.to_string(), app_name.to_string())])
}

/// Selector matching every child generated for a MicroService.
pub fn service_selector(service_name: &str) -> Labels {
    BTreeMap::from([(SERVICE_LABEL.to_string(), service_name.to_string())])
}

/// Render a label map as a Kubernetes equality selector (`k=v,k=v`).
pub fn selector_string(selector: &Labels) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether `labels` carries every pair in `selector`.
pub fn matches(labels: Option<&Labels>, selector: &Labels) -> bool {
    selector.iter().all(|(k, v)| {
        labels
            .and_then(|l| l.get(k))
            .map(|actual| actual == v)
            .unwrap_or(false)
    })
}

/// Whether an annotation key is one the operator manages.
pub fn is_managed_annotation(key: &str) -> bool {
    MANAGED_ANNOTATIONS.contains(&key)
}
