//! Per-kind comparison of desired and live objects.
//!
//! The API server fills in defaults (strategy, revisionHistoryLimit,
//! clusterIP, ...) that never appear in a declaration. Comparing whole
//! objects would see drift on every pass, so each kind decides for itself
//! which fields it owns and which fields the server keeps.
//!
//! A field the declaration stops setting looks exactly like a server default
//! on the live object. Every write therefore records the declared spec under
//! [`LAST_APPLIED_ANNOTATION`]; a live object is converged only while that
//! record matches the current declaration.

use crate::crd::MicroService;
use crate::labels::{self, is_managed_annotation, LAST_APPLIED_ANNOTATION};
use crate::store::StoredResource;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A kind the apply engine creates and keeps in sync.
pub trait ManagedResource: StoredResource {
    /// Whether `live` already carries everything `desired` sets.
    fn is_converged(desired: &Self, live: &Self) -> bool;

    /// The object to send when replacing `live` with `desired`.
    ///
    /// Starts from `live` so identity, resourceVersion and server-assigned
    /// fields survive the update.
    fn merge_forward(desired: &Self, live: &Self) -> Self;

    /// The declared spec in the form recorded under [`LAST_APPLIED_ANNOTATION`].
    fn spec_record(&self) -> Option<String>;
}

/// Record the spec of `object` under [`LAST_APPLIED_ANNOTATION`].
pub fn stamp_last_applied<K: ManagedResource>(object: &mut K) {
    if let Some(record) = object.spec_record() {
        object
            .annotations_mut()
            .insert(LAST_APPLIED_ANNOTATION.to_string(), record);
    }
}

fn last_applied_matches<K: ManagedResource>(desired: &K, live: &K) -> bool {
    desired
        .spec_record()
        .is_some_and(|record| live.annotations().get(LAST_APPLIED_ANNOTATION) == Some(&record))
}

fn record_of<T: Serialize>(spec: &T) -> Option<String> {
    serde_json::to_string(spec).ok()
}

impl ManagedResource for Deployment {
    fn is_converged(desired: &Self, live: &Self) -> bool {
        labels_covered(desired, live)
            && last_applied_matches(desired, live)
            && covers_serialized(&desired.spec, &live.spec)
    }

    fn merge_forward(desired: &Self, live: &Self) -> Self {
        let mut merged = live.clone();
        overlay_labels(&mut merged, desired);
        merged.spec = desired.spec.clone();
        merged
    }

    fn spec_record(&self) -> Option<String> {
        record_of(&self.spec)
    }
}

impl ManagedResource for Service {
    fn is_converged(desired: &Self, live: &Self) -> bool {
        labels_covered(desired, live)
            && last_applied_matches(desired, live)
            && covers_serialized(&desired.spec, &live.spec)
    }

    fn merge_forward(desired: &Self, live: &Self) -> Self {
        let mut merged = live.clone();
        overlay_labels(&mut merged, desired);
        merged.spec = match (desired.spec.clone(), live.spec.as_ref()) {
            (Some(spec), Some(current)) => Some(carry_assigned_fields(spec, current)),
            (spec, _) => spec,
        };
        merged
    }

    fn spec_record(&self) -> Option<String> {
        record_of(&self.spec)
    }
}

impl ManagedResource for Ingress {
    fn is_converged(desired: &Self, live: &Self) -> bool {
        labels_covered(desired, live)
            && last_applied_matches(desired, live)
            && managed_annotations(desired) == managed_annotations(live)
            && covers_serialized(&desired.spec, &live.spec)
    }

    fn merge_forward(desired: &Self, live: &Self) -> Self {
        let mut merged = live.clone();
        overlay_labels(&mut merged, desired);

        let mut annotations = live.metadata.annotations.clone().unwrap_or_default();
        annotations.retain(|key, _| !is_managed_annotation(key));
        annotations.extend(managed_annotations(desired));
        merged.metadata.annotations = if annotations.is_empty() {
            None
        } else {
            Some(annotations)
        };

        merged.spec = desired.spec.clone();
        merged
    }

    fn spec_record(&self) -> Option<String> {
        record_of(&self.spec)
    }
}

impl ManagedResource for MicroService {
    fn is_converged(desired: &Self, live: &Self) -> bool {
        labels_covered(desired, live) && desired.spec == live.spec
    }

    fn merge_forward(desired: &Self, live: &Self) -> Self {
        let mut merged = live.clone();
        overlay_labels(&mut merged, desired);
        merged.spec = desired.spec.clone();
        merged
    }

    fn spec_record(&self) -> Option<String> {
        record_of(&self.spec)
    }
}

/// Whether every non-empty value in `desired` is present and equal in `live`.
///
/// Objects are compared key by key, arrays element by element (lengths must
/// match) and scalars by equality. Zero values in `desired` are covered by
/// an absent field, since the API server drops them on the way back.
pub fn covers(desired: &Value, live: &Value) -> bool {
    match desired {
        Value::Null => true,
        Value::Object(fields) => fields.iter().all(|(key, value)| {
            covers(value, live.get(key).unwrap_or(&Value::Null))
        }),
        Value::Array(items) => {
            let live_items = live.as_array().map(Vec::as_slice).unwrap_or_default();
            items.len() == live_items.len()
                && items.iter().zip(live_items).all(|(d, l)| covers(d, l))
        }
        scalar => scalar == live || (live.is_null() && is_zero(scalar)),
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn covers_serialized<T: Serialize>(desired: &T, live: &T) -> bool {
    match (serde_json::to_value(desired), serde_json::to_value(live)) {
        (Ok(desired), Ok(live)) => covers(&desired, &live),
        // Anything we cannot compare is treated as drift and rewritten.
        _ => false,
    }
}

fn labels_covered<K: StoredResource>(desired: &K, live: &K) -> bool {
    let wanted = desired.meta().labels.clone().unwrap_or_default();
    labels::matches(live.meta().labels.as_ref(), &wanted)
}

fn overlay_labels<K: StoredResource>(merged: &mut K, desired: &K) {
    let Some(wanted) = desired.meta().labels.as_ref() else {
        return;
    };
    merged
        .meta_mut()
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(wanted.iter().map(|(k, v)| (k.clone(), v.clone())));
}

fn managed_annotations(ingress: &Ingress) -> BTreeMap<String, String> {
    ingress
        .metadata
        .annotations
        .iter()
        .flatten()
        .filter(|(key, _)| is_managed_annotation(key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Copy fields the API server assigns from the live spec when the declaration leaves them unset.
fn carry_assigned_fields(mut spec: ServiceSpec, live: &ServiceSpec) -> ServiceSpec {
    if spec.cluster_ip.is_none() {
        spec.cluster_ip = live.cluster_ip.clone();
    }
    if spec.cluster_ips.is_none() {
        spec.cluster_ips = live.cluster_ips.clone();
    }
    if spec.ip_families.is_none() {
        spec.ip_families = live.ip_families.clone();
    }
    if spec.ip_family_policy.is_none() {
        spec.ip_family_policy = live.ip_family_policy.clone();
    }
    if spec.health_check_node_port.is_none() {
        spec.health_check_node_port = live.health_check_node_port;
    }

    let live_ports = live.ports.as_deref().unwrap_or_default();
    for port in spec.ports.iter_mut().flatten() {
        if port.node_port.is_none() {
            port.node_port = live_ports
                .iter()
                .find(|candidate| same_port(port, candidate))
                .and_then(|candidate| candidate.node_port);
        }
    }
    spec
}

fn same_port(a: &ServicePort, b: &ServicePort) -> bool {
    match (&a.name, &b.name) {
        (Some(x), Some(y)) => x == y,
        _ => {
            a.port == b.port
                && a.protocol.as_deref().unwrap_or("TCP") == b.protocol.as_deref().unwrap_or("TCP")
        }
    }
}
