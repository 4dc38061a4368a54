//! Apply engine and ownership GC.
//!
//! [`apply_all`] walks the desired objects in order and brings each live
//! object in line; the names it touched form the stay set. [`collect_orphans`]
//! then deletes every labelled object outside that set. Both stop at the first
//! error: the next pass re-derives everything from the declaration anyway.

use super::managed::{stamp_last_applied, ManagedResource};
use crate::error::{OperatorError, OperatorResult};
use crate::labels::Labels;
use crate::store::{ResourceStore, StoredResource};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use std::collections::BTreeSet;

/// What happened to one desired object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// It did not exist and was created.
    Created,
    /// It existed with a different spec and was replaced.
    Updated,
    /// It already matched.
    Unchanged,
}

/// Names of the objects handled by one [`apply_all`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Newly created objects.
    pub created: Vec<String>,
    /// Replaced objects.
    pub updated: Vec<String>,
    /// Objects that already matched.
    pub unchanged: Vec<String>,
}

impl ApplyReport {
    fn record(&mut self, name: String, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Created => self.created.push(name),
            ApplyOutcome::Updated => self.updated.push(name),
            ApplyOutcome::Unchanged => self.unchanged.push(name),
        }
    }

    /// Every name handled, whatever the outcome.
    pub fn stay_set(&self) -> BTreeSet<String> {
        self.created
            .iter()
            .chain(&self.updated)
            .chain(&self.unchanged)
            .cloned()
            .collect()
    }

    /// Number of writes the pass issued.
    pub fn changes(&self) -> usize {
        self.created.len() + self.updated.len()
    }
}

/// Bring a single live object in line with `desired`.
pub async fn apply_one<K: ManagedResource>(
    store: &dyn ResourceStore<K>,
    namespace: &str,
    owner: &OwnerReference,
    desired: &K,
) -> OperatorResult<ApplyOutcome> {
    let name = desired.name_any();
    let kind = K::kind(&());

    let Some(live) = store.get(namespace, &name).await? else {
        tracing::info!(kind = %kind, name = %name, namespace = %namespace, "Creating");
        let mut object = desired.clone();
        stamp_last_applied(&mut object);
        store.create(namespace, &object).await?;
        return Ok(ApplyOutcome::Created);
    };

    if !is_owned_by(&live, owner) {
        tracing::warn!(
            kind = %kind,
            name = %name,
            namespace = %namespace,
            owner = %owner.name,
            "Refusing to adopt object owned by someone else"
        );
        return Err(OperatorError::OwnershipConflict {
            kind: kind.to_string(),
            name,
            namespace: namespace.to_string(),
            owner: owner.name.clone(),
        });
    }

    if K::is_converged(desired, &live) {
        tracing::debug!(kind = %kind, name = %name, "Already up to date");
        return Ok(ApplyOutcome::Unchanged);
    }

    tracing::info!(kind = %kind, name = %name, namespace = %namespace, "Updating");
    let mut merged = K::merge_forward(desired, &live);
    stamp_last_applied(&mut merged);
    store.replace(namespace, &merged).await?;
    Ok(ApplyOutcome::Updated)
}

/// Apply every desired object in order, stopping at the first failure.
pub async fn apply_all<K: ManagedResource>(
    store: &dyn ResourceStore<K>,
    namespace: &str,
    owner: &OwnerReference,
    desired: &[K],
) -> OperatorResult<ApplyReport> {
    let mut report = ApplyReport::default();
    for object in desired {
        let outcome = apply_one(store, namespace, owner, object).await?;
        report.record(object.name_any(), outcome);
    }
    Ok(report)
}

/// Delete every object matching `selector` whose name is not in `stay`.
///
/// Returns the names deleted. Objects without the selector labels are never
/// listed, so they are never touched.
pub async fn collect_orphans<K: StoredResource>(
    store: &dyn ResourceStore<K>,
    namespace: &str,
    selector: &Labels,
    stay: &BTreeSet<String>,
) -> OperatorResult<Vec<String>> {
    let mut deleted = Vec::new();
    for object in store.list(namespace, selector).await? {
        let name = object.name_any();
        if stay.contains(&name) {
            continue;
        }
        tracing::info!(
            kind = %K::kind(&()),
            name = %name,
            namespace = %namespace,
            "Deleting orphan"
        );
        store.delete(namespace, &name).await?;
        deleted.push(name);
    }
    Ok(deleted)
}

fn is_owned_by<K: StoredResource>(object: &K, owner: &OwnerReference) -> bool {
    object
        .owner_references()
        .iter()
        .any(|reference| reference.uid == owner.uid)
}
