//! In-process store.
//!
//! Behaves like the API server for the operations the controllers use:
//! uids and resourceVersions are assigned on write, stale replaces are
//! rejected, and lists filter by label subset. Every mutating call is
//! counted so tests can assert that a pass was a no-op.

use super::{ResourceStore, StoredResource};
use crate::error::{OperatorError, OperatorResult};
use crate::labels::{self, Labels};
use async_trait::async_trait;
use kube::ResourceExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

/// Call counters of a [`MemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Successful creates.
    pub creates: usize,
    /// Successful replaces.
    pub updates: usize,
    /// Deletes of existing objects.
    pub deletes: usize,
    /// Status writes.
    pub status_updates: usize,
}

impl StoreStats {
    /// Number of create, update and delete calls.
    pub fn mutations(&self) -> usize {
        self.creates + self.updates + self.deletes
    }
}

struct Inner<K> {
    objects: BTreeMap<(String, String), K>,
    next_version: u64,
    stats: StoreStats,
    failing: BTreeSet<String>,
}

/// [`ResourceStore`] held in memory.
pub struct MemoryStore<K> {
    inner: Mutex<Inner<K>>,
}

impl<K: StoredResource> Default for MemoryStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: StoredResource> MemoryStore<K> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                objects: BTreeMap::new(),
                next_version: 1,
                stats: StoreStats::default(),
                failing: BTreeSet::new(),
            }),
        }
    }

    /// Insert an object as if someone else had created it. Not counted in stats.
    pub fn insert(&self, object: K) -> K {
        let mut inner = self.inner.lock();
        let namespace = object.namespace().unwrap_or_default();
        let stored = Self::stamp(&mut inner, object, true);
        inner
            .objects
            .insert((namespace, stored.name_any()), stored.clone());
        stored
    }

    /// Fetch an object without going through the counted API.
    pub fn object(&self, namespace: &str, name: &str) -> Option<K> {
        self.inner
            .lock()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Names of every object in a namespace, sorted.
    pub fn names(&self, namespace: &str) -> Vec<String> {
        self.inner
            .lock()
            .objects
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Remove an object without going through the counted API.
    pub fn remove(&self, namespace: &str, name: &str) -> Option<K> {
        self.inner
            .lock()
            .objects
            .remove(&(namespace.to_string(), name.to_string()))
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> StoreStats {
        self.inner.lock().stats
    }

    /// Reset the call counters.
    pub fn reset_stats(&self) {
        self.inner.lock().stats = StoreStats::default();
    }

    /// Make every call that names `name` fail with a transient store error.
    pub fn fail_on(&self, name: impl Into<String>) {
        self.inner.lock().failing.insert(name.into());
    }

    /// Stop failing calls that name `name`.
    pub fn recover(&self, name: &str) {
        self.inner.lock().failing.remove(name);
    }

    fn check_failure(inner: &Inner<K>, name: &str) -> OperatorResult<()> {
        if inner.failing.contains(name) {
            return Err(OperatorError::StoreError(format!(
                "injected failure for {}/{}",
                K::kind(&()),
                name
            )));
        }
        Ok(())
    }

    fn stamp(inner: &mut Inner<K>, mut object: K, fresh: bool) -> K {
        let version = inner.next_version;
        inner.next_version += 1;
        let meta = object.meta_mut();
        meta.resource_version = Some(version.to_string());
        if fresh && meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        object
    }

    fn not_found(namespace: &str, name: &str) -> OperatorError {
        OperatorError::NotFound {
            kind: K::kind(&()).to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl<K: StoredResource> ResourceStore<K> for MemoryStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> OperatorResult<Option<K>> {
        let inner = self.inner.lock();
        Self::check_failure(&inner, name)?;
        Ok(inner
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list(&self, namespace: &str, selector: &Labels) -> OperatorResult<Vec<K>> {
        let inner = self.inner.lock();
        Ok(inner
            .objects
            .iter()
            .filter(|((ns, _), obj)| {
                ns == namespace && labels::matches(obj.meta().labels.as_ref(), selector)
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, namespace: &str, object: &K) -> OperatorResult<K> {
        let mut inner = self.inner.lock();
        let name = object.name_any();
        Self::check_failure(&inner, &name)?;

        let key = (namespace.to_string(), name.clone());
        if inner.objects.contains_key(&key) {
            return Err(OperatorError::StoreError(format!(
                "{}/{} already exists in namespace {}",
                K::kind(&()),
                name,
                namespace
            )));
        }

        let mut object = object.clone();
        object.meta_mut().namespace = Some(namespace.to_string());
        let stored = Self::stamp(&mut inner, object, true);
        inner.objects.insert(key, stored.clone());
        inner.stats.creates += 1;
        Ok(stored)
    }

    async fn replace(&self, namespace: &str, object: &K) -> OperatorResult<K> {
        let mut inner = self.inner.lock();
        let name = object.name_any();
        Self::check_failure(&inner, &name)?;

        let key = (namespace.to_string(), name.clone());
        let current_version = match inner.objects.get(&key) {
            Some(existing) => existing.meta().resource_version.clone(),
            None => return Err(Self::not_found(namespace, &name)),
        };
        if object.meta().resource_version.is_some()
            && object.meta().resource_version != current_version
        {
            return Err(OperatorError::StoreError(format!(
                "conflict replacing {}/{}: object has been modified",
                K::kind(&()),
                name
            )));
        }

        let stored = Self::stamp(&mut inner, object.clone(), false);
        inner.objects.insert(key, stored.clone());
        inner.stats.updates += 1;
        Ok(stored)
    }

    async fn delete(&self, namespace: &str, name: &str) -> OperatorResult<()> {
        let mut inner = self.inner.lock();
        Self::check_failure(&inner, name)?;
        if inner
            .objects
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some()
        {
            inner.stats.deletes += 1;
        }
        Ok(())
    }

    async fn replace_status(&self, namespace: &str, object: &K) -> OperatorResult<()> {
        let mut inner = self.inner.lock();
        let name = object.name_any();
        Self::check_failure(&inner, &name)?;

        let key = (namespace.to_string(), name.clone());
        let existing = inner
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| Self::not_found(namespace, &name))?;

        let mut merged = serde_json::to_value(&existing)?;
        let incoming = serde_json::to_value(object)?;
        merged["status"] = incoming
            .get("status")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let merged: K = serde_json::from_value(merged)?;

        let stored = Self::stamp(&mut inner, merged, false);
        inner.objects.insert(key, stored);
        inner.stats.status_updates += 1;
        Ok(())
    }
}
