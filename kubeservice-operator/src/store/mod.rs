//! Access to the resource store the controllers reconcile against.
//!
//! Controllers never talk to `kube::Api` directly; they go through
//! [`ResourceStore`], which has a Kubernetes-backed implementation
//! ([`KubeStore`]) and an in-process one ([`MemoryStore`]) used by tests.

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::{MemoryStore, StoreStats};

use crate::error::OperatorResult;
use crate::labels::Labels;
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Bounds every kind held in a store satisfies.
pub trait StoredResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoredResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Namespaced get/list/create/replace/delete over one resource kind.
#[async_trait]
pub trait ResourceStore<K: StoredResource>: Send + Sync {
    /// Fetch an object by name. `Ok(None)` when it does not exist.
    async fn get(&self, namespace: &str, name: &str) -> OperatorResult<Option<K>>;

    /// List objects whose labels contain every pair in `selector`.
    async fn list(&self, namespace: &str, selector: &Labels) -> OperatorResult<Vec<K>>;

    /// Create a new object.
    async fn create(&self, namespace: &str, object: &K) -> OperatorResult<K>;

    /// Replace an existing object. The object's resourceVersion guards against lost updates.
    async fn replace(&self, namespace: &str, object: &K) -> OperatorResult<K>;

    /// Delete an object. Deleting an absent object succeeds.
    async fn delete(&self, namespace: &str, name: &str) -> OperatorResult<()>;

    /// Persist the status of an object, leaving its spec untouched.
    async fn replace_status(&self, namespace: &str, object: &K) -> OperatorResult<()>;
}
