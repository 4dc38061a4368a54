//! Kubernetes API backed store.

use super::{ResourceStore, StoredResource};
use crate::error::OperatorResult;
use crate::labels::{selector_string, Labels};
use async_trait::async_trait;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use std::marker::PhantomData;

/// [`ResourceStore`] over `kube::Api<K>`.
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for KubeStore<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: StoredResource> KubeStore<K> {
    /// Create a store using the given client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl<K: StoredResource> ResourceStore<K> for KubeStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> OperatorResult<Option<K>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn list(&self, namespace: &str, selector: &Labels) -> OperatorResult<Vec<K>> {
        let params = ListParams::default().labels(&selector_string(selector));
        Ok(self.api(namespace).list(&params).await?.items)
    }

    async fn create(&self, namespace: &str, object: &K) -> OperatorResult<K> {
        Ok(self
            .api(namespace)
            .create(&PostParams::default(), object)
            .await?)
    }

    async fn replace(&self, namespace: &str, object: &K) -> OperatorResult<K> {
        let name = object.name_any();
        Ok(self
            .api(namespace)
            .replace(&name, &PostParams::default(), object)
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> OperatorResult<()> {
        match self
            .api(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_status(&self, namespace: &str, object: &K) -> OperatorResult<()> {
        let name = object.name_any();
        let value = serde_json::to_value(object)?;
        let patch = serde_json::json!({
            "status": value.get("status").cloned().unwrap_or(serde_json::Value::Null)
        });

        self.api(namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
