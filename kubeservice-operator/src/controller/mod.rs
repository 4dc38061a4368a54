//! Kubernetes controllers for KubeService resources.
//!
//! - [`AppController`]: expands Apps into MicroServices
//! - [`MicroServiceController`]: expands MicroServices into Deployments,
//!   Services and Ingresses
//!
//! Both controllers go through the [`Stores`] held in a shared
//! [`ControllerContext`], so a pass can run against the API server or
//! against in-memory stores alike.
//!
//! # Usage with kube-runtime
//!
//! ```ignore
//! use kubeservice_operator::controller::{AppController, app_error_policy};
//!
//! Controller::new(apps, watcher_config)
//!     .run(|app, ctx| async move {
//!         AppController::new(ctx).reconcile(app).await.map(Action::from)
//!     }, app_error_policy, context)
//!     .for_each(|_| futures::future::ready(()))
//!     .await;
//! ```

mod app;
pub mod apply;
pub mod managed;
mod microservice;
pub mod scope;
pub mod status;

pub use app::{AppController, error_policy as app_error_policy};
pub use apply::{ApplyOutcome, ApplyReport};
pub use managed::ManagedResource;
pub use microservice::{MicroServiceController, error_policy as microservice_error_policy};
pub use scope::ClusterScope;

use crate::config::OperatorConfig;
use crate::crd::{App, MicroService};
use crate::error::{OperatorError, OperatorResult};
use crate::notifier::ManagerNotifier;
use crate::store::{KubeStore, ResourceStore, StoredResource};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use std::sync::Arc;

/// One store per kind the controllers read or write.
#[derive(Clone)]
pub struct Stores {
    /// Apps.
    pub apps: Arc<dyn ResourceStore<App>>,
    /// MicroServices.
    pub microservices: Arc<dyn ResourceStore<MicroService>>,
    /// Deployments.
    pub deployments: Arc<dyn ResourceStore<Deployment>>,
    /// Services.
    pub services: Arc<dyn ResourceStore<Service>>,
    /// Ingresses.
    pub ingresses: Arc<dyn ResourceStore<Ingress>>,
}

impl Stores {
    /// Stores backed by the Kubernetes API.
    pub fn kube(client: kube::Client) -> Self {
        Self {
            apps: Arc::new(KubeStore::<App>::new(client.clone())),
            microservices: Arc::new(KubeStore::<MicroService>::new(client.clone())),
            deployments: Arc::new(KubeStore::<Deployment>::new(client.clone())),
            services: Arc::new(KubeStore::<Service>::new(client.clone())),
            ingresses: Arc::new(KubeStore::<Ingress>::new(client)),
        }
    }
}

/// Shared context for controllers.
pub struct ControllerContext {
    /// Resource stores.
    pub stores: Stores,
    /// Operator configuration.
    pub config: OperatorConfig,
    /// Which MicroServices get workloads in this cluster.
    pub scope: ClusterScope,
    /// Push of locally authored Apps to the central manager.
    pub notifier: ManagerNotifier,
}

impl ControllerContext {
    /// Create a controller context over the given stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the manager notifier cannot be built from `config`.
    pub fn new(stores: Stores, config: OperatorConfig) -> OperatorResult<Self> {
        Ok(Self {
            stores,
            scope: ClusterScope::from_config(&config),
            notifier: ManagerNotifier::from_config(&config)?,
            config,
        })
    }

    /// Create a controller context backed by the Kubernetes API.
    pub fn from_client(client: kube::Client, config: OperatorConfig) -> OperatorResult<Self> {
        Self::new(Stores::kube(client), config)
    }
}

/// Result type for reconciliation actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Requeue after the specified duration.
    Requeue(std::time::Duration),
    /// Don't requeue (reconciliation complete).
    Done,
}

impl From<ReconcileAction> for kube::runtime::controller::Action {
    fn from(action: ReconcileAction) -> Self {
        match action {
            ReconcileAction::Requeue(duration) => Self::requeue(duration),
            ReconcileAction::Done => Self::await_change(),
        }
    }
}

/// Owner reference pointing at `parent`, marked as the controller.
fn owner_reference<K: StoredResource>(parent: &K) -> OperatorResult<OwnerReference> {
    parent.controller_owner_ref(&()).ok_or_else(|| {
        OperatorError::InvalidConfig(format!(
            "{} {} has no uid yet",
            K::kind(&()),
            parent.name_any()
        ))
    })
}

/// Namespace of a namespaced parent.
fn namespace_of<K: StoredResource>(parent: &K) -> OperatorResult<String> {
    parent.namespace().ok_or_else(|| {
        OperatorError::InvalidConfig(format!("{} must be namespaced", K::kind(&())))
    })
}

/// Requeue delay for a failed pass.
fn error_requeue(error: &OperatorError) -> std::time::Duration {
    if error.is_transient() {
        std::time::Duration::from_secs(30)
    } else {
        std::time::Duration::from_secs(300)
    }
}
