//! Common test utilities for integration tests.

#![allow(dead_code)]

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kubeservice_operator::controller::{
    AppController, ControllerContext, MicroServiceController, ReconcileAction, Stores,
};
use kubeservice_operator::crd::{
    App, AppSpec, Canary, DeployVersion, IngressLoadBalance, LoadBalance, MicroService,
    MicroServiceSpec, MicroServiceTemplate, ServiceLoadBalance,
};
use kubeservice_operator::store::MemoryStore;
use kubeservice_operator::{OperatorConfig, OperatorResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Namespace every fixture lives in.
pub const NS: &str = "retail";

/// Controllers wired to in-memory stores.
pub struct Harness {
    pub apps: Arc<MemoryStore<App>>,
    pub microservices: Arc<MemoryStore<MicroService>>,
    pub deployments: Arc<MemoryStore<Deployment>>,
    pub services: Arc<MemoryStore<Service>>,
    pub ingresses: Arc<MemoryStore<Ingress>>,
    pub ctx: Arc<ControllerContext>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OperatorConfig::default())
    }

    pub fn with_config(config: OperatorConfig) -> Self {
        let apps = Arc::new(MemoryStore::<App>::new());
        let microservices = Arc::new(MemoryStore::<MicroService>::new());
        let deployments = Arc::new(MemoryStore::<Deployment>::new());
        let services = Arc::new(MemoryStore::<Service>::new());
        let ingresses = Arc::new(MemoryStore::<Ingress>::new());

        let stores = Stores {
            apps: apps.clone(),
            microservices: microservices.clone(),
            deployments: deployments.clone(),
            services: services.clone(),
            ingresses: ingresses.clone(),
        };
        let ctx = Arc::new(ControllerContext::new(stores, config).expect("context"));

        Self {
            apps,
            microservices,
            deployments,
            services,
            ingresses,
            ctx,
        }
    }

    /// Store a MicroService and return it as stored (with uid).
    pub fn add_microservice(&self, service: MicroService) -> MicroService {
        self.microservices.insert(service)
    }

    /// Store an App and return it as stored (with uid).
    pub fn add_app(&self, app: App) -> App {
        self.apps.insert(app)
    }

    /// Edit a stored MicroService in place, as a user would.
    pub fn edit_microservice(&self, name: &str, edit: impl FnOnce(&mut MicroService)) {
        let mut service = self.microservices.object(NS, name).expect("microservice exists");
        edit(&mut service);
        self.microservices.insert(service);
    }

    /// Edit a stored App in place, as a user would.
    pub fn edit_app(&self, name: &str, edit: impl FnOnce(&mut App)) {
        let mut app = self.apps.object(NS, name).expect("app exists");
        edit(&mut app);
        self.apps.insert(app);
    }

    /// Run one MicroService pass against the latest stored object.
    pub async fn reconcile_microservice(&self, name: &str) -> OperatorResult<ReconcileAction> {
        let service = self.microservices.object(NS, name).expect("microservice exists");
        MicroServiceController::new(self.ctx.clone())
            .reconcile(Arc::new(service))
            .await
    }

    /// Run one App pass against the latest stored object.
    pub async fn reconcile_app(&self, name: &str) -> OperatorResult<ReconcileAction> {
        let app = self.apps.object(NS, name).expect("app exists");
        AppController::new(self.ctx.clone())
            .reconcile(Arc::new(app))
            .await
    }

    /// Creates, updates and deletes across every store.
    pub fn mutations(&self) -> usize {
        self.apps.stats().mutations()
            + self.microservices.stats().mutations()
            + self.deployments.stats().mutations()
            + self.services.stats().mutations()
            + self.ingresses.stats().mutations()
    }

    /// Status writes across every store.
    pub fn status_writes(&self) -> usize {
        self.apps.stats().status_updates + self.microservices.stats().status_updates
    }

    pub fn reset_stats(&self) {
        self.apps.reset_stats();
        self.microservices.reset_stats();
        self.deployments.reset_stats();
        self.services.reset_stats();
        self.ingresses.reset_stats();
    }
}

/// A version running `image:<name>` with pods labelled `app=web, version=<name>`.
pub fn version(name: &str) -> DeployVersion {
    let labels = BTreeMap::from([
        ("app".to_string(), "web".to_string()),
        ("version".to_string(), name.to_string()),
    ]);

    DeployVersion {
        name: name.to_string(),
        template: DeploymentSpec {
            replicas: Some(2),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "web".to_string(),
                        image: Some(format!("registry.local/web:{}", name)),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        },
        service_name: None,
        canary: None,
    }
}

/// A version with a canary rule.
pub fn canary_version(name: &str, weight: i32, header: Option<&str>) -> DeployVersion {
    DeployVersion {
        canary: Some(Canary {
            weight,
            header: header.map(str::to_string),
            ..Default::default()
        }),
        ..version(name)
    }
}

/// Service plus Ingress routing `shop.example.com/` to the MicroService.
pub fn load_balance(service_name: &str) -> LoadBalance {
    LoadBalance {
        service: Some(ServiceLoadBalance {
            name: service_name.to_string(),
            spec: ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some("http".to_string()),
                    port: 80,
                    ..Default::default()
                }]),
                ..Default::default()
            },
        }),
        ingress: Some(IngressLoadBalance {
            name: format!("{}-ingress", service_name),
            spec: IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some("shop.example.com".to_string()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: service_name.to_string(),
                                    port: Some(ServiceBackendPort {
                                        number: Some(80),
                                        ..Default::default()
                                    }),
                                }),
                                ..Default::default()
                            },
                        }],
                    }),
                }]),
                ..Default::default()
            },
        }),
    }
}

pub fn microservice_spec(
    versions: Vec<DeployVersion>,
    lb: Option<LoadBalance>,
) -> MicroServiceSpec {
    MicroServiceSpec {
        current_version_name: versions.first().map(|v| v.name.clone()),
        versions,
        load_balance: lb,
        cluster_name: None,
    }
}

/// A MicroService in [`NS`].
pub fn microservice(name: &str, spec: MicroServiceSpec) -> MicroService {
    MicroService {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NS.to_string()),
            ..Default::default()
        },
        spec,
        status: None,
    }
}

/// An App in [`NS`] with one template per `(name, spec)` pair.
pub fn app(name: &str, templates: Vec<(&str, MicroServiceSpec)>) -> App {
    App {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NS.to_string()),
            ..Default::default()
        },
        spec: AppSpec {
            micro_services: templates
                .into_iter()
                .map(|(name, spec)| MicroServiceTemplate {
                    name: name.to_string(),
                    spec,
                })
                .collect(),
        },
        status: None,
    }
}

/// Backend Service names of every path of an Ingress.
pub fn backend_names(ingress: &Ingress) -> Vec<String> {
    ingress
        .spec
        .iter()
        .flat_map(|spec| spec.rules.iter().flatten())
        .flat_map(|rule| rule.http.iter().flat_map(|http| http.paths.iter()))
        .filter_map(|path| path.backend.service.as_ref().map(|s| s.name.clone()))
        .collect()
}
