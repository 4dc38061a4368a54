//! LoadBalance → Service / Ingress expansion, including canary Ingresses.
//!
//! For a MicroService with a Service declaration the plan holds one primary
//! Service (named after the MicroService, selecting the current version) and
//! one Service per version. With an Ingress declaration it holds the primary
//! Ingress plus one canary Ingress per version that declares a [`Canary`]:
//! a copy of the primary spec whose backends point at that version's Service,
//! annotated for the NGINX ingress controller's canary support.
//!
//! A generated name that is already taken in the plan (a version whose
//! `serviceName` is the MicroService's own name, or a `canaryIngressName`
//! equal to the primary Ingress) is skipped with a warning. That version then
//! gets no dedicated Service and no canary Ingress.

use super::{child_meta, extend_labels};
use crate::crd::{Canary, DeployVersion, MicroService, ServiceLoadBalance};
use crate::labels::{
    Labels, CANARY, CANARY_BY_COOKIE, CANARY_BY_HEADER, CANARY_BY_HEADER_VALUE, CANARY_WEIGHT,
    SERVICE_LABEL, VERSION_LABEL,
};
use k8s_openapi::api::core::v1::{Service, ServiceSpec};
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend, IngressSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};

/// Services and Ingresses a MicroService's LoadBalance expands to.
#[derive(Debug, Clone, Default)]
pub struct LoadBalancePlan {
    /// Primary Service first, then one per version.
    pub services: Vec<Service>,
    /// Primary Ingress first, then one canary Ingress per canaried version.
    pub ingresses: Vec<Ingress>,
}

/// Name of the Service addressing a single version.
pub fn version_service_name(service_name: &str, version: &DeployVersion) -> String {
    version
        .service_name
        .as_deref()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{}", service_name, version.name))
}

/// Name of the canary Ingress of a version.
pub fn canary_ingress_name(service_name: &str, version: &DeployVersion) -> String {
    version
        .canary
        .as_ref()
        .and_then(|c| c.canary_ingress_name.as_deref())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{}-canary", service_name, version.name))
}

/// Canary annotations for a version.
///
/// The weight is clamped to 1..=100. Header and cookie rules are emitted
/// side by side when both are set; the ingress controller decides precedence.
pub fn canary_annotations(canary: &Canary) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::from([
        (CANARY.to_string(), "true".to_string()),
        (
            CANARY_WEIGHT.to_string(),
            canary.weight.clamp(1, 100).to_string(),
        ),
    ]);

    if let Some(header) = non_empty(&canary.header) {
        annotations.insert(CANARY_BY_HEADER.to_string(), header.to_string());
        if let Some(value) = non_empty(&canary.header_value) {
            annotations.insert(CANARY_BY_HEADER_VALUE.to_string(), value.to_string());
        }
    }

    if let Some(cookie) = non_empty(&canary.cookie) {
        annotations.insert(CANARY_BY_COOKIE.to_string(), cookie.to_string());
    }

    annotations
}

/// Build the Services and Ingresses for a MicroService.
///
/// Returns an empty plan when no LoadBalance is declared or there are no
/// versions; ownership GC then removes anything created earlier.
pub fn build_load_balance(service: &MicroService, owner: &OwnerReference) -> LoadBalancePlan {
    let mut plan = LoadBalancePlan::default();

    let Some(lb) = service.spec.load_balance.as_ref() else {
        return plan;
    };
    let Some(current) = service.spec.current_version() else {
        return plan;
    };

    let service_name = service.name_any();
    let namespace = service.namespace();
    let parent_labels = service.metadata.labels.as_ref();
    let base_labels = extend_labels(parent_labels, &[(SERVICE_LABEL, service_name.as_str())]);
    let version_labels = |version: &DeployVersion| -> Labels {
        extend_labels(
            parent_labels,
            &[
                (SERVICE_LABEL, service_name.as_str()),
                (VERSION_LABEL, version.name.as_str()),
            ],
        )
    };

    // Versions whose per-version Service collided with another name.
    let mut skipped = BTreeSet::new();

    if let Some(svc_lb) = lb.service.as_ref() {
        let mut primary = svc_lb.spec.clone();
        if primary.selector.as_ref().map_or(true, |s| s.is_empty()) {
            primary.selector = non_empty_map(current.match_labels());
        }
        plan.services.push(Service {
            metadata: child_meta(
                service_name.clone(),
                namespace.clone(),
                base_labels.clone(),
                owner,
            ),
            spec: Some(primary),
            status: None,
        });

        let mut taken = BTreeSet::from([service_name.clone()]);
        for version in &service.spec.versions {
            let name = version_service_name(&service_name, version);
            if !taken.insert(name.clone()) {
                tracing::warn!(
                    microservice = %service_name,
                    version = %version.name,
                    name = %name,
                    "Service name already taken, skipping per-version Service"
                );
                skipped.insert(version.name.as_str());
                continue;
            }
            plan.services.push(Service {
                metadata: child_meta(
                    name,
                    namespace.clone(),
                    version_labels(version),
                    owner,
                ),
                spec: Some(version_service_spec(&svc_lb.spec, version)),
                status: None,
            });
        }
    }

    if let Some(ingress_lb) = lb.ingress.as_ref() {
        plan.ingresses.push(Ingress {
            metadata: child_meta(
                ingress_lb.name.clone(),
                namespace.clone(),
                base_labels.clone(),
                owner,
            ),
            spec: Some(ingress_lb.spec.clone()),
            status: None,
        });

        let primary_backends = primary_backend_names(&service_name, lb.service.as_ref());
        let mut taken = BTreeSet::from([ingress_lb.name.clone()]);
        for version in &service.spec.versions {
            let Some(canary) = version.canary.as_ref() else {
                continue;
            };
            if skipped.contains(version.name.as_str()) {
                continue;
            }
            let name = canary_ingress_name(&service_name, version);
            if !taken.insert(name.clone()) {
                tracing::warn!(
                    microservice = %service_name,
                    version = %version.name,
                    name = %name,
                    "Ingress name already taken, skipping canary Ingress"
                );
                continue;
            }

            let mut spec = ingress_lb.spec.clone();
            rewrite_backends(
                &mut spec,
                &primary_backends,
                &version_service_name(&service_name, version),
            );

            let mut metadata = child_meta(
                name,
                namespace.clone(),
                version_labels(version),
                owner,
            );
            metadata.annotations = Some(canary_annotations(canary));

            plan.ingresses.push(Ingress {
                metadata,
                spec: Some(spec),
                status: None,
            });
        }
    }

    plan
}

/// Service spec of a per-version Service.
fn version_service_spec(template: &ServiceSpec, version: &DeployVersion) -> ServiceSpec {
    let mut spec = template.clone();
    spec.selector = non_empty_map(version.match_labels());
    // A fixed clusterIP can only be held by one Service; headless stays headless.
    if spec.cluster_ip.as_deref() != Some("None") {
        spec.cluster_ip = None;
        spec.cluster_ips = None;
    }
    spec
}

/// Backend names that refer to the primary Service.
fn primary_backend_names(service_name: &str, svc_lb: Option<&ServiceLoadBalance>) -> Vec<String> {
    let mut names = vec![service_name.to_string()];
    if let Some(declared) = svc_lb.map(|s| s.name.as_str()).filter(|n| !n.is_empty()) {
        if declared != service_name {
            names.push(declared.to_string());
        }
    }
    names
}

/// Point every backend that names a primary Service at `target` instead.
fn rewrite_backends(spec: &mut IngressSpec, primary: &[String], target: &str) {
    let retarget = |backend: &mut IngressBackend| {
        if let Some(svc) = backend.service.as_mut() {
            if primary.iter().any(|name| *name == svc.name) {
                svc.name = target.to_string();
            }
        }
    };

    if let Some(backend) = spec.default_backend.as_mut() {
        retarget(backend);
    }

    for rule in spec.rules.iter_mut().flatten() {
        for path in rule.http.iter_mut().flat_map(|http| http.paths.iter_mut()) {
            retarget(&mut path.backend);
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn non_empty_map(map: BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{IngressLoadBalance, LoadBalance, MicroServiceSpec};
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::ServicePort;
    use k8s_openapi::api::networking::v1::{
        HTTPIngressPath, HTTPIngressRuleValue, IngressRule, IngressServiceBackend,
        ServiceBackendPort,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use kube::api::ObjectMeta;

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "app.o0w0o.cn/v1".into(),
            kind: "MicroService".into(),
            name: "web".into(),
            uid: "uid-web".into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn version(name: &str, canary: Option<Canary>) -> DeployVersion {
        DeployVersion {
            name: name.into(),
            template: DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(BTreeMap::from([
                        ("app".into(), "web".into()),
                        ("version".into(), name.into()),
                    ])),
                    ..Default::default()
                },
                ..Default::default()
            },
            service_name: None,
            canary,
        }
    }

    fn backend(name: &str) -> IngressBackend {
        IngressBackend {
            service: Some(IngressServiceBackend {
                name: name.into(),
                port: Some(ServiceBackendPort {
                    number: Some(80),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        }
    }

    fn ingress_spec(backends: &[&str]) -> IngressSpec {
        IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some("shop.example.com".into()),
                http: Some(HTTPIngressRuleValue {
                    paths: backends
                        .iter()
                        .map(|name| HTTPIngressPath {
                            path: Some(format!("/{}", name)),
                            path_type: "Prefix".into(),
                            backend: backend(name),
                        })
                        .collect(),
                }),
            }]),
            ..Default::default()
        }
    }

    fn microservice(versions: Vec<DeployVersion>, lb: Option<LoadBalance>) -> MicroService {
        MicroService {
            metadata: ObjectMeta {
                name: Some("web".into()),
                namespace: Some("default".into()),
                ..Default::default()
            },
            spec: MicroServiceSpec {
                versions,
                load_balance: lb,
                current_version_name: Some("a".into()),
                cluster_name: None,
            },
            status: None,
        }
    }

    fn full_lb() -> LoadBalance {
        LoadBalance {
            service: Some(ServiceLoadBalance {
                name: "web".into(),
                spec: ServiceSpec {
                    ports: Some(vec![ServicePort {
                        port: 80,
                        ..Default::default()
                    }]),
                    ..Default::default()
                },
            }),
            ingress: Some(IngressLoadBalance {
                name: "web-ingress".into(),
                spec: ingress_spec(&["web", "static"]),
            }),
        }
    }

    fn canary_b() -> Canary {
        Canary {
            weight: 20,
            header: Some("X".into()),
            header_value: Some("always".into()),
            ..Default::default()
        }
    }

    fn selector_of(svc: &Service) -> BTreeMap<String, String> {
        svc.spec
            .as_ref()
            .and_then(|s| s.selector.clone())
            .unwrap_or_default()
    }

    #[test]
    fn canary_version_gets_services_and_canary_ingress() {
        let ms = microservice(
            vec![version("a", None), version("b", Some(canary_b()))],
            Some(full_lb()),
        );
        let plan = build_load_balance(&ms, &owner());

        let svc_names: Vec<_> = plan.services.iter().map(|s| s.name_any()).collect();
        assert_eq!(svc_names, vec!["web", "web-a", "web-b"]);
        assert_eq!(selector_of(&plan.services[0]).get("version").unwrap(), "a");
        assert_eq!(selector_of(&plan.services[2]).get("version").unwrap(), "b");

        let ing_names: Vec<_> = plan.ingresses.iter().map(|i| i.name_any()).collect();
        assert_eq!(ing_names, vec!["web-ingress", "web-b-canary"]);

        let canary = &plan.ingresses[1];
        let annotations = canary.annotations();
        assert_eq!(annotations.get(CANARY).unwrap(), "true");
        assert_eq!(annotations.get(CANARY_WEIGHT).unwrap(), "20");
        assert_eq!(annotations.get(CANARY_BY_HEADER).unwrap(), "X");
        assert_eq!(annotations.get(CANARY_BY_HEADER_VALUE).unwrap(), "always");
        assert!(!annotations.contains_key(CANARY_BY_COOKIE));
        assert_eq!(canary.labels().get(VERSION_LABEL).unwrap(), "b");

        let paths = &canary.spec.as_ref().unwrap().rules.as_ref().unwrap()[0]
            .http
            .as_ref()
            .unwrap()
            .paths;
        let targets: Vec<_> = paths
            .iter()
            .map(|p| p.backend.service.as_ref().unwrap().name.as_str())
            .collect();
        assert_eq!(targets, vec!["web-b", "static"]);

        // The primary Ingress keeps its declared backends.
        let primary = plan.ingresses[0].spec.as_ref().unwrap().rules.as_ref().unwrap()[0]
            .http
            .as_ref()
            .unwrap()
            .paths[0]
            .backend
            .service
            .as_ref()
            .unwrap()
            .name
            .clone();
        assert_eq!(primary, "web");
        assert!(plan.ingresses[0].metadata.annotations.is_none());
    }

    #[test]
    fn colliding_names_are_skipped() {
        let mut b = version("b", Some(canary_b()));
        b.service_name = Some("web".into());
        let mut c = version("c", Some(Canary {
            weight: 5,
            canary_ingress_name: Some("web-ingress".into()),
            ..Default::default()
        }));
        c.service_name = Some("web-a".into());
        let d = version("d", Some(Canary {
            weight: 5,
            canary_ingress_name: Some("web-ingress".into()),
            ..Default::default()
        }));
        let ms = microservice(vec![version("a", None), b, c, d], Some(full_lb()));

        let plan = build_load_balance(&ms, &owner());

        let svc_names: Vec<_> = plan.services.iter().map(|s| s.name_any()).collect();
        assert_eq!(svc_names, vec!["web", "web-a", "web-d"]);
        assert_eq!(selector_of(&plan.services[0]).get("version").unwrap(), "a");

        let ing_names: Vec<_> = plan.ingresses.iter().map(|i| i.name_any()).collect();
        assert_eq!(ing_names, vec!["web-ingress"]);
        assert!(plan.ingresses[0].metadata.annotations.is_none());
    }

    #[test]
    fn header_and_cookie_are_both_emitted() {
        let canary = Canary {
            weight: 150,
            header: Some("X-Canary".into()),
            cookie: Some("beta".into()),
            ..Default::default()
        };
        let annotations = canary_annotations(&canary);
        assert_eq!(annotations.get(CANARY_WEIGHT).unwrap(), "100");
        assert_eq!(annotations.get(CANARY_BY_HEADER).unwrap(), "X-Canary");
        assert!(!annotations.contains_key(CANARY_BY_HEADER_VALUE));
        assert_eq!(annotations.get(CANARY_BY_COOKIE).unwrap(), "beta");
    }

    #[test]
    fn declared_selector_is_kept_on_primary_service() {
        let mut lb = full_lb();
        lb.ingress = None;
        if let Some(svc) = lb.service.as_mut() {
            svc.spec.selector = Some(BTreeMap::from([("pinned".into(), "yes".into())]));
        }
        let ms = microservice(vec![version("a", None)], Some(lb));
        let plan = build_load_balance(&ms, &owner());

        assert_eq!(selector_of(&plan.services[0]).get("pinned").unwrap(), "yes");
        assert_eq!(selector_of(&plan.services[1]).get("version").unwrap(), "a");
        assert!(plan.ingresses.is_empty());
    }

    #[test]
    fn custom_names_are_honoured() {
        let mut b = version(
            "b",
            Some(Canary {
                weight: 5,
                canary_ingress_name: Some("web-beta".into()),
                ..Default::default()
            }),
        );
        b.service_name = Some("web-beta-svc".into());
        let ms = microservice(vec![version("a", None), b], Some(full_lb()));
        let plan = build_load_balance(&ms, &owner());

        assert_eq!(plan.services[2].name_any(), "web-beta-svc");
        assert_eq!(plan.ingresses[1].name_any(), "web-beta");
        let target = plan.ingresses[1].spec.as_ref().unwrap().rules.as_ref().unwrap()[0]
            .http
            .as_ref()
            .unwrap()
            .paths[0]
            .backend
            .service
            .as_ref()
            .unwrap()
            .name
            .clone();
        assert_eq!(target, "web-beta-svc");
    }

    #[test]
    fn unmatched_current_version_falls_back_to_first() {
        let mut ms = microservice(vec![version("a", None), version("b", None)], Some(full_lb()));
        ms.spec.current_version_name = Some("zzz".into());
        let plan = build_load_balance(&ms, &owner());
        assert_eq!(selector_of(&plan.services[0]).get("version").unwrap(), "a");
    }

    #[test]
    fn nothing_without_load_balance_or_versions() {
        let no_lb = microservice(vec![version("a", None)], None);
        let plan = build_load_balance(&no_lb, &owner());
        assert!(plan.services.is_empty() && plan.ingresses.is_empty());

        let no_versions = microservice(vec![], Some(full_lb()));
        let plan = build_load_balance(&no_versions, &owner());
        assert!(plan.services.is_empty() && plan.ingresses.is_empty());
    }

    #[test]
    fn per_version_services_drop_fixed_cluster_ip() {
        let template = ServiceSpec {
            cluster_ip: Some("10.0.0.10".into()),
            ..Default::default()
        };
        let spec = version_service_spec(&template, &version("a", None));
        assert!(spec.cluster_ip.is_none());

        let headless = ServiceSpec {
            cluster_ip: Some("None".into()),
            ..Default::default()
        };
        let spec = version_service_spec(&headless, &version("a", None));
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
    }
}
