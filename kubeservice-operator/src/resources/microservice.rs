//! App → MicroService expansion.

use super::{child_meta, extend_labels};
use crate::crd::{App, MicroService};
use crate::labels::APP_LABEL;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

/// Name of the MicroService generated for an App template.
pub fn microservice_name(app_name: &str, template_name: &str) -> String {
    format!("{}-{}", app_name, template_name)
}

/// Build one MicroService per template, in declaration order.
pub fn build_microservices(app: &App, owner: &OwnerReference) -> Vec<MicroService> {
    let app_name = app.name_any();
    let labels = extend_labels(
        app.metadata.labels.as_ref(),
        &[(APP_LABEL, app_name.as_str())],
    );

    app.spec
        .micro_services
        .iter()
        .map(|template| MicroService {
            metadata: child_meta(
                microservice_name(&app_name, &template.name),
                app.namespace(),
                labels.clone(),
                owner,
            ),
            spec: template.spec.clone(),
            status: None,
        })
        .collect()
}
