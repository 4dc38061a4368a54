//! MicroService controller.
//!
//! Reconciles MicroService resources into Deployments (one per version),
//! Services and Ingresses (from the LoadBalance, canaries included), removes
//! children the declaration no longer implies and rolls the Deployment count
//! up into the MicroService status.

use super::status::{self, Tally};
use super::{
    ControllerContext, ReconcileAction, apply, error_requeue, namespace_of, owner_reference,
};
use crate::crd::{MicroService, MicroServiceStatus};
use crate::error::{OperatorError, OperatorResult};
use crate::labels;
use crate::resources;
use kube::ResourceExt;
use std::sync::Arc;

/// Controller for MicroService resources.
#[derive(Clone)]
pub struct MicroServiceController {
    ctx: Arc<ControllerContext>,
}

impl MicroServiceController {
    /// Create a new MicroService controller.
    pub fn new(ctx: Arc<ControllerContext>) -> Self {
        Self { ctx }
    }

    /// Reconcile a MicroService resource.
    ///
    /// 1. Creates or updates one Deployment per version, if the MicroService
    ///    targets this cluster
    /// 2. Creates or updates the LoadBalance Services and Ingresses
    /// 3. Deletes labelled children no longer declared
    /// 4. Updates the MicroService status
    pub async fn reconcile(&self, service: Arc<MicroService>) -> OperatorResult<ReconcileAction> {
        let name = service.name_any();
        let namespace = namespace_of(service.as_ref())?;

        if service.metadata.deletion_timestamp.is_some() {
            tracing::debug!(name = %name, namespace = %namespace, "MicroService is being deleted");
            return Ok(ReconcileAction::Done);
        }

        tracing::info!(
            name = %name,
            namespace = %namespace,
            versions = service.spec.versions.len(),
            "Reconciling MicroService"
        );

        if service.spec.has_dangling_current_version() {
            tracing::warn!(
                name = %name,
                current = service.spec.current_version_name.as_deref().unwrap_or_default(),
                "currentVersionName matches no version, using the first version"
            );
        }

        let owner = owner_reference(service.as_ref())?;
        let stores = &self.ctx.stores;
        let selector = labels::service_selector(&name);

        let in_scope = self.ctx.scope.admits(service.spec.cluster_name.as_deref());
        let deployments = if in_scope {
            resources::build_deployments(&service, &owner)
        } else {
            tracing::info!(
                name = %name,
                target = service.spec.cluster_name.as_deref().unwrap_or_default(),
                cluster = self.ctx.scope.cluster_name().unwrap_or_default(),
                "MicroService targets another cluster, not materializing workloads"
            );
            Vec::new()
        };

        let report =
            apply::apply_all(stores.deployments.as_ref(), &namespace, &owner, &deployments).await?;
        let removed = apply::collect_orphans(
            stores.deployments.as_ref(),
            &namespace,
            &selector,
            &report.stay_set(),
        )
        .await?;
        log_changes(&name, "Deployments", &report, &removed);

        let plan = resources::build_load_balance(&service, &owner);

        let report =
            apply::apply_all(stores.services.as_ref(), &namespace, &owner, &plan.services).await?;
        let removed = apply::collect_orphans(
            stores.services.as_ref(),
            &namespace,
            &selector,
            &report.stay_set(),
        )
        .await?;
        log_changes(&name, "Services", &report, &removed);

        let report =
            apply::apply_all(stores.ingresses.as_ref(), &namespace, &owner, &plan.ingresses).await?;
        let removed = apply::collect_orphans(
            stores.ingresses.as_ref(),
            &namespace,
            &selector,
            &report.stay_set(),
        )
        .await?;
        log_changes(&name, "Ingresses", &report, &removed);

        if in_scope {
            self.sync_status(&service, &namespace, deployments.len())
                .await?;
        }

        Ok(ReconcileAction::Requeue(self.ctx.config.resync_interval()))
    }

    /// Recount Deployments and record the result.
    async fn sync_status(
        &self,
        service: &MicroService,
        namespace: &str,
        declared: usize,
    ) -> OperatorResult<()> {
        let found = self
            .ctx
            .stores
            .deployments
            .list(namespace, &labels::service_selector(&service.name_any()))
            .await?
            .len();

        let current = Tally::new(found, declared);
        let status = service.status.clone().unwrap_or_default();
        let previous = Tally {
            available: status.available_versions,
            total: status.total_versions,
        };

        let Some(conditions) = status::next_conditions(
            &status.conditions,
            previous,
            current,
            "deployments",
            self.ctx.config.condition_history_limit(),
            &chrono::Utc::now().to_rfc3339(),
        ) else {
            return Ok(());
        };

        tracing::debug!(
            name = %service.name_any(),
            available = current.available,
            total = current.total,
            "Updating MicroService status"
        );

        let mut updated = service.clone();
        updated.status = Some(MicroServiceStatus {
            conditions,
            available_versions: current.available,
            total_versions: current.total,
        });
        self.ctx
            .stores
            .microservices
            .replace_status(namespace, &updated)
            .await
    }
}

fn log_changes(name: &str, kind: &str, report: &apply::ApplyReport, removed: &[String]) {
    if report.changes() > 0 || !removed.is_empty() {
        tracing::info!(
            name = %name,
            kind = %kind,
            created = report.created.len(),
            updated = report.updated.len(),
            deleted = removed.len(),
            "Children reconciled"
        );
    }
}

/// Handle errors during reconciliation.
pub fn error_policy(
    service: Arc<MicroService>,
    error: &OperatorError,
    _ctx: Arc<ControllerContext>,
) -> kube::runtime::controller::Action {
    tracing::error!(
        microservice = %service.name_any(),
        error = %error,
        "MicroService reconciliation error"
    );
    kube::runtime::controller::Action::requeue(error_requeue(error))
}
