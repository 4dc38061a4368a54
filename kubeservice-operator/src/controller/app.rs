//! App controller.
//!
//! Reconciles App resources into one MicroService per template, removes
//! MicroServices whose template is gone and rolls their count up into the
//! App status.

use super::status::{self, Classification, Tally};
use super::{
    ControllerContext, ReconcileAction, apply, error_requeue, namespace_of, owner_reference,
};
use crate::crd::{App, AppStatus, FromManager};
use crate::error::{OperatorError, OperatorResult};
use crate::labels;
use crate::resources;
use kube::ResourceExt;
use std::sync::Arc;

/// Controller for App resources.
#[derive(Clone)]
pub struct AppController {
    ctx: Arc<ControllerContext>,
}

impl AppController {
    /// Create a new App controller.
    pub fn new(ctx: Arc<ControllerContext>) -> Self {
        Self { ctx }
    }

    /// Reconcile an App resource.
    ///
    /// 1. Creates or updates one MicroService per template
    /// 2. Deletes labelled MicroServices no template asks for
    /// 3. Pushes locally authored Apps to the central manager
    /// 4. Updates the App status
    pub async fn reconcile(&self, app: Arc<App>) -> OperatorResult<ReconcileAction> {
        let name = app.name_any();
        let namespace = namespace_of(app.as_ref())?;

        if app.metadata.deletion_timestamp.is_some() {
            tracing::debug!(name = %name, namespace = %namespace, "App is being deleted");
            return Ok(ReconcileAction::Done);
        }

        tracing::info!(
            name = %name,
            namespace = %namespace,
            templates = app.spec.micro_services.len(),
            "Reconciling App"
        );

        let owner = owner_reference(app.as_ref())?;
        let stores = &self.ctx.stores;
        let desired = resources::build_microservices(&app, &owner);

        let report =
            apply::apply_all(stores.microservices.as_ref(), &namespace, &owner, &desired).await?;
        let removed = apply::collect_orphans(
            stores.microservices.as_ref(),
            &namespace,
            &labels::app_selector(&name),
            &report.stay_set(),
        )
        .await?;

        if report.changes() > 0 || !removed.is_empty() {
            tracing::info!(
                name = %name,
                created = report.created.len(),
                updated = report.updated.len(),
                deleted = removed.len(),
                "MicroServices reconciled"
            );
        }

        self.ctx.notifier.notify(&app);
        self.sync_status(&app, &namespace, desired.len()).await?;

        Ok(ReconcileAction::Requeue(self.ctx.config.resync_interval()))
    }

    /// Recount MicroServices and record the result.
    async fn sync_status(&self, app: &App, namespace: &str, declared: usize) -> OperatorResult<()> {
        let found = self
            .ctx
            .stores
            .microservices
            .list(namespace, &labels::app_selector(&app.name_any()))
            .await?
            .len();

        let current = Tally::new(found, declared);
        let status = app.status.clone().unwrap_or_default();
        let previous = Tally {
            available: status.available_micro_services,
            total: status.total_micro_services,
        };

        let conditions = status::next_conditions(
            &status.conditions,
            previous,
            current,
            "microservices",
            self.ctx.config.condition_history_limit(),
            &chrono::Utc::now().to_rfc3339(),
        );

        // Once the App is available the manager's handoff is complete.
        let available = current.classify() == Classification::Available;
        let release_handoff = available && status.from_manager != FromManager::None;

        if conditions.is_none() && !release_handoff {
            return Ok(());
        }

        let next = AppStatus {
            conditions: conditions.unwrap_or(status.conditions),
            available_micro_services: current.available,
            total_micro_services: current.total,
            from_manager: if available {
                FromManager::None
            } else {
                status.from_manager
            },
        };

        tracing::debug!(
            name = %app.name_any(),
            available = current.available,
            total = current.total,
            "Updating App status"
        );

        let mut updated = app.clone();
        updated.status = Some(next);
        self.ctx
            .stores
            .apps
            .replace_status(namespace, &updated)
            .await
    }
}

/// Handle errors during reconciliation.
pub fn error_policy(
    app: Arc<App>,
    error: &OperatorError,
    _ctx: Arc<ControllerContext>,
) -> kube::runtime::controller::Action {
    tracing::error!(app = %app.name_any(), error = %error, "App reconciliation error");
    kube::runtime::controller::Action::requeue(error_requeue(error))
}
