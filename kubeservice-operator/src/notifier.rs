//! Manager-sync notifier.
//!
//! In a multi-cluster setup a central manager keeps a copy of every App.
//! Apps authored directly against this cluster are pushed to it so the
//! manager learns about them; Apps the manager itself handed over are not
//! echoed back.

use crate::config::OperatorConfig;
use crate::crd::{App, FromManager};
use crate::error::{OperatorError, OperatorResult};
use kube::ResourceExt;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// Body of a manager push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagerPayload {
    /// Cluster the App lives in.
    pub cluster_name: String,
    /// The App, serialized as JSON.
    pub yml: String,
}

#[derive(Clone)]
struct Target {
    url: String,
    cluster_name: String,
    http: HttpClient,
}

/// Pushes locally authored Apps to the central manager.
#[derive(Clone, Default)]
pub struct ManagerNotifier {
    target: Option<Target>,
}

impl std::fmt::Debug for ManagerNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerNotifier")
            .field("url", &self.target.as_ref().map(|t| t.url.as_str()))
            .finish()
    }
}

impl ManagerNotifier {
    /// A notifier that never sends anything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Build a notifier from configuration. Disabled when no manager URL is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &OperatorConfig) -> OperatorResult<Self> {
        let Some(base) = config.manager_url() else {
            return Ok(Self::disabled());
        };

        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(OperatorError::InvalidConfig(format!(
                "manager URL must start with http:// or https://, got: {}",
                base
            )));
        }

        let http = HttpClient::builder()
            .timeout(config.manager_timeout())
            .build()?;

        Ok(Self {
            target: Some(Target {
                url: format!("{}/apps", base.trim_end_matches('/')),
                cluster_name: config.cluster_name().unwrap_or_default().to_string(),
                http,
            }),
        })
    }

    /// Whether a manager is configured.
    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Whether `app` should be pushed: only Apps the manager did not hand over.
    pub fn should_notify(app: &App) -> bool {
        app.status
            .as_ref()
            .map(|s| s.from_manager)
            .unwrap_or_default()
            == FromManager::None
    }

    /// Send `app` to the manager and wait for the answer.
    ///
    /// Does nothing when disabled.
    pub async fn push(&self, app: &App) -> OperatorResult<()> {
        let Some(target) = self.target.as_ref() else {
            return Ok(());
        };

        let payload = ManagerPayload {
            cluster_name: target.cluster_name.clone(),
            yml: serde_json::to_string(app)?,
        };

        let response = target.http.post(&target.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OperatorError::HttpError(format!(
                "manager returned status {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(())
    }

    /// Push `app` in the background if it is locally authored.
    ///
    /// Failures are logged and otherwise ignored. Returns the task handle
    /// when a push was started.
    pub fn notify(&self, app: &App) -> Option<JoinHandle<()>> {
        if !self.is_enabled() || !Self::should_notify(app) {
            return None;
        }

        let notifier = self.clone();
        let app = app.clone();
        Some(tokio::spawn(async move {
            let name = app.name_any();
            match notifier.push(&app).await {
                Ok(()) => tracing::debug!(app = %name, "Pushed App to manager"),
                Err(e) => tracing::warn!(app = %name, error = %e, "Failed to push App to manager"),
            }
        }))
    }
}
