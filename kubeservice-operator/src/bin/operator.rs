//! KubeService Kubernetes Operator binary.
//!
//! This binary runs the KubeService operator, which manages App and
//! MicroService custom resources in a Kubernetes cluster.

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::Controller;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, CustomResourceExt};
use kubeservice_operator::OperatorConfig;
use kubeservice_operator::controller::{
    AppController, ControllerContext, MicroServiceController, app_error_policy,
    microservice_error_policy,
};
use kubeservice_operator::crd::{App, MicroService};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    // Check for CRD generation mode
    if std::env::args().any(|arg| arg == "--generate-crds") {
        generate_crds()?;
        return Ok(());
    }

    tracing::info!("Starting KubeService operator");

    let config = OperatorConfig::from_env();
    tracing::info!(
        cluster = config.cluster_name().unwrap_or("<none>"),
        manager = config.manager_url().unwrap_or("<disabled>"),
        resync_secs = config.resync_interval().as_secs(),
        "Loaded configuration"
    );

    // Connect to Kubernetes
    let client = Client::try_default().await?;
    tracing::info!("Connected to Kubernetes cluster");

    // Create shared controller context
    let ctx = Arc::new(ControllerContext::from_client(client.clone(), config)?);

    // Start controllers concurrently
    let app_controller = run_app_controller(client.clone(), ctx.clone());
    let microservice_controller = run_microservice_controller(client, ctx);

    // Wait for both controllers (they run until a shutdown signal)
    tokio::select! {
        result = app_controller => {
            tracing::info!("App controller exited: {:?}", result);
            result?;
        }
        result = microservice_controller => {
            tracing::info!("MicroService controller exited: {:?}", result);
            result?;
        }
    }

    Ok(())
}

/// Initialise tracing. `KUBESERVICE_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("kubeservice_operator=info".parse()?)
        .add_directive("kube=info".parse()?);

    let json = std::env::var("KUBESERVICE_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

/// Run the App controller.
async fn run_app_controller(client: Client, ctx: Arc<ControllerContext>) -> anyhow::Result<()> {
    tracing::info!("Starting App controller");

    let apps: Api<App> = Api::all(client.clone());
    let microservices: Api<MicroService> = Api::all(client);
    let controller = AppController::new(ctx.clone());

    Controller::new(apps, WatcherConfig::default())
        .owns(microservices, WatcherConfig::default())
        .shutdown_on_signal()
        .run(
            move |app, _ctx| {
                let controller = controller.clone();
                async move { controller.reconcile(app).await.map(Action::from) }
            },
            app_error_policy,
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(app = %obj.name, ?action, "Reconciled App");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "App controller stream error");
                }
            }
        })
        .await;

    Ok(())
}

/// Run the MicroService controller.
async fn run_microservice_controller(
    client: Client,
    ctx: Arc<ControllerContext>,
) -> anyhow::Result<()> {
    tracing::info!("Starting MicroService controller");

    let microservices: Api<MicroService> = Api::all(client.clone());
    let controller = MicroServiceController::new(ctx.clone());

    Controller::new(microservices, WatcherConfig::default())
        .owns(Api::<Deployment>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<Service>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<Ingress>::all(client), WatcherConfig::default())
        .shutdown_on_signal()
        .run(
            move |service, _ctx| {
                let controller = controller.clone();
                async move { controller.reconcile(service).await.map(Action::from) }
            },
            microservice_error_policy,
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(microservice = %obj.name, ?action, "Reconciled MicroService");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "MicroService controller stream error");
                }
            }
        })
        .await;

    Ok(())
}

/// Generate CRD YAML files.
fn generate_crds() -> anyhow::Result<()> {
    println!("---");
    println!("{}", serde_yaml::to_string(&App::crd())?);
    println!("---");
    println!("{}", serde_yaml::to_string(&MicroService::crd())?);
    Ok(())
}
