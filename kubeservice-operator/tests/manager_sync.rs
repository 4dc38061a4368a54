//! Integration tests for the manager-sync notifier.
//!
//! These tests use wiremock to stand in for the central manager.

mod common;

use common::{Harness, app, microservice_spec, version};
use kubeservice_operator::OperatorConfig;
use kubeservice_operator::OperatorError;
use kubeservice_operator::crd::{App, AppStatus, FromManager};
use kubeservice_operator::notifier::{ManagerNotifier, ManagerPayload};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> OperatorConfig {
    OperatorConfig::default()
        .with_cluster_name("west")
        .with_manager_url(server.uri())
        .with_manager_timeout(Duration::from_secs(2))
}

fn shop() -> App {
    app("shop", vec![("web", microservice_spec(vec![version("v1")], None))])
}

async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<wiremock::Request> {
    for _ in 0..50 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests.len() >= count {
            return requests;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    server.received_requests().await.unwrap_or_default()
}

#[tokio::test]
async fn local_app_is_pushed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/apps"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = ManagerNotifier::from_config(&config(&mock_server)).unwrap();
    notifier
        .notify(&shop())
        .expect("push started")
        .await
        .unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    let payload: ManagerPayload = requests[0].body_json().unwrap();
    assert_eq!(payload.cluster_name, "west");

    let pushed: App = serde_json::from_str(&payload.yml).unwrap();
    assert_eq!(pushed.metadata.name.as_deref(), Some("shop"));
    assert_eq!(pushed.spec.micro_services.len(), 1);
}

#[tokio::test]
async fn manager_owned_app_is_not_echoed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let notifier = ManagerNotifier::from_config(&config(&mock_server)).unwrap();
    let mut app = shop();
    app.status = Some(AppStatus {
        from_manager: FromManager::Created,
        ..Default::default()
    });

    assert!(notifier.notify(&app).is_none());
}

#[tokio::test]
async fn push_surfaces_server_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/apps"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database is down"))
        .mount(&mock_server)
        .await;

    let notifier = ManagerNotifier::from_config(&config(&mock_server)).unwrap();
    let result = notifier.push(&shop()).await;

    match result {
        Err(OperatorError::HttpError(message)) => {
            assert!(message.contains("500"));
            assert!(message.contains("database is down"));
        }
        other => panic!("Expected HTTP error, got {:?}", other),
    }
}

#[tokio::test]
async fn failed_push_does_not_fail_the_pass() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let harness = Harness::with_config(config(&mock_server));
    harness.add_app(shop());

    harness.reconcile_app("shop").await.expect("reconcile");

    let requests = wait_for_requests(&mock_server, 1).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), "/apps");
}
