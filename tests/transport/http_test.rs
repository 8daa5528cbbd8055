// HTTP Transport Tests
// Tests for the legacy JSON-over-HTTP wire and its auxiliary endpoints

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use ppdd::config::{NodeConfig, SUPPORTED_PROTOCOL_VERSION};
use ppdd::engine::{EngineConfig, RelayEngine, ServiceError};
use ppdd::message::Role;
use ppdd::transport::{
    endpoint_url, HttpTransport, HttpTransportConfig, ServiceMsg, ServiceStatus, Transport,
    TransportState,
};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type Running = JoinHandle<(Result<(), ServiceError>, HttpTransport)>;

fn free_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}

fn node(role: Role, listen: &str, ping: &str) -> NodeConfig {
    NodeConfig::new(role, SUPPORTED_PROTOCOL_VERSION)
        .with_listen(listen)
        .with_address(Role::Ping, ping)
        .with_address(Role::Pong, listen)
        .with_address(Role::Ding, &free_address())
        .with_address(Role::Dong, &free_address())
}

fn start(config: NodeConfig) -> (CancellationToken, Running) {
    let settings = EngineConfig::new().with_processing_delay(Duration::ZERO);
    let engine = RelayEngine::new(config, settings).unwrap();
    let mut transport = HttpTransport::new(HttpTransportConfig::default());
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let running = tokio::spawn(async move {
        let result = engine.run(token, &mut transport).await;
        (result, transport)
    });
    (shutdown, running)
}

/// Poll /health until the node answers
async fn wait_ready(client: &reqwest::Client, address: &str) {
    for _ in 0..100 {
        let health = client.get(format!("http://{}/health", address)).send().await;
        if health.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("node at {} never came up", address);
}

/// A stand-in Ping node that records every message body it is sent
async fn capture_server() -> (String, mpsc::UnboundedReceiver<ServiceMsg>) {
    async fn record(
        State(seen): State<mpsc::UnboundedSender<ServiceMsg>>,
        Json(body): Json<ServiceMsg>,
    ) -> StatusCode {
        let _ = seen.send(body);
        StatusCode::OK
    }

    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let app = Router::new().route("/", post(record)).with_state(seen_tx);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (address, seen_rx)
}

// ============================================================================
// ENDPOINTS
// ============================================================================

#[tokio::test]
async fn test_health_reports_ok() {
    let address = free_address();
    let (shutdown, running) = start(node(Role::Pong, &address, &free_address()));
    let client = reqwest::Client::new();
    wait_ready(&client, &address).await;

    let response = client
        .get(format!("http://{}/health", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status: ServiceStatus = response.json().await.unwrap();
    assert_eq!(status.status, "OK");

    shutdown.cancel();
    let (result, _) = running.await.unwrap();
    assert_eq!(result, Ok(()));
}

#[tokio::test]
async fn test_root_summary_names_mode() {
    let address = free_address();
    let (shutdown, running) = start(node(Role::Pong, &address, &free_address()));
    let client = reqwest::Client::new();
    wait_ready(&client, &address).await;

    let body = client
        .get(format!("http://{}/", address))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.starts_with(&format!("Hello from: {}:", address)));
    assert!(body.contains("mode: pong"));
    assert!(body.contains("protocol version: v1"));

    // Reported from the system, not from the environment
    let host = hostname::get().unwrap().to_string_lossy().into_owned();
    assert!(body.contains(&format!("hostname: {}\n", host)));
    shutdown.cancel();
    running.await.unwrap();
}

#[tokio::test]
async fn test_wrong_methods_rejected() {
    let address = free_address();
    let (shutdown, running) = start(node(Role::Pong, &address, &free_address()));
    let client = reqwest::Client::new();
    wait_ready(&client, &address).await;

    let shutdown_get = client
        .get(format!("http://{}/shutdown", address))
        .send()
        .await
        .unwrap();
    let health_post = client
        .post(format!("http://{}/health", address))
        .send()
        .await
        .unwrap();

    assert_eq!(shutdown_get.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(health_post.status(), StatusCode::METHOD_NOT_ALLOWED);
    shutdown.cancel();
    running.await.unwrap();
}

#[tokio::test]
async fn test_bad_messages_rejected() {
    let address = free_address();
    let (shutdown, running) = start(node(Role::Pong, &address, &free_address()));
    let client = reqwest::Client::new();
    wait_ready(&client, &address).await;
    let url = endpoint_url(&address);

    let not_json = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    let no_msg = client
        .post(&url)
        .json(&serde_json::json!({ "Other": "ping" }))
        .send()
        .await
        .unwrap();
    let unknown = client
        .post(&url)
        .json(&serde_json::json!({ "Msg": "foo" }))
        .send()
        .await
        .unwrap();

    assert_eq!(not_json.status(), StatusCode::BAD_REQUEST);
    assert_eq!(no_msg.status(), StatusCode::BAD_REQUEST);
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);

    shutdown.cancel();
    let (_, transport) = running.await.unwrap();
    assert_eq!(transport.stats().receive_errors, 3);
    assert_eq!(transport.stats().messages_received, 0);
}

#[tokio::test]
async fn test_shutdown_endpoint_stops_node() {
    let address = free_address();
    let (_shutdown, running) = start(node(Role::Dong, &address, &free_address()));
    let client = reqwest::Client::new();
    wait_ready(&client, &address).await;

    let response = client
        .post(format!("http://{}/shutdown", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "Shutting down\n");

    let (result, transport) = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("node did not stop")
        .unwrap();
    assert_eq!(result, Ok(()));
    assert_eq!(transport.state(), &TransportState::Stopped);
}

// ============================================================================
// RELAY
// ============================================================================

#[tokio::test]
async fn test_ping_message_relayed_as_pong() {
    let (ping_address, mut seen) = capture_server().await;
    let address = free_address();
    let (shutdown, running) = start(node(Role::Pong, &address, &ping_address));
    let client = reqwest::Client::new();
    wait_ready(&client, &address).await;

    // Role names are accepted in any case
    let response = client
        .post(endpoint_url(&address))
        .json(&serde_json::json!({ "Msg": "PING" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let relayed = tokio::time::timeout(Duration::from_secs(2), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(relayed, ServiceMsg::new(Role::Pong));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    let (result, transport) = running.await.unwrap();
    assert_eq!(result, Ok(()));
    assert_eq!(transport.stats().messages_received, 1);
    assert_eq!(transport.stats().requests_sent, 1);
}

#[tokio::test]
async fn test_bind_failure_reported() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = taken.local_addr().unwrap().to_string();
    let (_shutdown, running) = start(node(Role::Ding, &address, &free_address()));

    let (result, transport) = running.await.unwrap();

    assert!(matches!(result, Err(ServiceError::TransportServe(_))));
    assert!(matches!(transport.state(), TransportState::Failed(_)));
    drop(taken);
}
