//! Session-level tests.
//!
//! REST and the notification feed run against a mockito server; the broker
//! uses an in-memory transport. These tests use the real clock.


use mockito::{Server, ServerGuard};
use std::time::Duration;
use stub_transport::StubTransport;
use studymate_sdk::{
    AuthClient, AuthConfig, AuthError, AuthState, BrokerClient, BrokerConfig, ConnectionState,
    NotificationConfig, NotificationStream, RealtimeSession, SdkConfig,
};

const FEED: &str = "event: connected\ndata: SSE connection established\n\n";

fn session_for(server: &ServerGuard, transport: &StubTransport) -> RealtimeSession {
    let api = format!("{}/api", server.url());
    let config = SdkConfig::new(&api, "ws://localhost:9005/ws");

    let auth = AuthClient::new(AuthConfig::new(&api)).unwrap();
    let broker = BrokerClient::new(BrokerConfig::default(), transport.clone()).unwrap();
    let notifications =
        NotificationStream::with_http_client(NotificationConfig::for_api(&api), reqwest::Client::new()).unwrap();

    RealtimeSession::from_parts(config, auth, broker, notifications)
}

async fn mock_feed(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("GET", "/api/notifications/subscribe")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(FEED)
        .expect_at_least(1)
        .create_async()
        .await
}

async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

#[tokio::test]
async fn test_start_connects_both_transports() {
    let mut server = Server::new_async().await;
    let feed = mock_feed(&mut server).await;
    let transport = StubTransport::default();
    let session = session_for(&server, &transport);

    session.start();

    assert!(eventually(|| session.broker().is_connected()).await);
    assert_eq!(transport.activations(), 1);
    feed.assert_async().await;
}

#[tokio::test]
async fn test_unrecoverable_credential_closes_realtime_transports() {
    let mut server = Server::new_async().await;
    let _feed = mock_feed(&mut server).await;
    let _rooms = server
        .mock("GET", "/api/rooms")
        .with_status(401)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/api/auth/refresh")
        .with_status(401)
        .expect(1)
        .create_async()
        .await;

    let transport = StubTransport::default();
    let session = session_for(&server, &transport);
    let room = session.broker().addresses().room_topic(42);
    let _chat = session.broker().subscribe(&room, |_| {}, None).unwrap();

    session.start();
    assert!(eventually(|| session.broker().is_connected()).await);

    let result = session.auth().get("/rooms").await;
    assert!(matches!(result, Err(AuthError::RefreshFailed(_))));
    assert_eq!(session.auth().auth_state(), AuthState::Unauthenticated);

    assert!(eventually(|| session.broker().state() == ConnectionState::Disconnected).await);
    assert!(eventually(|| session.notifications().state() == ConnectionState::Disconnected).await);
    assert!(transport.last_session().is_deactivated());
    assert!(!session.broker().has_pending_reconnect());
    assert!(!session.notifications().status().has_pending_reconnect);

    // Subscriptions survive an expiry so a fresh login can restore them
    assert_eq!(session.broker().destinations(), vec![room]);
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_logout_tears_everything_down() {
    let mut server = Server::new_async().await;
    let _feed = mock_feed(&mut server).await;
    let logout = server
        .mock("POST", "/api/auth/logout")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let transport = StubTransport::default();
    let session = session_for(&server, &transport);
    let room = session.broker().addresses().room_topic(7);
    let _chat = session.broker().subscribe(&room, |_| {}, None).unwrap();

    session.start();
    assert!(eventually(|| session.broker().is_connected()).await);
    assert_eq!(transport.last_session().subscribes(), 1);

    session.logout().await;

    assert_eq!(session.broker().state(), ConnectionState::Disconnected);
    assert!(session.broker().destinations().is_empty());
    assert_eq!(session.notifications().state(), ConnectionState::Disconnected);
    assert!(!session.notifications().status().has_pending_reconnect);
    assert_eq!(session.auth().auth_state(), AuthState::Unauthenticated);
    assert!(!session.auth().is_refreshing());
    logout.assert_async().await;
}

#[tokio::test]
async fn test_logout_completes_when_server_call_fails() {
    let mut server = Server::new_async().await;
    let _feed = mock_feed(&mut server).await;
    let _logout = server
        .mock("POST", "/api/auth/logout")
        .with_status(500)
        .create_async()
        .await;

    let transport = StubTransport::default();
    let session = session_for(&server, &transport);

    session.start();
    assert!(eventually(|| session.broker().is_connected()).await);

    session.logout().await;

    assert_eq!(session.broker().state(), ConnectionState::Disconnected);
    assert_eq!(session.notifications().state(), ConnectionState::Disconnected);
    assert_eq!(session.auth().auth_state(), AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_stop_keeps_credentials_and_subscriptions() {
    let mut server = Server::new_async().await;
    let _feed = mock_feed(&mut server).await;

    let transport = StubTransport::default();
    let session = session_for(&server, &transport);
    let room = session.broker().addresses().room_topic(3);
    let _chat = session.broker().subscribe(&room, |_| {}, None).unwrap();

    session.start();
    assert!(eventually(|| session.broker().is_connected()).await);
    session.stop().await;

    assert_eq!(session.broker().state(), ConnectionState::Disconnected);
    assert_eq!(session.auth().auth_state(), AuthState::Authenticated);
    assert_eq!(session.broker().destinations(), vec![room]);

    session.start();
    assert!(eventually(|| session.broker().is_connected()).await);
    assert_eq!(transport.activations(), 2);
    assert_eq!(transport.last_session().subscribes(), 1);
}

#[test]
fn test_config_from_env_defaults() {
    let config = SdkConfig::from_lookup(|_| None).unwrap();
    assert_eq!(config.auth.base_url, studymate_sdk::DEFAULT_API_BASE_URL);
    assert_eq!(config.broker.url, studymate_sdk::DEFAULT_WS_URL);
}
