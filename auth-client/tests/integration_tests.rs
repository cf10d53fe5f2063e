//! Integration tests for the auth-client crate.
//!
//! These tests drive `AuthClient` through a scripted executor and verify:
//! - Single-flight refresh with one replay per failed request
//! - Unrecoverable sessions clear auth state and cookies
//! - Refresh timeout, logout and pass-through of other statuses
//! - Logout while a refresh is running is not undone by that refresh


use auth_client::{
    AuthClient, AuthConfig, AuthError, AuthState, ClearableCookieJar, RefreshError,
    RequestDescriptor,
};
use mock_executor::{MockExecutor, REFRESH_PATH};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

fn client_over(executor: Arc<MockExecutor>) -> (AuthClient, Arc<ClearableCookieJar>) {
    let cookies = Arc::new(ClearableCookieJar::new());
    cookies.add_cookie_str(
        "refresh_token=long-lived; Path=/",
        &Url::parse("http://localhost:9005/api").unwrap(),
    );
    let client = AuthClient::with_executor(AuthConfig::default(), executor, Some(Arc::clone(&cookies)))
        .expect("valid config");
    (client, cookies)
}

fn has_cookies(cookies: &ClearableCookieJar) -> bool {
    cookies
        .cookie_header(&Url::parse("http://localhost:9005/api/rooms").unwrap())
        .is_some()
}

#[tokio::test(start_paused = true)]
async fn test_valid_credential_needs_no_refresh() {
    let executor = Arc::new(MockExecutor::valid());
    let (client, _) = client_over(Arc::clone(&executor));

    let response = client.get("/rooms").await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(client.refresh_count(), 0);
    assert_eq!(executor.calls_to("/rooms"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_failures_share_one_refresh() {
    let executor = Arc::new(MockExecutor::expired(Duration::from_millis(50)));
    let (client, _) = client_over(Arc::clone(&executor));

    let results = futures::future::join_all((0..5).map(|i| {
        let client = client.clone();
        async move { client.get(&format!("/rooms/{i}")).await }
    }))
    .await;

    for (i, result) in results.into_iter().enumerate() {
        let response = result.expect("replay should succeed");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, format!(r#"{{"path":"/rooms/{i}"}}"#));
        assert_eq!(executor.replays_of(&format!("/rooms/{i}")), 1);
    }

    assert_eq!(client.refresh_count(), 1);
    assert_eq!(executor.calls_to(REFRESH_PATH), 1);
    assert_eq!(client.auth_state(), AuthState::Authenticated);
    assert!(!client.is_refreshing());
}

#[tokio::test(start_paused = true)]
async fn test_second_rejection_clears_auth_state() {
    let executor = Arc::new(MockExecutor::expired(Duration::ZERO).always_unauthorized());
    let (client, cookies) = client_over(Arc::clone(&executor));
    let mut state = client.watch_auth_state();

    let result = client.get("/rooms").await;
    assert!(matches!(result, Err(AuthError::Unauthenticated { status: 401 })));

    // Original request plus exactly one replay
    assert_eq!(executor.calls_to("/rooms"), 2);
    assert_eq!(client.refresh_count(), 1);

    assert!(state.has_changed().unwrap());
    assert_eq!(*state.borrow_and_update(), AuthState::Unauthenticated);
    assert!(!has_cookies(&cookies));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_rejection_fails_every_waiter() {
    let executor = Arc::new(MockExecutor::expired(Duration::from_millis(50)).reject_refresh());
    let (client, cookies) = client_over(Arc::clone(&executor));

    let results = futures::future::join_all((0..3).map(|_| {
        let client = client.clone();
        async move { client.get("/rooms").await }
    }))
    .await;

    for result in results {
        assert!(matches!(
            result,
            Err(AuthError::RefreshFailed(RefreshError::Rejected { status: 401 }))
        ));
    }
    assert_eq!(executor.calls_to(REFRESH_PATH), 1);
    assert_eq!(executor.replays_of("/rooms"), 0);
    assert_eq!(client.auth_state(), AuthState::Unauthenticated);
    assert!(!has_cookies(&cookies));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_refresh_request_is_not_refreshed_again() {
    let executor = Arc::new(MockExecutor::expired(Duration::ZERO).reject_refresh());
    let (client, _) = client_over(Arc::clone(&executor));

    let result = client.execute(RequestDescriptor::post(REFRESH_PATH)).await;
    assert!(matches!(result, Err(AuthError::Unauthenticated { status: 401 })));
    assert_eq!(client.refresh_count(), 0);
    assert_eq!(executor.calls_to(REFRESH_PATH), 1);
    assert_eq!(client.auth_state(), AuthState::Unauthenticated);
}

#[tokio::test(start_paused = true)]
async fn test_already_retried_request_is_not_replayed() {
    let executor = Arc::new(MockExecutor::expired(Duration::ZERO));
    let (client, _) = client_over(Arc::clone(&executor));

    let mut request = RequestDescriptor::get("/rooms");
    request.retried = true;

    let result = client.execute(request).await;
    assert!(matches!(result, Err(AuthError::Unauthenticated { .. })));
    assert_eq!(client.refresh_count(), 0);
    assert_eq!(executor.calls_to("/rooms"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hung_refresh_fails_after_timeout() {
    let executor = Arc::new(MockExecutor::expired(Duration::from_secs(3600)));
    let (client, _) = client_over(Arc::clone(&executor));

    let started = tokio::time::Instant::now();
    let result = client.get("/rooms").await;

    assert!(matches!(
        result,
        Err(AuthError::RefreshFailed(RefreshError::TimedOut))
    ));
    assert!(started.elapsed() >= AuthConfig::default().refresh_timeout);
    assert!(started.elapsed() < Duration::from_secs(3600));
    assert_eq!(client.auth_state(), AuthState::Unauthenticated);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_slot_is_released_after_completion() {
    let executor = Arc::new(MockExecutor::expired(Duration::from_millis(10)));
    let (client, _) = client_over(Arc::clone(&executor));

    client.get("/rooms").await.unwrap();
    client.clear_auth_state();
    client.mark_authenticated();

    // Logging out on the server invalidates the credential again
    let _ = executor_logout(&executor).await;
    client.get("/rooms").await.unwrap();

    assert_eq!(client.refresh_count(), 2);
}

async fn executor_logout(executor: &MockExecutor) -> auth_client::Result<auth_client::ApiResponse> {
    use auth_client::HttpExecutor;
    executor
        .execute(&RequestDescriptor::post(mock_executor::LOGOUT_PATH))
        .await
}

#[tokio::test(start_paused = true)]
async fn test_other_error_statuses_pass_through() {
    let executor = Arc::new(MockExecutor::valid());
    let (client, _) = client_over(Arc::clone(&executor));

    let response = client.get("/boom").await.unwrap();
    assert_eq!(response.status, 500);
    assert!(response.error_for_status().is_err());
    assert_eq!(client.refresh_count(), 0);
    assert_eq!(client.auth_state(), AuthState::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_post_json_is_replayed_with_same_body() {
    let executor = Arc::new(MockExecutor::expired(Duration::ZERO));
    let (client, _) = client_over(Arc::clone(&executor));

    let body = serde_json::json!({ "roomName": "algorithms", "maxParticipants": 6 });
    let response = client.post_json("/rooms", &body).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(executor.replays_of("/rooms"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_logout_clears_state() {
    let executor = Arc::new(MockExecutor::valid());
    let (client, cookies) = client_over(Arc::clone(&executor));

    client.logout().await.unwrap();
    assert_eq!(client.auth_state(), AuthState::Unauthenticated);
    assert!(!has_cookies(&cookies));
    assert_eq!(executor.calls_to(mock_executor::LOGOUT_PATH), 1);
}

async fn logout_during_refresh(logout_after: Duration) {
    let cookies = Arc::new(ClearableCookieJar::new());
    let executor = Arc::new(
        MockExecutor::expired(Duration::from_millis(100))
            .issuing_cookie(Arc::clone(&cookies), Duration::from_millis(50)),
    );
    let client = AuthClient::with_executor(
        AuthConfig::default(),
        executor.clone(),
        Some(Arc::clone(&cookies)),
    )
    .expect("valid config");

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.get("/rooms").await })
    };

    tokio::time::sleep(logout_after).await;
    assert!(client.is_refreshing());
    client.logout().await.unwrap();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(AuthError::Unauthenticated { status: 401 })));

    // Let anything left of the refresh run out
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(client.auth_state(), AuthState::Unauthenticated);
    assert!(!has_cookies(&cookies));
    assert_eq!(executor.calls_to("/rooms"), 1);
    assert_eq!(executor.replays_of("/rooms"), 0);
    assert!(!client.is_refreshing());
}

#[tokio::test(start_paused = true)]
async fn test_logout_while_refresh_is_running() {
    logout_during_refresh(Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn test_logout_after_refresh_cookie_arrived() {
    logout_during_refresh(Duration::from_millis(120)).await;
}

#[tokio::test(start_paused = true)]
async fn test_dropped_request_does_not_strand_refresh() {
    let executor = Arc::new(MockExecutor::expired(Duration::from_millis(100)));
    let (client, _) = client_over(Arc::clone(&executor));

    let starter = {
        let client = client.clone();
        tokio::spawn(async move { client.get("/rooms").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(client.is_refreshing());
    starter.abort();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!client.is_refreshing());
    assert_eq!(executor.calls_to(REFRESH_PATH), 1);

    // The credential expires again; the next 401 needs a new refresh call
    let _ = executor_logout(&executor).await;
    let response = client.get("/rooms/1").await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(executor.calls_to(REFRESH_PATH), 2);
}
