//! RealtimeSession - one context object per signed-in user
//!
//! Owns the REST client, the broker connection and the notification feed,
//! wired to one cookie store. It replaces process-wide singletons: tests
//! and multi-account hosts simply build more sessions.

use std::sync::{Arc, Weak};

use auth_client::{AuthClient, AuthState, ClearableCookieJar, ReqwestExecutor};
use broker_client::{BrokerClient, WsTransport};
use notification_stream::NotificationStream;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use url::Url;

use crate::config::SdkConfig;
use crate::error::{Result, SdkError};

struct SessionInner {
    config: SdkConfig,
    auth: AuthClient,
    broker: BrokerClient,
    notifications: NotificationStream,
    auth_watch: Mutex<Option<JoinHandle<()>>>,
}

impl SessionInner {
    async fn close_realtime(&self) {
        self.broker.disconnect().await;
        self.notifications.disconnect();
    }

    fn stop_auth_watch(&self) {
        if let Some(watch) = self.auth_watch.lock().take() {
            watch.abort();
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(watch) = self.auth_watch.get_mut().take() {
            watch.abort();
        }
    }
}

/// Realtime connectivity for one StudyMate session
///
/// # Example
///
/// ```rust,ignore
/// use studymate_sdk::{RealtimeSession, SdkConfig};
///
/// let session = RealtimeSession::new(SdkConfig::from_env()?)?;
/// session.start();
///
/// let rooms = session.broker().addresses();
/// let _chat = session.broker().subscribe(&rooms.room_topic(42), |m| println!("{}", m.body), None)?;
/// session.notifications().on_notification(|n| println!("{:?}", n.message));
///
/// // ...
/// session.logout().await;
/// ```
#[derive(Clone)]
pub struct RealtimeSession {
    inner: Arc<SessionInner>,
}

impl RealtimeSession {
    /// Build every client over one cookie store
    ///
    /// Nothing connects until [`start`](Self::start).
    pub fn new(config: SdkConfig) -> Result<Self> {
        config.validate()?;

        let cookies = Arc::new(ClearableCookieJar::new());
        let http = build_http_client(&config, Arc::clone(&cookies))?;

        let executor = ReqwestExecutor::from_client(http.clone(), config.auth.clone());
        let auth = AuthClient::with_executor(config.auth.clone(), Arc::new(executor), Some(Arc::clone(&cookies)))?;

        let transport = WsTransport::new(config.broker.clone())
            .with_handshake_headers(cookie_handshake(cookies, &config.broker.url)?);
        let broker = BrokerClient::new(config.broker.clone(), transport)?;

        let notifications = NotificationStream::with_http_client(config.notifications.clone(), http)?;

        Ok(Self::from_parts(config, auth, broker, notifications))
    }

    /// Assemble a session from clients built elsewhere
    pub fn from_parts(
        config: SdkConfig,
        auth: AuthClient,
        broker: BrokerClient,
        notifications: NotificationStream,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config,
                auth,
                broker,
                notifications,
                auth_watch: Mutex::new(None),
            }),
        }
    }

    /// Connect the broker and the notification feed
    ///
    /// Call after login. Marks the session authenticated and, from then on,
    /// closes both realtime transports if the credential is lost for good.
    pub fn start(&self) {
        self.inner.auth.mark_authenticated();
        self.spawn_auth_watch();
        self.inner.broker.connect();
        self.inner.notifications.connect();
        tracing::info!("Realtime session started");
    }

    /// Close the realtime transports but keep credentials and subscriptions
    pub async fn stop(&self) {
        self.inner.stop_auth_watch();
        self.inner.close_realtime().await;
        tracing::info!("Realtime session stopped");
    }

    /// End the session on the server and locally
    ///
    /// The server call is best effort; local teardown always happens.
    pub async fn logout(&self) {
        self.inner.stop_auth_watch();

        if let Err(e) = self.inner.auth.logout().await {
            tracing::warn!("Server logout failed: {}", e);
        }

        self.inner.broker.disconnect().await;
        self.inner.broker.clear_subscriptions();
        self.inner.notifications.disconnect();
        self.inner.auth.reset();
        self.inner.auth.clear_auth_state();
        tracing::info!("Logged out; realtime session closed");
    }

    fn spawn_auth_watch(&self) {
        let mut watch = self.inner.auth_watch.lock();
        if watch.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No Tokio runtime available; auth expiry will not close realtime transports");
            return;
        };

        let mut states = self.inner.auth.watch_auth_state();
        let session: Weak<SessionInner> = Arc::downgrade(&self.inner);

        *watch = Some(runtime.spawn(async move {
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                if state != AuthState::Unauthenticated {
                    continue;
                }
                let Some(inner) = session.upgrade() else {
                    return;
                };
                tracing::error!("Session credential could not be refreshed; closing realtime transports");
                inner.close_realtime().await;
            }
        }));
    }

    pub fn auth(&self) -> &AuthClient {
        &self.inner.auth
    }

    pub fn broker(&self) -> &BrokerClient {
        &self.inner.broker
    }

    pub fn notifications(&self) -> &NotificationStream {
        &self.inner.notifications
    }

    pub fn config(&self) -> &SdkConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for RealtimeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSession")
            .field("auth", &self.inner.auth.auth_state())
            .field("broker", &self.inner.broker.state())
            .field("notifications", &self.inner.notifications.state())
            .finish()
    }
}

/// HTTP client shared by REST calls and the notification feed
///
/// Only connection setup is bounded here. A total timeout would cut the
/// long-lived feed response; REST calls get theirs from the auth client.
pub(crate) fn build_http_client(
    config: &SdkConfig,
    cookies: Arc<ClearableCookieJar>,
) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .cookie_provider(cookies)
        .connect_timeout(config.notifications.connect_timeout)
        .build()
        .map_err(|e| SdkError::Config(format!("Failed to build HTTP client: {e}")))
}

/// Handshake header provider sending the session cookies to the broker
///
/// Cookies are scoped to the HTTP origin, so the broker URL is looked up
/// under its `http`/`https` equivalent.
pub(crate) fn cookie_handshake(
    cookies: Arc<ClearableCookieJar>,
    ws_url: &str,
) -> Result<impl Fn() -> Vec<(String, String)> + Send + Sync + 'static> {
    let mut origin = Url::parse(ws_url).map_err(|e| SdkError::Config(format!("Invalid broker URL: {e}")))?;
    let scheme = if origin.scheme() == "wss" { "https" } else { "http" };
    origin
        .set_scheme(scheme)
        .map_err(|_| SdkError::Config(format!("Cannot map {ws_url} to an HTTP origin")))?;

    Ok(move || match cookies.cookie_header(&origin) {
        Some(cookie) => vec![("Cookie".to_string(), cookie)],
        None => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_client::ConnectionState;
    use notification_stream::NotificationConfig;
    use std::time::Duration;

    #[test]
    fn test_handshake_carries_session_cookie() {
        let cookies = Arc::new(ClearableCookieJar::new());
        let provider = cookie_handshake(Arc::clone(&cookies), "ws://localhost:9005/ws").unwrap();
        assert!(provider().is_empty());

        cookies.add_cookie_str(
            "access_token=abc; Path=/; HttpOnly",
            &Url::parse("http://localhost:9005/api/auth/refresh").unwrap(),
        );
        assert_eq!(
            provider(),
            vec![("Cookie".to_string(), "access_token=abc".to_string())]
        );

        cookies.clear();
        assert!(provider().is_empty());
    }

    #[test]
    fn test_secure_broker_maps_to_https_origin() {
        let cookies = Arc::new(ClearableCookieJar::new());
        cookies.add_cookie_str(
            "access_token=abc; Path=/; Secure",
            &Url::parse("https://studymate.example/api").unwrap(),
        );

        let provider = cookie_handshake(cookies, "wss://studymate.example/ws").unwrap();
        assert_eq!(provider().len(), 1);
    }

    #[tokio::test]
    async fn test_http_client_bounds_connection_setup() {
        // Non-routable address: without a connect timeout the SYN just hangs
        let api = "http://10.255.255.1:9/api";
        let config = SdkConfig::new(api, "ws://10.255.255.1:9/ws").with_notifications(
            NotificationConfig::for_api(api).with_connect_timeout(Duration::from_millis(200)),
        );
        let client = build_http_client(&config, Arc::new(ClearableCookieJar::new())).unwrap();

        let started = std::time::Instant::now();
        let result = client.get(format!("{api}/rooms")).send().await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_new_does_not_connect() {
        let session = RealtimeSession::new(SdkConfig::default()).unwrap();
        assert_eq!(session.broker().state(), ConnectionState::Disconnected);
        assert_eq!(session.notifications().state(), ConnectionState::Disconnected);
        assert_eq!(session.auth().auth_state(), AuthState::Authenticated);
    }
}
