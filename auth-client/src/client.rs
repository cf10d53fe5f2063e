//! Request pipeline with transparent credential refresh

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::config::AuthConfig;
use crate::cookies::ClearableCookieJar;
use crate::error::{AuthError, RefreshError, Result};
use crate::executor::{HttpExecutor, ReqwestExecutor};
use crate::refresh::RefreshCoordinator;
use crate::request::{ApiResponse, RequestDescriptor};
use crate::state::AuthState;

struct AuthInner {
    config: AuthConfig,
    executor: Arc<dyn HttpExecutor>,
    coordinator: RefreshCoordinator,
    cookies: Option<Arc<ClearableCookieJar>>,
    state: watch::Sender<AuthState>,
}

/// REST client that recovers from an expired access credential
///
/// When a response carries the unauthenticated status, the client runs (or
/// joins) a single credential refresh, replays the original request once and
/// returns the replay's result. If the refresh itself is rejected, or the
/// replay is rejected again, auth state is cleared and the error surfaces.
///
/// # Example
///
/// ```rust,ignore
/// use auth_client::{AuthClient, AuthConfig};
///
/// let auth = AuthClient::new(AuthConfig::new("http://localhost:9005/api"))?;
/// let rooms = auth.get("/rooms").await?.error_for_status()?;
/// ```
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<AuthInner>,
}

impl AuthClient {
    /// Create a client with its own cookie jar and reqwest executor
    pub fn new(config: AuthConfig) -> Result<Self> {
        let cookies = Arc::new(ClearableCookieJar::new());
        let executor = ReqwestExecutor::new(config.clone(), Arc::clone(&cookies))?;
        Self::with_executor(config, Arc::new(executor), Some(cookies))
    }

    /// Create a client over any executor
    ///
    /// `cookies` is the store the executor reads credentials from; it is
    /// wiped whenever auth state is cleared.
    pub fn with_executor(
        config: AuthConfig,
        executor: Arc<dyn HttpExecutor>,
        cookies: Option<Arc<ClearableCookieJar>>,
    ) -> Result<Self> {
        config.validate()?;
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&executor),
            &config.refresh_path,
            config.refresh_timeout,
        );
        let (state, _) = watch::channel(AuthState::Authenticated);

        Ok(Self {
            inner: Arc::new(AuthInner {
                config,
                executor,
                coordinator,
                cookies,
                state,
            }),
        })
    }

    /// Send `request`, refreshing the credential and replaying once if needed
    pub async fn execute(&self, mut request: RequestDescriptor) -> Result<ApiResponse> {
        let unauthenticated = self.inner.config.unauthenticated_status;

        let response = self.send(&request).await?;
        if response.status != unauthenticated {
            return Ok(response);
        }

        if request.path == self.inner.config.refresh_path {
            tracing::warn!("Refresh endpoint rejected the session");
            self.clear_auth_state();
            return Err(AuthError::Unauthenticated { status: response.status });
        }

        if request.retried {
            tracing::warn!(path = %request.path, "Request rejected again after refresh");
            self.clear_auth_state();
            return Err(AuthError::Unauthenticated { status: response.status });
        }

        tracing::debug!(path = %request.path, "Access credential rejected; refreshing");
        match self.inner.coordinator.refresh().await {
            Ok(()) => self.mark_authenticated(),
            Err(RefreshError::Cancelled) => {
                tracing::info!(path = %request.path, "Session reset during refresh; request not replayed");
                // The refresh may have stored a cookie after the reset cleared the jar
                if !self.auth_state().is_authenticated() {
                    if let Some(cookies) = &self.inner.cookies {
                        cookies.clear();
                    }
                }
                return Err(AuthError::Unauthenticated { status: response.status });
            }
            Err(e) => {
                self.clear_auth_state();
                return Err(AuthError::RefreshFailed(e));
            }
        }

        request.retried = true;
        let replay = self.send(&request).await?;
        if replay.status == unauthenticated {
            tracing::warn!(path = %request.path, "Replayed request rejected; session expired");
            self.clear_auth_state();
            return Err(AuthError::Unauthenticated { status: replay.status });
        }
        Ok(replay)
    }

    async fn send(&self, request: &RequestDescriptor) -> Result<ApiResponse> {
        tokio::time::timeout(
            self.inner.config.request_timeout,
            self.inner.executor.execute(request),
        )
        .await
        .map_err(|_| AuthError::Timeout)?
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.execute(RequestDescriptor::get(path)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        self.execute(RequestDescriptor::post(path).with_json(body)?).await
    }

    /// Tell the server to drop the session, then clear local auth state
    ///
    /// Local state is cleared even if the call fails.
    pub async fn logout(&self) -> Result<()> {
        // Cancel first so a refresh finishing during the call cannot re-authenticate
        self.inner.coordinator.reset();

        let request = RequestDescriptor::post(self.inner.config.logout_path.clone());
        let outcome = self.send(&request).await;

        self.inner.coordinator.reset();
        self.clear_auth_state();

        match outcome {
            Ok(response) if response.is_success() => {
                tracing::info!("Logged out");
                Ok(())
            }
            Ok(response) => Err(AuthError::Http(format!("Logout failed with HTTP {}", response.status))),
            Err(e) => Err(e),
        }
    }

    /// Cancel any in-flight refresh so the next failure starts a new one
    ///
    /// Requests waiting on the cancelled refresh fail with
    /// [`AuthError::Unauthenticated`] and are not replayed.
    pub fn reset(&self) {
        self.inner.coordinator.reset();
    }

    /// Forget the credential and report `Unauthenticated`
    pub fn clear_auth_state(&self) {
        if let Some(cookies) = &self.inner.cookies {
            cookies.clear();
        }
        let changed = self.inner.state.send_if_modified(|state| {
            let changed = *state != AuthState::Unauthenticated;
            *state = AuthState::Unauthenticated;
            changed
        });
        if changed {
            tracing::info!("Authentication state cleared");
        }
    }

    /// Report `Authenticated` again, e.g. after a new login
    pub fn mark_authenticated(&self) {
        self.inner.state.send_if_modified(|state| {
            let changed = *state != AuthState::Authenticated;
            *state = AuthState::Authenticated;
            changed
        });
    }

    pub fn auth_state(&self) -> AuthState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every auth state change
    pub fn watch_auth_state(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn cookies(&self) -> Option<Arc<ClearableCookieJar>> {
        self.inner.cookies.clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.coordinator.is_refreshing()
    }

    /// Number of refresh calls sent so far
    pub fn refresh_count(&self) -> u64 {
        self.inner.coordinator.refresh_count()
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.inner.config.base_url)
            .field("state", &self.auth_state())
            .field("coordinator", &self.inner.coordinator)
            .finish()
    }
}
