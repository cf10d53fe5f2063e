//! Single-flight credential refresh
//!
//! At most one refresh call is outstanding. It runs on its own task, so it
//! finishes even if the caller that started it goes away, and it clears the
//! slot itself before publishing its outcome. Callers arriving while it
//! runs await the same shared future and observe the same outcome.
//!
//! [`RefreshCoordinator::reset`] aborts the running call and bumps the
//! epoch. Callers that joined before the reset get
//! [`RefreshError::Cancelled`] instead of the outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::AbortHandle;

use crate::error::RefreshError;
use crate::executor::HttpExecutor;
use crate::request::RequestDescriptor;

type SharedRefresh = Shared<BoxFuture<'static, Result<(), RefreshError>>>;

struct InFlight {
    id: u64,
    refresh: SharedRefresh,
    abort: Option<AbortHandle>,
}

#[derive(Default)]
struct RefreshSlot {
    in_flight: Option<InFlight>,
    /// Bumped by every reset
    epoch: u64,
    next_id: u64,
}

impl RefreshSlot {
    fn release(&mut self, id: u64) {
        if self.in_flight.as_ref().is_some_and(|current| current.id == id) {
            self.in_flight = None;
        }
    }
}

pub struct RefreshCoordinator {
    executor: Arc<dyn HttpExecutor>,
    request: RequestDescriptor,
    timeout: Duration,
    slot: Arc<Mutex<RefreshSlot>>,
    calls: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(executor: Arc<dyn HttpExecutor>, refresh_path: &str, timeout: Duration) -> Self {
        Self {
            executor,
            request: RequestDescriptor::post(refresh_path),
            timeout,
            slot: Arc::new(Mutex::new(RefreshSlot::default())),
            calls: AtomicU64::new(0),
        }
    }

    /// Join the outstanding refresh or start one
    pub async fn refresh(&self) -> Result<(), RefreshError> {
        let (epoch, refresh) = {
            let mut slot = self.slot.lock();
            let epoch = slot.epoch;
            let refresh = match slot.in_flight.as_ref() {
                Some(current) => {
                    tracing::debug!(id = current.id, "Joining in-flight credential refresh");
                    current.refresh.clone()
                }
                None => {
                    let id = slot.next_id;
                    slot.next_id += 1;
                    let (refresh, abort) = self.start(id);
                    slot.in_flight = Some(InFlight {
                        id,
                        refresh: refresh.clone(),
                        abort,
                    });
                    refresh
                }
            };
            (epoch, refresh)
        };

        let outcome = refresh.await;

        if self.slot.lock().epoch != epoch {
            tracing::debug!("Discarding refresh outcome: session was reset");
            return Err(RefreshError::Cancelled);
        }
        outcome
    }

    fn start(&self, id: u64) -> (SharedRefresh, Option<AbortHandle>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let executor = Arc::clone(&self.executor);
        let request = self.request.clone();
        let timeout = self.timeout;
        let slot = Arc::clone(&self.slot);

        let call = async move {
            tracing::info!(path = %request.path, "Refreshing access credential");
            let outcome = match tokio::time::timeout(timeout, executor.execute(&request)).await {
                Err(_) => Err(RefreshError::TimedOut),
                Ok(Err(e)) => Err(RefreshError::Network(e.to_string())),
                Ok(Ok(response)) if response.is_success() => Ok(()),
                Ok(Ok(response)) => Err(RefreshError::Rejected {
                    status: response.status,
                }),
            };

            match &outcome {
                Ok(()) => tracing::info!("Access credential refreshed"),
                Err(e) => tracing::warn!("Credential refresh failed: {}", e),
            }
            slot.lock().release(id);
            outcome
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return (call.boxed().shared(), None);
        };

        let task = runtime.spawn(call);
        let abort = task.abort_handle();
        let refresh = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => Err(RefreshError::Cancelled),
                Err(e) => Err(RefreshError::Network(format!("refresh task failed: {e}"))),
            }
        };
        (refresh.boxed().shared(), Some(abort))
    }

    /// Abort the outstanding refresh; its waiters get [`RefreshError::Cancelled`]
    pub fn reset(&self) {
        let mut slot = self.slot.lock();
        slot.epoch += 1;
        if let Some(current) = slot.in_flight.take() {
            if let Some(abort) = current.abort {
                abort.abort();
            }
            tracing::debug!(id = current.id, "Cancelled in-flight credential refresh");
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.slot.lock().in_flight.is_some()
    }

    /// Number of refresh calls sent so far
    pub fn refresh_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("path", &self.request.path)
            .field("timeout", &self.timeout)
            .field("refreshing", &self.is_refreshing())
            .field("refresh_count", &self.refresh_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::request::ApiResponse;
    use async_trait::async_trait;

    struct SlowRefresh {
        delay: Duration,
        status: u16,
    }

    #[async_trait]
    impl HttpExecutor for SlowRefresh {
        async fn execute(&self, _: &RequestDescriptor) -> Result<ApiResponse> {
            tokio::time::sleep(self.delay).await;
            Ok(ApiResponse::new(self.status, ""))
        }
    }

    fn coordinator(delay: Duration, status: u16) -> Arc<RefreshCoordinator> {
        Arc::new(RefreshCoordinator::new(
            Arc::new(SlowRefresh { delay, status }),
            "/auth/refresh",
            Duration::from_secs(10),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let coordinator = coordinator(Duration::from_millis(100), 204);

        let results = futures::future::join_all((0..5).map(|_| {
            let coordinator = Arc::clone(&coordinator);
            async move { coordinator.refresh().await }
        }))
        .await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(coordinator.refresh_count(), 1);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_reaches_every_waiter() {
        let coordinator = coordinator(Duration::from_millis(100), 401);

        let results = futures::future::join_all((0..3).map(|_| {
            let coordinator = Arc::clone(&coordinator);
            async move { coordinator.refresh().await }
        }))
        .await;

        for result in results {
            assert_eq!(result, Err(RefreshError::Rejected { status: 401 }));
        }
        assert_eq!(coordinator.refresh_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_refresh_times_out() {
        let coordinator = coordinator(Duration::from_secs(3600), 204);
        assert_eq!(coordinator.refresh().await, Err(RefreshError::TimedOut));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_refreshes_are_separate_calls() {
        let coordinator = coordinator(Duration::from_millis(10), 204);
        coordinator.refresh().await.unwrap();
        coordinator.refresh().await.unwrap();
        assert_eq!(coordinator.refresh_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_outlives_the_caller_that_started_it() {
        let coordinator = coordinator(Duration::from_millis(100), 204);

        let starter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(coordinator.is_refreshing());

        starter.abort();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!coordinator.is_refreshing());

        // A later failure starts a new call instead of reusing the old outcome
        coordinator.refresh().await.unwrap();
        assert_eq!(coordinator.refresh_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_lets_next_caller_start_fresh() {
        let coordinator = coordinator(Duration::from_millis(100), 204);

        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.refresh().await })
        };
        tokio::task::yield_now().await;
        assert!(coordinator.is_refreshing());

        coordinator.reset();
        assert!(!coordinator.is_refreshing());

        let fresh = coordinator.refresh().await;
        assert!(fresh.is_ok());
        assert_eq!(waiter.await.unwrap(), Err(RefreshError::Cancelled));
        assert_eq!(coordinator.refresh_count(), 2);
    }
}
