//! Per-request resource registry
//!
//! Each request registers its cancellation token and any cleanup handlers
//! under a request id. Cleanup runs in reverse registration order so
//! dependents release before the things they depend on; handler failures
//! are logged and never re-raised past cleanup.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

type CleanupHandler =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send>;

#[derive(Default)]
struct RequestResources {
    token: Option<CancellationToken>,
    cleanups: Vec<(String, CleanupHandler)>,
}

/// Process-wide registry of per-request resources.
///
/// Created explicitly by the host (never during module initialization) and
/// shut down when the host stops.
#[derive(Default)]
pub struct ResourceManager {
    entries: Mutex<HashMap<Uuid, RequestResources>>,
}

impl ResourceManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a request and link its cancellation token.
    pub async fn register(&self, request_id: Uuid, token: CancellationToken) {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(request_id).or_default();
        entry.token = Some(token);
        debug!("Registered resources for request {}", request_id);
    }

    /// Add an async cleanup handler for a request. Handlers run in reverse
    /// registration order at release time.
    pub async fn add_cleanup<F, Fut>(&self, request_id: Uuid, label: impl Into<String>, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(request_id).or_default();
        entry
            .cleanups
            .push((label.into(), Box::new(move || Box::pin(handler()))));
    }

    /// Cancel a request's token, if registered.
    pub async fn cancel(&self, request_id: Uuid) {
        let entries = self.entries.lock().await;
        if let Some(entry) = entries.get(&request_id) {
            if let Some(token) = &entry.token {
                token.cancel();
            }
        }
    }

    /// Release a request: run its cleanup handlers in reverse order.
    /// Failures are logged, never propagated.
    pub async fn release(&self, request_id: Uuid) {
        let resources = {
            let mut entries = self.entries.lock().await;
            entries.remove(&request_id)
        };

        let Some(resources) = resources else {
            return;
        };

        for (label, cleanup) in resources.cleanups.into_iter().rev() {
            if let Err(message) = cleanup().await {
                warn!("Cleanup {label} for request {request_id} failed: {message}");
            }
        }
        debug!("Released resources for request {}", request_id);
    }

    /// Release everything (host shutdown).
    pub async fn shutdown(&self) {
        let ids: Vec<Uuid> = {
            let entries = self.entries.lock().await;
            entries.keys().copied().collect()
        };
        for id in ids {
            self.cancel(id).await;
            self.release(id).await;
        }
    }

    pub async fn active_requests(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_cleanup_runs_in_reverse_order() {
        let manager = ResourceManager::new();
        let id = Uuid::new_v4();
        let order = Arc::new(Mutex::new(Vec::new()));

        manager.register(id, CancellationToken::new()).await;
        for i in 0..3 {
            let order = order.clone();
            manager
                .add_cleanup(id, format!("step-{i}"), move || async move {
                    order.lock().await.push(i);
                    Ok(())
                })
                .await;
        }

        manager.release(id).await;
        assert_eq!(*order.lock().await, vec![2, 1, 0]);
        assert_eq!(manager.active_requests().await, 0);
    }

    #[tokio::test]
    async fn test_failed_cleanup_does_not_block_others() {
        let manager = ResourceManager::new();
        let id = Uuid::new_v4();
        let ran = Arc::new(AtomicUsize::new(0));

        manager.register(id, CancellationToken::new()).await;
        {
            let ran = ran.clone();
            manager
                .add_cleanup(id, "first", move || async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
        }
        manager
            .add_cleanup(id, "failing", || async { Err("boom".to_string()) })
            .await;

        manager.release(id).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_fires_token() {
        let manager = ResourceManager::new();
        let id = Uuid::new_v4();
        let token = CancellationToken::new();

        manager.register(id, token.clone()).await;
        manager.cancel(id).await;
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_release_unknown_id_is_noop() {
        tokio_test::block_on(async {
            let manager = ResourceManager::new();
            manager.release(Uuid::new_v4()).await;
            assert_eq!(manager.active_requests().await, 0);
        });
    }
}
