//! Tracking of in-flight tests for graceful shutdown

use async_trait::async_trait;
use cloudperf_resilience::{ShutdownError, ShutdownHook};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Inner {
    active: Mutex<HashMap<u64, (String, CancellationToken)>>,
    next_id: AtomicU64,
    accepting: AtomicBool,
}

/// Registry of running tests; its shutdown hook waits for them to finish
#[derive(Clone)]
pub struct TestManager {
    inner: Arc<Inner>,
    root: CancellationToken,
}

impl TestManager {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                active: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                accepting: AtomicBool::new(true),
            }),
            root,
        }
    }

    /// Register a test. Returns `None` once shutdown has begun.
    pub fn begin(&self, name: &str) -> Option<TestGuard> {
        if !self.inner.accepting.load(Ordering::SeqCst) || self.root.is_cancelled() {
            return None;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        self.inner.active.lock().insert(id, (name.to_string(), token.clone()));
        debug!(test = name, id, "Test registered");

        Some(TestGuard {
            inner: self.inner.clone(),
            id,
            token,
        })
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    fn cancel_all(&self) {
        for (name, token) in self.inner.active.lock().values() {
            debug!(test = %name, "Cancelling test");
            token.cancel();
        }
    }
}

/// Registration of one running test, removed on drop
pub struct TestGuard {
    inner: Arc<Inner>,
    id: u64,
    token: CancellationToken,
}

impl TestGuard {
    /// Token cancelled when the test must stop
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        self.inner.active.lock().remove(&self.id);
    }
}

#[async_trait]
impl ShutdownHook for TestManager {
    fn name(&self) -> &str {
        "test_manager"
    }

    /// Stop accepting tests and wait for running ones until `deadline`.
    /// Tests still running then are cancelled.
    async fn shutdown(&self, deadline: Instant) -> Result<(), ShutdownError> {
        self.inner.accepting.store(false, Ordering::SeqCst);

        let active = self.active_count();
        if active > 0 {
            info!(active, "Waiting for in-flight tests to finish");
        }

        loop {
            let active = self.active_count();
            if active == 0 {
                debug!("No tests in flight");
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(active, "Tests still running at the shutdown deadline, cancelling them");
                self.cancel_all();
                return Err(ShutdownError::TasksRemaining(active));
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }
}
