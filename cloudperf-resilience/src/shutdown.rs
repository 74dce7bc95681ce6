//! Graceful shutdown coordination
//!
//! The coordinator owns the process-wide cancellation token and an ordered
//! list of shutdown hooks. Hooks run once, newest first, all bounded by one
//! shared deadline; the root token is cancelled after the last hook.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default time budget shared by all hooks
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// What started the shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT or ctrl-c
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGQUIT
    Quit,
    /// `shutdown()` or root cancellation from inside the process
    Requested,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "interrupt"),
            ShutdownSignal::Terminate => write!(f, "terminate"),
            ShutdownSignal::Quit => write!(f, "quit"),
            ShutdownSignal::Requested => write!(f, "requested"),
        }
    }
}

/// A component that must release resources during shutdown
#[async_trait::async_trait]
pub trait ShutdownHook: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Release resources before `deadline`
    async fn shutdown(&self, deadline: Instant) -> Result<(), ShutdownError>;
}

/// Graceful shutdown coordinator
pub struct ShutdownCoordinator {
    root: CancellationToken,
    hooks: Mutex<Vec<Arc<dyn ShutdownHook>>>,
    started: AtomicBool,
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator with the default timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Create a new shutdown coordinator with a custom overall timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            root: CancellationToken::new(),
            hooks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            timeout,
        }
    }

    /// The root cancellation token
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Register a hook; hooks run in reverse registration order
    pub fn register(&self, hook: Arc<dyn ShutdownHook>) {
        debug!(hook = hook.name(), "Registered shutdown hook");
        self.hooks.lock().push(hook);
    }

    /// Check if shutdown has started
    pub fn is_shutting_down(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Run all hooks once, then cancel the root token. Later calls return
    /// immediately. Returns the first hook error after every hook ran.
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Shutdown already performed, ignoring");
            return Ok(());
        }

        let hooks: Vec<Arc<dyn ShutdownHook>> = self.hooks.lock().iter().rev().cloned().collect();
        let deadline = Instant::now() + self.timeout;
        let mut first_error = None;

        info!(hooks = hooks.len(), timeout_secs = self.timeout.as_secs(), "Starting graceful shutdown");

        for hook in hooks {
            let name = hook.name().to_string();
            match timeout_at(deadline, hook.shutdown(deadline)).await {
                Ok(Ok(())) => {
                    debug!(hook = %name, "Shutdown hook completed");
                }
                Ok(Err(e)) => {
                    error!(hook = %name, error = %e, "Shutdown hook failed");
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    warn!(hook = %name, "Shutdown hook exceeded the shutdown deadline");
                    first_error.get_or_insert(ShutdownError::Timeout { hook: name });
                }
            }
        }

        self.root.cancel();

        match first_error {
            None => {
                info!("Graceful shutdown completed");
                Ok(())
            }
            Some(e) => Err(e),
        }
    }

    /// Wait for SIGINT, SIGTERM or SIGQUIT (or an in-process cancellation of
    /// the root token), then run the shutdown sequence
    pub async fn wait_for_signal(&self) -> Result<ShutdownSignal, ShutdownError> {
        let signal = tokio::select! {
            signal = termination_signal() => signal?,
            _ = self.root.cancelled() => ShutdownSignal::Requested,
        };

        info!(%signal, "Shutdown signal received");
        self.shutdown().await?;
        Ok(signal)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn termination_signal() -> Result<ShutdownSignal, ShutdownError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let signal = tokio::select! {
        _ = interrupt.recv() => ShutdownSignal::Interrupt,
        _ = terminate.recv() => ShutdownSignal::Terminate,
        _ = quit.recv() => ShutdownSignal::Quit,
    };
    Ok(signal)
}

#[cfg(not(unix))]
async fn termination_signal() -> Result<ShutdownSignal, ShutdownError> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownSignal::Interrupt)
}

/// Shutdown error types
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// A hook did not finish before the shared deadline
    #[error("shutdown hook '{hook}' exceeded the shutdown deadline")]
    Timeout { hook: String },

    /// Work still running when the deadline passed
    #[error("{0} tasks still active at the shutdown deadline")]
    TasksRemaining(usize),

    /// A hook reported a failure
    #[error("shutdown hook '{hook}' failed: {message}")]
    HookFailed { hook: String, message: String },

    /// Installing a signal handler failed
    #[error("failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}
