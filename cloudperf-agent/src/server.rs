//! Health endpoint server

use crate::health::{HealthRegistry, HealthStatus};
use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use cloudperf_resilience::{ShutdownError, ShutdownHook};
use parking_lot::Mutex;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Build the health router
pub fn router(health: Arc<HealthRegistry>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(live_handler))
        .route("/health/ready", get(ready_handler))
        .with_state(health)
}

async fn health_handler(State(health): State<Arc<HealthRegistry>>) -> impl IntoResponse {
    let report = health.snapshot();
    let status = if report.status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn live_handler() -> impl IntoResponse {
    Json(json!({ "status": "alive" }))
}

async fn ready_handler(State(health): State<Arc<HealthRegistry>>) -> impl IntoResponse {
    if health.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "not ready" })))
    }
}

/// Running health server
pub struct HealthServer {
    local_addr: SocketAddr,
    stop: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthServer {
    /// Bind `addr` and serve until shut down
    pub async fn start(addr: SocketAddr, health: Arc<HealthRegistry>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let stop = CancellationToken::new();

        let app = router(health);
        let shutdown = stop.clone().cancelled_owned();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                error!(error = %e, "Health server failed");
            }
        });

        info!(address = %local_addr, "Health server listening");
        Ok(Self {
            local_addr,
            stop,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl ShutdownHook for HealthServer {
    fn name(&self) -> &str {
        "health_server"
    }

    async fn shutdown(&self, deadline: Instant) -> Result<(), ShutdownError> {
        self.stop.cancel();
        let Some(task) = self.task.lock().take() else {
            return Ok(());
        };

        match timeout_at(deadline, task).await {
            Ok(Ok(())) => {
                info!("Health server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ShutdownError::HookFailed {
                hook: self.name().to_string(),
                message: e.to_string(),
            }),
            Err(_) => {
                warn!("Health server did not stop before the shutdown deadline");
                Err(ShutdownError::Timeout {
                    hook: self.name().to_string(),
                })
            }
        }
    }
}
