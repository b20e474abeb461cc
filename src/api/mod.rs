// src/api/mod.rs

//! HTTP surface: JSON control endpoints plus an SSE output stream.
//!
//! | Route                        | Purpose                          |
//! |------------------------------|----------------------------------|
//! | `POST /api/run`              | start a script or command        |
//! | `GET  /api/stream/{task_id}` | live output as Server-Sent Events |
//! | `POST /api/stop/{task_id}`   | terminate a task                 |
//! | `GET  /api/tasks`            | snapshots of all known tasks     |
//! | `GET  /api/tasks/{task_id}`  | snapshot of one task             |

pub mod error;
pub mod handlers;
pub mod protocol;
pub mod sse;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::info;

use crate::errors::Result;
use crate::registry::TaskRegistry;

pub use error::ApiError;
pub use handlers::AppState;

pub fn router(registry: Arc<TaskRegistry>) -> Router {
    Router::new()
        .route("/api/run", post(handlers::run_task))
        .route("/api/stream/:task_id", get(handlers::stream_task))
        .route("/api/stop/:task_id", post(handlers::stop_task))
        .route("/api/tasks", get(handlers::list_tasks))
        .route("/api/tasks/:task_id", get(handlers::task_status))
        .with_state(AppState::new(registry))
}

/// Serve until `shutdown` resolves, then stop every task so open streams
/// end and the server can drain.
pub async fn serve<F>(listener: TcpListener, registry: Arc<TaskRegistry>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }

    let app = router(registry.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("shutdown requested");
            registry.terminate_all();
        })
        .await?;

    info!("server stopped");
    Ok(())
}
