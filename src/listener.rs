//! HTTP trigger mode: `GET /` for health checks, `/cert` to start a run.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use log::{error, info};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::lifecycle::LifecycleOrchestrator;

/// Parameters every triggered run uses.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub email: String,
    pub hostnames: Vec<String>,
    pub force_renew: bool,
}

struct ListenerState {
    orchestrator: Arc<LifecycleOrchestrator>,
    request: RunRequest,
    running: Mutex<()>,
}

#[derive(Debug, Default, Deserialize)]
struct TriggerQuery {
    force: Option<bool>,
}

pub fn router(orchestrator: Arc<LifecycleOrchestrator>, request: RunRequest) -> Router {
    let state = Arc::new(ListenerState {
        orchestrator,
        request,
        running: Mutex::new(()),
    });
    Router::new()
        .route("/", get(health_check))
        .route("/cert", get(trigger_run).post(trigger_run))
        .with_state(state)
}

pub async fn serve(
    port: u16,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("[listener] listening on {}", addr);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("[listener] stopped");
    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn trigger_run(
    State(state): State<Arc<ListenerState>>,
    Query(query): Query<TriggerQuery>,
) -> Response {
    // One run at a time; later triggers wait for the current one.
    let _running = state.running.lock().await;

    let orchestrator = Arc::clone(&state.orchestrator);
    let request = state.request.clone();
    let force = query.force.unwrap_or(request.force_renew);
    info!("[listener] run triggered (force={})", force);

    let result = tokio::task::spawn_blocking(move || {
        orchestrator.run(&request.email, &request.hostnames, force)
    })
    .await;

    match result {
        Ok(Ok(report)) => {
            let status = if report.has_failures() {
                StatusCode::MULTI_STATUS
            } else {
                StatusCode::OK
            };
            (status, Json(report)).into_response()
        }
        Ok(Err(err)) => {
            error!("[listener] run failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response()
        }
        Err(err) => {
            error!("[listener] run panicked: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "run aborted" })),
            )
                .into_response()
        }
    }
}
