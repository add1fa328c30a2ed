//! Liveness and last-run status endpoints for service mode.

use std::sync::{Arc, RwLock};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;
use vdisc_core::RunSummary;

pub const CRATE_NAME: &str = "vdisc-web";

/// Shared slot holding the most recent run summary.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    last_run: Arc<RwLock<Option<RunSummary>>>,
}

impl StatusBoard {
    pub fn record(&self, summary: RunSummary) {
        let mut slot = self.last_run.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(summary);
    }

    pub fn last_run(&self) -> Option<RunSummary> {
        self.last_run
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

pub fn app(board: StatusBoard) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(board)
}

pub async fn serve(port: u16, board: StatusBoard) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "health endpoint listening");
    axum::serve(listener, app(board)).await?;
    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn status_handler(State(board): State<StatusBoard>) -> Response {
    match board.last_run() {
        Some(summary) => Json(summary).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "no run completed yet" })),
        )
            .into_response(),
    }
}
