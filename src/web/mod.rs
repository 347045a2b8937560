// Web server: Axum backend for the keyword map front end.
//
// POST /process_excel    upload a keyword sheet, get keywords + centroids
// POST /vectorize_topics place ad-hoc topic labels into the last projection
// GET  /health           liveness plus the loaded model's name
//
// Every failure is answered with {"error": message} and a 4xx/5xx status.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::embed::traits::Embedder;
use crate::error::ClusterError;
use crate::project::state::{empty_slot, ProjectionSlot};

pub mod handlers;

/// Shared application state threaded through all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub embedder: Arc<dyn Embedder>,
    pub projection: ProjectionSlot,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            projection: empty_slot(),
            config: Arc::new(config),
        }
    }
}

/// Start the Axum web server and block until it exits.
pub async fn run_server(state: AppState, port: u16, bind: &str) -> Result<()> {
    let app = build_router(state);

    let addr = format!("{bind}:{port}");
    info!("kwmap listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/process_excel", post(handlers::process::process_excel))
        .route("/vectorize_topics", post(handlers::topics::vectorize_topics))
        .route("/health", get(handlers::health::health))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Turn a pipeline error into its JSON response.
pub fn api_error(err: ClusterError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = err.to_string();
    if status.is_server_error() {
        error!(error = ?err, "Request failed");
    } else {
        warn!(%message, "Request rejected");
    }
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
