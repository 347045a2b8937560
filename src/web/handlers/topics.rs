// POST /vectorize_topics: place general topic labels into the projection left
// by the last /process_excel run.
//
// Body: {"topics": ["..."], "vector_type": "keyword"}
// Returns 400 when no topics are given or no projection exists yet.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::pipeline::process::place_topics;
use crate::project::state::require_projection;
use crate::sheet::model::TextField;
use crate::web::{api_error, AppState};

#[derive(Debug, Deserialize)]
pub struct TopicsRequest {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub vector_type: Option<String>,
}

pub async fn vectorize_topics(
    State(state): State<AppState>,
    body: Result<Json<TopicsRequest>, JsonRejection>,
) -> Response {
    match run(state, body).await {
        Ok(response) => response,
        Err(e) => api_error(e),
    }
}

async fn run(
    state: AppState,
    body: Result<Json<TopicsRequest>, JsonRejection>,
) -> ClusterResult<Response> {
    let Json(request) = body.map_err(|e| ClusterError::InvalidParameter(e.body_text()))?;

    // Labels are placed as given; only an all-blank list is rejected
    if request.topics.iter().all(|t| t.trim().is_empty()) {
        return Err(ClusterError::NoTopics);
    }

    let projection = require_projection(&*state.projection.read().await)?;

    // Topic labels are always embedded as text; vector_type only has to name
    // a real field.
    if let Some(raw) = request.vector_type.as_deref().filter(|s| !s.trim().is_empty()) {
        let field: TextField = raw.parse()?;
        if field != projection.field() {
            debug!(
                requested = %field,
                projected = %projection.field(),
                "vector_type differs from the projection's field"
            );
        }
    }

    let response = place_topics(projection, state.embedder.as_ref(), &request.topics).await?;
    Ok(Json(response).into_response())
}
