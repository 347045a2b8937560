// Full clustering run over one keyword sheet, and topic placement into the
// projection it leaves behind.
//
// 1. Take the chosen field's embeddings: stored <field>_embed_* columns, or
//    embed the field's text inline when `vectorize` is set
// 2. Fit UMAP over the whole matrix (blocking pool)
// 3. Group the 2-D coordinates by topic into centroids
//
// The fitted ProjectionState is handed back to the caller, which decides
// where it lives (the server's slot, or nowhere for one-shot CLI runs).

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info};

use super::embed_texts;
use crate::cluster::centroids::{compute_centroids, TopicCentroid};
use crate::embed::matrix::EmbeddingMatrix;
use crate::embed::traits::Embedder;
use crate::error::{ClusterError, ClusterResult};
use crate::project::state::{Placement, ProjectionState};
use crate::project::umap::UmapParams;
use crate::sheet::model::{KeywordSheet, TextField};

/// Options for one run.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub field: TextField,
    pub params: UmapParams,
    /// Embed the field's text instead of reading stored embedding columns.
    pub vectorize: bool,
}

impl Default for ProcessRequest {
    fn default() -> Self {
        Self {
            field: TextField::Keyword,
            params: UmapParams::default(),
            vectorize: false,
        }
    }
}

/// One row of the response, with its projected position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordPoint {
    pub id: usize,
    pub keyword: String,
    pub traffic: i64,
    pub volume: i64,
    pub position: i64,
    pub kd: f64,
    pub topic: String,
    pub subtopic: String,
    pub url: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    pub keywords: Vec<KeywordPoint>,
    pub centroids: Vec<TopicCentroid>,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralTopicPoint {
    pub topic: String,
    pub x: f64,
    pub y: f64,
    pub is_general: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneralTopicsResponse {
    pub general_topics: Vec<GeneralTopicPoint>,
    /// `transform` or `refit_fallback`.
    pub mode: String,
}

/// Embed (or read), project and aggregate `sheet`.
pub async fn process_sheet(
    sheet: &KeywordSheet,
    embedder: &dyn Embedder,
    request: &ProcessRequest,
) -> ClusterResult<(ProcessResponse, ProjectionState)> {
    request.params.validate()?;
    if sheet.is_empty() {
        return Err(ClusterError::EmptySheet);
    }

    let field = request.field;
    let matrix = if request.vectorize {
        let texts = sheet
            .texts(field)
            .ok_or_else(|| ClusterError::MissingColumns(vec![field.column().to_string()]))?;
        info!(field = %field, rows = texts.len(), "Embedding column inline");
        embed_texts(embedder, &texts).await?
    } else {
        sheet
            .stored_embeddings(field)?
            .ok_or_else(|| ClusterError::MissingEmbeddings {
                prefix: field.embed_prefix(),
            })?
    };
    debug!(rows = matrix.len(), dims = matrix.dim(), "Embedding matrix ready");

    let params = request.params.clone();
    info!(
        rows = matrix.len(),
        n_neighbors = params.n_neighbors,
        min_dist = params.min_dist,
        "Fitting UMAP"
    );
    let state = tokio::task::spawn_blocking(move || ProjectionState::fit(&matrix, field, &params))
        .await
        .context("UMAP task panicked")??;

    let coords = state.coordinates();
    let labels: Vec<&str> = sheet.rows().iter().map(|r| r.topic.as_str()).collect();
    let (centroids, topics) = compute_centroids(&labels, coords)?;

    let keywords = sheet
        .rows()
        .iter()
        .zip(coords)
        .enumerate()
        .map(|(id, (row, point))| KeywordPoint {
            id,
            keyword: row.keyword.clone(),
            traffic: row.traffic,
            volume: row.volume,
            position: row.position,
            kd: row.kd,
            topic: row.topic.clone(),
            subtopic: row.subtopic.clone(),
            url: row.url.clone(),
            x: point[0],
            y: point[1],
        })
        .collect::<Vec<_>>();

    info!(
        keywords = keywords.len(),
        centroids = centroids.len(),
        "Clustering complete"
    );

    Ok((
        ProcessResponse {
            keywords,
            centroids,
            topics,
        },
        state,
    ))
}

/// Embed `topics` and place them into `state`'s projection, one point per
/// label as given. Only an all-blank list is rejected.
pub async fn place_topics(
    state: Arc<ProjectionState>,
    embedder: &dyn Embedder,
    topics: &[String],
) -> ClusterResult<GeneralTopicsResponse> {
    if topics.iter().all(|t| t.trim().is_empty()) {
        return Err(ClusterError::NoTopics);
    }

    info!(count = topics.len(), field = %state.field(), "Placing general topics");
    let matrix: EmbeddingMatrix = embed_texts(embedder, topics).await?;

    let placement: Placement = tokio::task::spawn_blocking(move || state.place(&matrix))
        .await
        .context("UMAP task panicked")?;
    let mode = placement.mode().to_string();
    let points = placement.into_points()?;

    let general_topics = topics
        .iter()
        .zip(points)
        .map(|(topic, point)| GeneralTopicPoint {
            topic: topic.clone(),
            x: point[0],
            y: point[1],
            is_general: true,
        })
        .collect();

    Ok(GeneralTopicsResponse {
        general_topics,
        mode,
    })
}
