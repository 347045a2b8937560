// POST /process_excel: upload a keyword sheet and cluster it.
//
// Multipart fields:
//   file         the workbook (required)
//   vector_type  keyword | topic | subtopic (default keyword)
//   n_neighbors  UMAP neighborhood size (default 8)
//   min_dist     UMAP minimum distance (default 0.4)
//   vectorize    "true" embeds the chosen column inline (default false)
//
// A successful run replaces the server's projection slot.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;

use crate::error::{ClusterError, ClusterResult};
use crate::pipeline::process::{process_sheet, ProcessRequest};
use crate::sheet::model::KeywordSheet;
use crate::sheet::reader;
use crate::web::{api_error, AppState};

pub async fn process_excel(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    match run(state, multipart).await {
        Ok(response) => response,
        Err(e) => api_error(e),
    }
}

async fn run(
    state: AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> ClusterResult<Response> {
    let mut multipart = multipart.map_err(|_| ClusterError::NoFileUploaded)?;
    let limit = state.config.max_upload_bytes;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut request = ProcessRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| upload_error(e, limit))?;
                file = Some((filename, bytes.to_vec()));
            }
            "vector_type" | "n_neighbors" | "min_dist" | "vectorize" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| upload_error(e, limit))?;
                apply_form_field(&mut request, &name, value.trim())?;
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or(ClusterError::NoFileUploaded)?;
    info!(
        file = %filename,
        bytes = bytes.len(),
        vector_type = %request.field,
        n_neighbors = request.params.n_neighbors,
        min_dist = request.params.min_dist,
        vectorize = request.vectorize,
        "Processing upload"
    );

    let table = tokio::task::spawn_blocking(move || reader::read_bytes(bytes))
        .await
        .context("Spreadsheet reader panicked")??;
    let sheet = KeywordSheet::from_table(table)?;

    let (response, projection) =
        process_sheet(&sheet, state.embedder.as_ref(), &request).await?;
    *state.projection.write().await = Some(Arc::new(projection));

    Ok(Json(response).into_response())
}

/// The body limit surfaces as a 413 multipart error; anything else is a
/// malformed request.
fn upload_error(err: MultipartError, limit: usize) -> ClusterError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ClusterError::UploadTooLarge { limit }
    } else {
        ClusterError::InvalidParameter(format!("malformed upload: {err}"))
    }
}

/// Apply one form field to the request. Blank values keep the default.
fn apply_form_field(request: &mut ProcessRequest, name: &str, value: &str) -> ClusterResult<()> {
    if value.is_empty() {
        return Ok(());
    }
    match name {
        "vector_type" => request.field = value.parse()?,
        "n_neighbors" => {
            request.params.n_neighbors = value.parse().map_err(|_| {
                ClusterError::InvalidParameter(format!("n_neighbors must be an integer, got '{value}'"))
            })?;
        }
        "min_dist" => {
            request.params.min_dist = value.parse().map_err(|_| {
                ClusterError::InvalidParameter(format!("min_dist must be a number, got '{value}'"))
            })?;
        }
        "vectorize" => request.vectorize = value.eq_ignore_ascii_case("true"),
        _ => {}
    }
    Ok(())
}
