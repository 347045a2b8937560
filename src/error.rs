// User-facing error taxonomy.
//
// Internals return anyhow::Result with context. The pipeline lifts those into
// ClusterError::Processing so both shells can turn any failure into one
// message: the CLI prints it and exits non-zero, the HTTP layer maps it to a
// status code and an {"error": ...} payload.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Input file '{}' does not exist", .0.display())]
    InputNotFound(PathBuf),

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("No file received")]
    NoFileUploaded,

    #[error("Uploaded file is larger than the {limit} byte limit")]
    UploadTooLarge { limit: usize },

    #[error("The spreadsheet has no data rows")]
    EmptySheet,

    #[error("Load a spreadsheet first to build the projection space")]
    NoProjection,

    #[error("No topics received")]
    NoTopics,

    #[error("No {prefix}* columns found. Enable the vectorize option to embed the sheet inline")]
    MissingEmbeddings { prefix: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Could not read spreadsheet: {0}")]
    Spreadsheet(String),

    #[error(transparent)]
    Processing(#[from] anyhow::Error),
}

impl ClusterError {
    /// HTTP status for this error. Everything the caller can fix is a 400
    /// (413 for oversized uploads); library failures are a 500.
    pub fn status_code(&self) -> u16 {
        match self {
            ClusterError::Processing(_) => 500,
            ClusterError::UploadTooLarge { .. } => 413,
            _ => 400,
        }
    }
}

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;
