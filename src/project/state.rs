// The fitted projection a spreadsheet run leaves behind, and placement of new
// vectors (topic labels) into it.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::umap::{self, FittedUmap, Point2, TransformError, UmapParams};
use crate::embed::matrix::EmbeddingMatrix;
use crate::error::{ClusterError, ClusterResult};
use crate::sheet::model::TextField;

/// Session slot holding the last successful projection. Replaced wholesale
/// by every spreadsheet run.
pub type ProjectionSlot = Arc<RwLock<Option<Arc<ProjectionState>>>>;

pub fn empty_slot() -> ProjectionSlot {
    Arc::new(RwLock::new(None))
}

/// A full-matrix fit and the field its vectors came from.
#[derive(Debug)]
pub struct ProjectionState {
    model: FittedUmap,
    field: TextField,
}

/// Outcome of placing new vectors into an existing projection.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// Placed against the frozen training layout.
    Transformed(Vec<Point2>),
    /// The model couldn't transform; these are the new rows' coordinates from
    /// a re-fit over training + new rows.
    RefitFallback { points: Vec<Point2>, reason: String },
    Failed(String),
}

impl Placement {
    /// `transform` / `refit_fallback`, as reported over HTTP.
    pub fn mode(&self) -> &'static str {
        match self {
            Placement::Transformed(_) => "transform",
            Placement::RefitFallback { .. } => "refit_fallback",
            Placement::Failed(_) => "failed",
        }
    }

    pub fn into_points(self) -> anyhow::Result<Vec<Point2>> {
        match self {
            Placement::Transformed(points) | Placement::RefitFallback { points, .. } => Ok(points),
            Placement::Failed(reason) => anyhow::bail!("Could not place topics: {reason}"),
        }
    }
}

impl ProjectionState {
    /// Fit a fresh projection over `matrix`.
    pub fn fit(matrix: &EmbeddingMatrix, field: TextField, params: &UmapParams) -> anyhow::Result<Self> {
        let model = umap::fit(matrix.rows(), params)?;
        Ok(Self { model, field })
    }

    /// Coordinates of the rows the projection was fit on.
    pub fn coordinates(&self) -> &[Point2] {
        self.model.embedding()
    }

    pub fn field(&self) -> TextField {
        self.field
    }

    pub fn params(&self) -> &UmapParams {
        self.model.params()
    }

    pub fn training(&self) -> &[Vec<f64>] {
        self.model.training()
    }

    /// Place `matrix` into this projection. Transform first; when the model
    /// can't transform, re-fit over training + new rows with the same params
    /// and keep the tail.
    pub fn place(&self, matrix: &EmbeddingMatrix) -> Placement {
        match self.model.transform(matrix.rows()) {
            Ok(points) => {
                debug!(placed = points.len(), "Transformed into existing projection");
                Placement::Transformed(points)
            }
            Err(TransformError::Invalid(reason)) => Placement::Failed(reason),
            Err(TransformError::Unsupported(reason)) => {
                warn!(%reason, "Transform unavailable, re-fitting with new points appended");
                let mut combined = self.model.training().to_vec();
                combined.extend(matrix.rows().iter().cloned());
                match umap::fit(&combined, self.model.params()) {
                    Ok(refit) => {
                        let n_train = self.model.training().len();
                        Placement::RefitFallback {
                            points: refit.embedding()[n_train..].to_vec(),
                            reason,
                        }
                    }
                    Err(e) => Placement::Failed(format!("{reason}; re-fit failed: {e:#}")),
                }
            }
        }
    }
}

/// The current projection, or `NoProjection` if no spreadsheet has been run.
pub fn require_projection(slot: &Option<Arc<ProjectionState>>) -> ClusterResult<Arc<ProjectionState>> {
    slot.clone().ok_or(ClusterError::NoProjection)
}
