// Projection: UMAP to two dimensions, plus the fitted state that later
// requests place new points into.

pub mod ab;
pub mod state;
pub mod umap;
