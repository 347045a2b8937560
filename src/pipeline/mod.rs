// Orchestration shared by the CLI and the HTTP server.
//
// vectorize: keyword sheet -> embeddings for every text column -> .xlsx
// process:   keyword sheet -> embeddings for one field -> UMAP -> centroids,
//            plus placement of ad-hoc topic labels into the last projection

pub mod process;
pub mod vectorize;

use anyhow::{Context, Result};

use crate::embed::matrix::EmbeddingMatrix;
use crate::embed::traits::Embedder;

/// Embed `texts`, checking the model returned one vector per text.
pub async fn embed_texts(embedder: &dyn Embedder, texts: &[String]) -> Result<EmbeddingMatrix> {
    let vectors = embedder
        .embed_batch(texts)
        .await
        .with_context(|| format!("Failed to embed {} texts", texts.len()))?;
    if vectors.len() != texts.len() {
        anyhow::bail!(
            "Embedder returned {} vectors for {} texts",
            vectors.len(),
            texts.len()
        );
    }
    EmbeddingMatrix::new(vectors)
}
