// Embedder trait: the swap-ready abstraction.
//
// Both shells hold one Arc<dyn Embedder> for the whole process lifetime; the
// model is loaded once at startup and never per request.

use anyhow::Result;
use async_trait::async_trait;

/// Turns texts into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed every text, returning one vector per input in the same order.
    /// All vectors share the model's hidden size.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;

    /// Name reported by the health endpoint.
    fn model_name(&self) -> &str;
}
