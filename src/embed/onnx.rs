// Local ONNX sentence embedder.
//
// Runs a BERT-family sentence-transformer exported to ONNX (default:
// paraphrase-multilingual-MiniLM-L12-v2, which handles Spanish and English
// keyword sheets). Token states are mean-pooled with the attention mask, which
// is how the sentence-transformers checkpoints were trained.
//
// The hidden size is read from the model output rather than hardcoded, so any
// BERT-style checkpoint exported with input_ids / attention_mask /
// token_type_ids inputs works.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::debug;

use super::download::{MODEL_FILE, TOKENIZER_FILE};
use super::traits::Embedder;

/// Sentence embedder using a local ONNX model.
///
/// Arc<Mutex<Session>> because Session::run takes &mut self and
/// spawn_blocking needs 'static ownership; Arc<Tokenizer> for the same reason.
pub struct SentenceEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    pad_id: i64,
    batch_size: usize,
    show_progress: bool,
    name: String,
}

impl SentenceEmbedder {
    /// Load the sentence embedding model and tokenizer from the given directory.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in the directory.
    /// Call `download_model()` first if they don't exist.
    pub fn load(model_dir: &Path, name: &str, batch_size: usize) -> Result<Self> {
        let model_path = model_dir.join(MODEL_FILE);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE);

        if !model_path.exists() {
            anyhow::bail!(
                "Embedding model not found: {}\nRun `kwmap download-model` to download it.",
                model_path.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Embedding tokenizer not found: {}\nRun `kwmap download-model` to download it.",
                tokenizer_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| {
                format!(
                    "Failed to load embedding model from {}",
                    model_path.display()
                )
            })?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load embedding tokenizer: {}", e))?;

        let pad_id = tokenizer
            .get_padding()
            .map(|p| p.pad_id)
            .or_else(|| tokenizer.token_to_id("[PAD]"))
            .or_else(|| tokenizer.token_to_id("<pad>"))
            .unwrap_or(0) as i64;

        debug!(
            model = name,
            pad_id, "Loaded sentence embedding model from {}",
            model_dir.display()
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            pad_id,
            batch_size: batch_size.max(1),
            show_progress: false,
            name: name.to_string(),
        })
    }

    /// Draw a progress bar while embedding (CLI only).
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}

#[async_trait]
impl Embedder for SentenceEmbedder {
    /// CPU-bound work is offloaded to spawn_blocking to keep the async
    /// runtime responsive.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let texts = texts.to_vec();
        let pad_id = self.pad_id;
        let batch_size = self.batch_size;
        let show_progress = self.show_progress;

        tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f64>>> {
            let pb = show_progress.then(|| progress_bar(texts.len() as u64));
            let mut out = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(batch_size) {
                out.extend(embed_sync(&session, &tokenizer, chunk, pad_id)?);
                if let Some(ref pb) = pb {
                    pb.inc(chunk.len() as u64);
                }
            }
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            Ok(out)
        })
        .await
        .context("spawn_blocking panicked")?
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::default_bar().template("    [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

/// Synchronous embedding of one chunk: tokenization, inference, mean pooling.
fn embed_sync(
    session: &Arc<Mutex<Session>>,
    tokenizer: &Arc<Tokenizer>,
    texts: &[String],
    pad_id: i64,
) -> Result<Vec<Vec<f64>>> {
    let encodings: Vec<_> = texts
        .iter()
        .map(|t| {
            tokenizer
                .encode(t.as_str(), true)
                .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
        })
        .collect::<Result<Vec<_>>>()?;

    let batch_size = encodings.len();
    let max_len = encodings
        .iter()
        .map(|e| e.get_ids().len())
        .max()
        .unwrap_or(0);

    if max_len == 0 {
        anyhow::bail!("Tokenizer produced no tokens (missing special tokens?)");
    }

    // input_ids padded with the tokenizer's pad id, attention_mask 0 on
    // padding, token_type_ids all zeros for single-sentence input.
    let mut input_ids_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let mut attention_mask_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let token_type_ids_flat: Vec<i64> = vec![0; batch_size * max_len];

    for enc in &encodings {
        let ids = enc.get_ids();
        let mask = enc.get_attention_mask();
        let pad_len = max_len - ids.len();

        input_ids_flat.extend(ids.iter().map(|&id| id as i64));
        attention_mask_flat.extend(mask.iter().map(|&m| m as i64));
        input_ids_flat.extend(std::iter::repeat_n(pad_id, pad_len));
        attention_mask_flat.extend(std::iter::repeat_n(0i64, pad_len));
    }

    let shape = [batch_size as i64, max_len as i64];

    let input_ids_tensor =
        Tensor::from_array((shape, input_ids_flat)).context("Failed to create input_ids tensor")?;
    let attention_mask_tensor = Tensor::from_array((shape, attention_mask_flat.clone()))
        .context("Failed to create attention_mask tensor")?;
    let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids_flat))
        .context("Failed to create token_type_ids tensor")?;

    // Output 0 is last_hidden_state: [batch, seq_len, hidden]
    let hidden_states = {
        let mut session = session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            })
            .context("Embedding ONNX inference failed")?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract embedding output tensor")?;

        data.to_vec()
    };

    let tokens = batch_size * max_len;
    if hidden_states.is_empty() || hidden_states.len() % tokens != 0 {
        anyhow::bail!(
            "Unexpected embedding output size {} for {} tokens",
            hidden_states.len(),
            tokens
        );
    }
    let dim = hidden_states.len() / tokens;

    let embeddings = mean_pool(&hidden_states, &attention_mask_flat, batch_size, max_len, dim);

    debug!(batch_size, dim, "Computed sentence embeddings");

    Ok(embeddings)
}

/// Average token states weighted by the attention mask.
///
/// `hidden` is [batch, seq_len, dim] flattened, `mask` is [batch, seq_len].
/// A row whose mask is all zeros pools to the zero vector.
pub fn mean_pool(
    hidden: &[f32],
    mask: &[i64],
    batch_size: usize,
    seq_len: usize,
    dim: usize,
) -> Vec<Vec<f64>> {
    let mut embeddings = Vec::with_capacity(batch_size);

    for i in 0..batch_size {
        let mut sum = vec![0.0_f64; dim];
        let mut mask_sum = 0.0_f64;

        for j in 0..seq_len {
            let mask_val = mask[i * seq_len + j] as f64;
            if mask_val > 0.0 {
                mask_sum += mask_val;
                let offset = (i * seq_len + j) * dim;
                for (k, acc) in sum.iter_mut().enumerate() {
                    *acc += hidden[offset + k] as f64 * mask_val;
                }
            }
        }

        if mask_sum > 0.0 {
            for val in &mut sum {
                *val /= mask_sum;
            }
        }

        embeddings.push(sum);
    }

    embeddings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pool_ignores_padding() {
        // batch 1, seq 3, dim 2; last token is padding
        let hidden = [1.0, 2.0, 3.0, 4.0, 100.0, 100.0];
        let mask = [1, 1, 0];
        let pooled = mean_pool(&hidden, &mask, 1, 3, 2);
        assert_eq!(pooled.len(), 1);
        assert!((pooled[0][0] - 2.0).abs() < 1e-9);
        assert!((pooled[0][1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_pool_rows_independent() {
        // batch 2, seq 2, dim 1
        let hidden = [1.0, 3.0, 10.0, 0.0];
        let mask = [1, 1, 1, 0];
        let pooled = mean_pool(&hidden, &mask, 2, 2, 1);
        assert!((pooled[0][0] - 2.0).abs() < 1e-9);
        assert!((pooled[1][0] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_pool_all_masked_is_zero() {
        let hidden = [5.0, 5.0];
        let mask = [0, 0];
        let pooled = mean_pool(&hidden, &mask, 1, 2, 1);
        assert_eq!(pooled[0], vec![0.0]);
    }

    #[test]
    fn test_load_missing_model_mentions_download() {
        let dir = std::env::temp_dir().join("kwmap-test-no-model");
        let err = SentenceEmbedder::load(&dir, "test", 8).err().unwrap();
        assert!(err.to_string().contains("download-model"));
    }
}
