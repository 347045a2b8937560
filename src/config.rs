use std::env;
use std::path::PathBuf;

use anyhow::Result;

use crate::embed::download;

/// Default embedding batch size for ONNX inference.
pub const DEFAULT_EMBED_BATCH: usize = 64;

/// Default upload limit for POST /process_excel, in MiB.
pub const DEFAULT_MAX_UPLOAD_MB: usize = 64;

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the ONNX model files
    pub model_dir: PathBuf,
    /// HuggingFace resolve URL of the sentence embedding repo
    pub model_url: String,
    /// Name reported by GET /health
    pub model_name: String,
    /// Texts per ONNX inference call
    pub embed_batch: usize,
    /// Upload size limit for spreadsheets, in bytes
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables. Everything has a default.
    pub fn load() -> Result<Self> {
        let model_dir = env::var("KWMAP_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| download::default_model_dir());

        let model_url =
            env::var("KWMAP_MODEL_URL").unwrap_or_else(|_| download::DEFAULT_MODEL_URL.to_string());

        let model_name = env::var("KWMAP_MODEL_NAME")
            .unwrap_or_else(|_| download::model_name_from_url(&model_url));

        let embed_batch = parse_positive("KWMAP_EMBED_BATCH", DEFAULT_EMBED_BATCH)?;
        let max_upload_mb = parse_positive("KWMAP_MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB)?;

        Ok(Self {
            model_dir,
            model_url,
            model_name,
            embed_batch,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }

    /// Check that the embedding model has been downloaded.
    /// Call this before loading the embedder.
    pub fn require_model(&self) -> Result<()> {
        if !download::model_files_present(&self.model_dir) {
            anyhow::bail!(
                "Embedding model files not found in {}\n\
                 Run `kwmap download-model` to download them.",
                self.model_dir.display()
            );
        }
        Ok(())
    }
}

fn parse_positive(var: &str, default: usize) -> Result<usize> {
    match env::var(var) {
        Ok(raw) => {
            let value: usize = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{var} must be a positive integer, got '{raw}'"))?;
            if value == 0 {
                anyhow::bail!("{var} must be greater than zero");
            }
            Ok(value)
        }
        Err(_) => Ok(default),
    }
}
