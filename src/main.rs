use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use kwmap::config::Config;
use kwmap::embed::onnx::SentenceEmbedder;
use kwmap::embed::traits::Embedder;
use kwmap::pipeline::process::{process_sheet, ProcessRequest};
use kwmap::pipeline::vectorize::VectorizeJob;
use kwmap::project::umap::{UmapParams, DEFAULT_MIN_DIST, DEFAULT_N_NEIGHBORS};
use kwmap::sheet::model::{KeywordSheet, TextField};

/// kwmap: semantic keyword clustering for SEO keyword sheets.
///
/// Embeds keyword, topic and subtopic text with a local sentence model and
/// projects it to a 2-D map where related keywords sit together.
#[derive(Parser)]
#[command(name = "kwmap", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append embedding columns to a keyword spreadsheet
    Vectorize {
        /// Input workbook (.xlsx, .xls or .ods) with Keyword and Topic columns
        input: PathBuf,

        /// Output workbook (default: <input>_vectorized.xlsx)
        output: Option<PathBuf>,
    },

    /// Run the HTTP API for the keyword map front end
    #[cfg(feature = "web")]
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "5000")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
    },

    /// Download the ONNX sentence embedding model
    DownloadModel,

    /// Cluster a spreadsheet offline and print topic centroids
    Cluster {
        /// Input workbook
        input: PathBuf,

        /// Which embeddings to project: keyword, topic or subtopic
        #[arg(long, default_value = "keyword")]
        vector_type: TextField,

        /// UMAP neighborhood size
        #[arg(long, default_value_t = DEFAULT_N_NEIGHBORS)]
        n_neighbors: usize,

        /// UMAP minimum distance between points
        #[arg(long, default_value_t = DEFAULT_MIN_DIST)]
        min_dist: f64,

        /// Embed the column now instead of reading stored embedding columns
        #[arg(long)]
        vectorize: bool,

        /// Also write the full response payload as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("kwmap=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Vectorize { input, output } => {
            let config = Config::load()?;

            // Validate the sheet before paying for the model load
            let job = VectorizeJob::open(&input, output.as_deref())?;
            config.require_model()?;

            println!("Vectorizing {} rows from {}...", job.rows(), input.display());
            let embedder = load_embedder(&config, true)?;
            let report = job.run(&embedder).await?;
            kwmap::output::terminal::display_vectorize_report(&report);
        }

        #[cfg(feature = "web")]
        Commands::Serve { port, bind } => {
            let config = Config::load()?;
            config.require_model()?;

            let embedder: Arc<dyn Embedder> = Arc::new(load_embedder(&config, false)?);
            info!(model = embedder.model_name(), "Embedding model loaded");

            let state = kwmap::web::AppState::new(config, embedder);
            kwmap::web::run_server(state, port, &bind).await?;
        }

        Commands::DownloadModel => {
            let config = Config::load()?;
            let model_dir = &config.model_dir;

            println!("Downloading sentence embedding model...");
            println!("  Source:      {}", config.model_url);
            println!("  Destination: {}", model_dir.display());

            kwmap::embed::download::download_model(model_dir, &config.model_url).await?;

            println!("\n{}", "Model downloaded successfully.".bold());
            println!("You can now run `kwmap vectorize <file.xlsx>` or `kwmap serve`.");
        }

        Commands::Cluster {
            input,
            vector_type,
            n_neighbors,
            min_dist,
            vectorize,
            json,
        } => {
            let config = Config::load()?;

            let table = kwmap::sheet::reader::read_path(&input)?;
            let sheet = KeywordSheet::from_table(table)?;
            let request = ProcessRequest {
                field: vector_type,
                params: UmapParams {
                    n_neighbors,
                    min_dist,
                    ..UmapParams::default()
                },
                vectorize,
            };
            request.params.validate()?;

            let embedder: Arc<dyn Embedder> = if vectorize {
                config.require_model()?;
                Arc::new(load_embedder(&config, true)?)
            } else {
                // Stored columns only; the model is never consulted
                Arc::new(UnloadedEmbedder(config.model_name.clone()))
            };

            let (response, _) = process_sheet(&sheet, embedder.as_ref(), &request).await?;
            kwmap::output::terminal::display_centroids(&response.centroids, response.keywords.len());

            if let Some(path) = json {
                write_json(&path, &response)?;
                println!("Response written to {}", path.display().to_string().cyan());
            }
        }
    }

    Ok(())
}

fn load_embedder(config: &Config, show_progress: bool) -> Result<SentenceEmbedder> {
    info!(dir = %config.model_dir.display(), "Loading sentence embedding model");
    Ok(
        SentenceEmbedder::load(&config.model_dir, &config.model_name, config.embed_batch)?
            .with_progress(show_progress),
    )
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Stand-in for `cluster` runs that read stored embedding columns, so the
/// ONNX model need not be downloaded.
struct UnloadedEmbedder(String);

#[async_trait::async_trait]
impl Embedder for UnloadedEmbedder {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f64>>> {
        anyhow::bail!("Embedding model not loaded; pass --vectorize to embed text")
    }

    fn model_name(&self) -> &str {
        &self.0
    }
}
