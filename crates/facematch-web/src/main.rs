use anyhow::{Context, Result};
use clap::Parser;
use facematch_core::{Annotator, Config, CosineMatcher, OnnxAnalyzer};
use facematch_web::{create_router, spawn_engine, AppState, ModelInfo};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facematch-web", about = "Face recognition web UI", version)]
struct Args {
    /// Config file (default: $FACEMATCH_CONFIG or ./facematch.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long)]
    bind: Option<String>,

    /// Folder of known faces
    #[arg(long)]
    gallery: Option<PathBuf>,

    /// Folder holding the ONNX models
    #[arg(long)]
    models: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(gallery) = args.gallery {
        config.gallery_dir = gallery;
    }
    if let Some(models) = args.models {
        config.model_dir = models;
    }

    tracing::info!(
        gallery = %config.gallery_dir.display(),
        models = %config.model_dir.display(),
        "facematch-web starting"
    );

    let analyzer = OnnxAnalyzer::from_config(&config).context("failed to load face models")?;
    let annotator = Annotator::new(&config.annotate)?;
    let matcher = CosineMatcher::new(config.matching.min_similarity);
    let engine = spawn_engine(
        Box::new(analyzer),
        matcher,
        annotator,
        config.gallery_dir.clone(),
    )?;

    let models = ModelInfo {
        detector: config.detector_model.clone(),
        recognizer: config.recognizer_model.clone(),
    };
    let app = create_router(AppState::new(engine, models, config.server.max_upload_bytes));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "facematch-web ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("facematch-web shutting down");
    Ok(())
}
