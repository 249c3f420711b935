//! dogpost - photo-to-blog publisher
//!
//! Turns submitted dog photos into published blog posts:
//! - `serve`: HTTP trigger API
//! - `sweep`: one pass over the watch folder
//! - `submit`: run one saved trigger payload
//! - `models`: show candidate generation models

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dogpost_common::config::locate_config_file;
use dogpost_publisher::config::PublisherConfig;
use dogpost_publisher::services::gemini_client::{candidate_models, score_model, ModelStrategy};
use dogpost_publisher::services::normalizer::{FormEvent, SheetEditEvent, TriggerEvent};
use dogpost_publisher::services::GeminiClient;
use dogpost_publisher::workflow::PipelineOutcome;
use dogpost_publisher::{build_router, AppState, Services};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "dogpost")]
#[command(about = "Publish dog photos as AI-written blog posts")]
#[command(version)]
struct Cli {
    /// Config file (default: DOGPOST_CONFIG, then the user and system config dirs)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the trigger API
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(long, env = "DOGPOST_BIND")]
        bind: Option<String>,
    },
    /// Sweep the watch folder once
    Sweep,
    /// Run one trigger payload from a JSON file
    Submit {
        #[arg(value_enum)]
        kind: SubmitKind,
        file: PathBuf,
    },
    /// List candidate generation models in ranked order
    Models,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SubmitKind {
    Form,
    Sheet,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = locate_config_file(cli.config.as_deref());
    let config = PublisherConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    dogpost_common::logging::init(&config.logging).context("Failed to initialize logging")?;

    info!("Starting dogpost v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    match cli.command {
        Command::Serve { bind } => serve(&config, bind).await,
        Command::Sweep => sweep(&config).await,
        Command::Submit { kind, file } => submit(&config, kind, file).await,
        Command::Models => models(&config).await,
    }
}

async fn serve(config: &PublisherConfig, bind: Option<String>) -> Result<()> {
    let services = Services::build(config).context("Failed to build services")?;
    if services.sweeper.is_none() {
        warn!("Watch folders not configured; POST /sweep is disabled");
    }

    let state = AppState::new(services.pipeline, services.sweeper, services.status);
    let app = build_router(state);

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", bind))?;

    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn sweep(config: &PublisherConfig) -> Result<()> {
    let services = Services::build(config).context("Failed to build services")?;
    let sweeper = services
        .sweeper
        .context("FOLDER_ID and PROCESSED_FOLDER_ID must both be configured")?;

    let report = sweeper.sweep().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn submit(config: &PublisherConfig, kind: SubmitKind, file: PathBuf) -> Result<()> {
    let body = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let event = match kind {
        SubmitKind::Form => TriggerEvent::Form(
            serde_json::from_str::<FormEvent>(&body).context("Invalid form event")?,
        ),
        SubmitKind::Sheet => TriggerEvent::SheetEdit(
            serde_json::from_str::<SheetEditEvent>(&body).context("Invalid sheet edit event")?,
        ),
    };

    let services = Services::build(config).context("Failed to build services")?;
    let outcome = services.pipeline.process(&event).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if let PipelineOutcome::Failed { message, .. } = outcome {
        anyhow::bail!("Submission failed: {}", message);
    }
    Ok(())
}

async fn models(config: &PublisherConfig) -> Result<()> {
    let client = GeminiClient::new(&config.gemini)?;
    let listed = client
        .list_models()
        .await
        .map_err(|e| anyhow::anyhow!("Model listing failed: {}", e))?;

    let ranked = candidate_models(
        &listed,
        ModelStrategy::Ranked,
        &config.gemini.preferred_token,
        &config.gemini.default_model,
    );
    for model in ranked {
        println!("{:>3}  {}", score_model(&model), model);
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
