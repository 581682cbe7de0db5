//! Coursegen CLI
//!
//! Main entry point for running the course generation server.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use coursegen_gateway::{
    CachedVideoSearch, GeminiClient, TextGenerator, VideoSearch, YouTubeSearch,
};
use coursegen_orchestrator::{
    create_router, AppState, Config, CourseStore, MemoryStore, GEMINI_API_KEY_ENV,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Coursegen - AI course generation server
///
/// Generates structured courses on any topic with a language model and
/// serves them, with lazily generated lessons and progress tracking, over a
/// JSON API.
#[derive(Parser, Debug)]
#[command(name = "coursegen")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: coursegen.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Address to bind the HTTP API server to
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port for the HTTP API server
    #[arg(short, long)]
    port: Option<u16>,

    /// JSON file the store is loaded from at start and saved to on shutdown
    #[arg(short, long, value_name = "FILE")]
    snapshot: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Coursegen starting");
    tracing::debug!(config = ?args.config, "Config file");

    match run_server(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Loads configuration, wires the services and serves until Ctrl+C.
async fn run_server(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    config.apply_env_overrides();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(snapshot) = args.snapshot {
        config.store.snapshot_path = Some(snapshot);
    }

    // Re-validate after overrides
    config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;

    print_config(&config);

    let generator: Arc<dyn TextGenerator> = Arc::new(
        GeminiClient::new(config.gemini.clone()).map_err(|e| {
            anyhow::anyhow!(
                "{e}\n\nSuggestion: Export {GEMINI_API_KEY_ENV} or set gemini.apiKey in coursegen.json"
            )
        })?,
    );

    let store = Arc::new(match config.store.snapshot_path.as_deref() {
        Some(path) => MemoryStore::open(path)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?,
        None => MemoryStore::new(),
    });

    let mut state = AppState::new(
        generator,
        store.clone() as Arc<dyn CourseStore>,
        config.generation.clone(),
    );
    if let Some(videos) = build_video_search(&config)? {
        state = state.with_video_search(videos);
    } else {
        tracing::info!("Video search disabled (no YouTube API key)");
    }

    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            anyhow::anyhow!(
                "Invalid listen address '{}:{}': {e}\n\nSuggestion: Use an IP address for --host",
                config.server.host,
                config.server.port
            )
        })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("HTTP API server running on http://{addr}/api");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))?;

    store
        .save_snapshot()
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    tracing::info!("Coursegen stopped");
    Ok(())
}

fn build_video_search(config: &Config) -> anyhow::Result<Option<Arc<dyn VideoSearch>>> {
    if !config.video_search.has_api_key() {
        return Ok(None);
    }

    let youtube = YouTubeSearch::new(config.video_search.clone())
        .map_err(|e| anyhow::anyhow!("Failed to set up video search: {e}"))?;
    let cached = CachedVideoSearch::from_config(Arc::new(youtube), &config.video_search);
    Ok(Some(Arc::new(cached)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    tracing::info!("Received Ctrl+C, shutting down");
}

/// Loads configuration from a path or the current directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Listen address: {}:{}", config.server.host, config.server.port);
    println!("  Model: {}", config.gemini.model);
    println!(
        "  Generation attempts: {}",
        config.generation.generation_attempts
    );
    println!(
        "  Video search: {}",
        if config.video_search.has_api_key() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "  Store snapshot: {}",
        config.store.snapshot_path.as_deref().unwrap_or("none")
    );
}
