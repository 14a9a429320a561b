//! Gantry Digital Twin - orchestration server
//!
//! # Usage
//!
//! ```bash
//! # Against Elasticsearch (ELASTIC_ES_URL / ELASTIC_ES_API_KEY from env or .env)
//! cargo run --release
//!
//! # Fully offline with in-memory telemetry and personnel
//! cargo run --release -- --offline
//!
//! # Explicit config file and bind address
//! ./gantry-twin --config gantry.toml --addr 127.0.0.1:8000
//! ```
//!
//! # Environment Variables
//!
//! - `GANTRY_CONFIG`: Path to the TOML config (default: ./gantry.toml)
//! - `GANTRY_SERVER_ADDR`: Bind address override
//! - `GANTRY_CORS_ORIGINS`: Comma-separated allowed origins
//! - `ELASTIC_*`: Store and assistant endpoints / keys
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use axum::Router;
use gantry_twin::api::{create_app, DashboardState};
use gantry_twin::config::TwinConfig;
use gantry_twin::pipeline::{Collaborators, TwinRuntime};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "gantry-twin")]
#[command(about = "Gantry Digital Twin orchestration server")]
#[command(version)]
struct CliArgs {
    /// Override the server address (default: "0.0.0.0:8000")
    #[arg(short, long, value_name = "HOST:PORT")]
    addr: Option<String>,

    /// Path to a TOML config file (overrides GANTRY_CONFIG / ./gantry.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use in-memory telemetry and personnel instead of Elasticsearch
    #[arg(long, env = "GANTRY_OFFLINE")]
    offline: bool,
}

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    AutoTrigger,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::AutoTrigger => write!(f, "AutoTrigger"),
        }
    }
}

// ============================================================================
// Startup
// ============================================================================

fn load_config(args: &CliArgs) -> Result<TwinConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut cfg = TwinConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            cfg.apply_env_overrides();
            cfg
        }
        None => TwinConfig::load(),
    };
    if let Some(addr) = &args.addr {
        config.server.addr.clone_from(addr);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Spawn the auto-trigger poller when enabled.
fn spawn_auto_trigger(
    task_set: &mut JoinSet<Result<TaskName>>,
    runtime: &TwinRuntime,
    cancel_token: CancellationToken,
) {
    if !runtime.config.auto_trigger.enabled {
        info!("[AutoTrigger] Disabled, failures arrive via POST /api/broadcast-alert");
        return;
    }
    let poller = runtime.auto_trigger();
    task_set.spawn(async move {
        poller.run(cancel_token).await;
        Ok(TaskName::AutoTrigger)
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let in-flight tasks observe the cancellation and drain.
    while let Some(result) = task_set.join_next().await {
        if let Ok(Ok(task_name)) = result {
            info!("Supervisor: Task {} stopped", task_name);
        }
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real environment variables win.
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment from .env");
    }

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    let server_addr = config.server.addr.clone();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Gantry Digital Twin");
    info!("  Predictive maintenance orchestration core");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let collaborators =
        Collaborators::from_config(&config, args.offline).context("Failed to initialize upstream clients")?;
    if !config.narration.pacing_enabled {
        warn!("[Narrator] Pacing disabled, narrated steps are sent back to back");
    }
    let runtime = Arc::new(TwinRuntime::new(config, collaborators));

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind {server_addr}"))?;
    info!("[HttpServer] Listening on http://{}", server_addr);

    let app = create_app(DashboardState::new(Arc::clone(&runtime)));

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    spawn_auto_trigger(&mut task_set, &runtime, cancel_token.clone());

    run_supervisor(&mut task_set, cancel_token).await?;

    info!("Gantry Digital Twin shutdown complete");
    Ok(())
}
