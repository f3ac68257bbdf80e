use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use filemorph_core::{
    load_config, load_config_from_env, probe_tool, validate_config, Config, ConfigError,
    ConversionOrchestrator, FormatRegistry, JobScheduler, ProcessSupervisor, ToolKind,
    WorkspaceManager,
};
use filemorph_server::{
    api::create_router,
    state::{AppState, Orchestrator, SharedSupervisor},
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extra time allowed past the kill grace period for jobs to clean up.
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());

    let json = std::env::var("FILEMORPH_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Loads the config file, or defaults plus environment when it is absent.
fn read_config(path: &Path) -> Result<Config> {
    match load_config(path) {
        Ok(config) => {
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        Err(ConfigError::FileNotFound(_)) => {
            info!(
                "No config file at {:?}, using defaults and environment",
                path
            );
            load_config_from_env().context("Failed to load config from environment")
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load config from {:?}", path)),
    }
}

/// Logs a warning for every configured tool that cannot be started.
async fn check_tools(config: &Config) {
    for kind in [ToolKind::Transcoder, ToolKind::Markup, ToolKind::Typesetter] {
        let tool = config.tools.get(kind);
        match probe_tool(&tool.program, kind.version_arg()).await {
            Ok(version) => info!(
                tool = kind.as_str(),
                program = %tool.program.display(),
                %version,
                "Tool available"
            ),
            Err(e) => warn!(
                tool = kind.as_str(),
                program = %tool.program.display(),
                error = %e,
                "Tool unavailable; conversions needing it will fail"
            ),
        }
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    init_logging();
    info!("filemorph {} starting", VERSION);

    // Determine config path
    let config_path = std::env::var("FILEMORPH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load and validate configuration
    let config = read_config(&config_path)?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Scratch root: {:?}", config.scratch.root);
    info!(
        "Execution slots: {}",
        config.scheduler.max_concurrent_jobs
    );

    // Prepare the scratch root
    let (workspaces, swept) =
        WorkspaceManager::init(config.scratch.root.clone(), config.scratch.sweep_on_startup)
            .await
            .context("Failed to prepare scratch root")?;
    if swept > 0 {
        info!("Removed {} leftover entries from a previous run", swept);
    }

    // Build the format registry
    let registry = FormatRegistry::from_config(&config).context("Invalid recipe table")?;
    info!("Registered {} conversion recipes", registry.len());

    // Probe tools in the background; a missing tool only fails its conversions
    let probe_config = config.clone();
    tokio::spawn(async move { check_tools(&probe_config).await });

    // Wire the orchestrator
    let supervisor: SharedSupervisor = Arc::new(ProcessSupervisor::new(config.supervisor.clone()));
    let orchestrator = ConversionOrchestrator::new(
        Arc::new(registry),
        JobScheduler::new(&config.scheduler),
        workspaces,
        supervisor,
    );

    // Create app state and router
    let state = Arc::new(AppState::new(config.clone(), orchestrator.clone()));
    let app = create_router(state);
    let shutdown_wait = config.supervisor.kill_grace() + SHUTDOWN_MARGIN;

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown. Conversions are cancelled first so
    // the open upload requests can finish.
    let draining = orchestrator.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown requested, cancelling conversions");
            stop_conversions(&draining, shutdown_wait).await;
        })
        .await
        .context("Server error")?;

    // Anything submitted while connections drained
    stop_conversions(&orchestrator, shutdown_wait).await;

    info!("Server shut down");
    Ok(())
}

/// Cancels running conversions so no tool process outlives the server.
async fn stop_conversions(orchestrator: &Orchestrator, wait: Duration) {
    match orchestrator.shutdown(wait).await {
        Ok(0) => {}
        Ok(cancelled) => info!("Cancelled {} unfinished conversions", cancelled),
        Err(remaining) => warn!("{} conversions did not stop in time", remaining),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
