use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gophermart_core::{
    load_config, load_config_from_env, validate_config, AccrualReconciler, AccrualService,
    Config, HttpAccrualClient, LogFormat, LoggingConfig, OrderStore, SqliteOrderStore,
    StoreHealthCheck,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Config file used when `GOPHERMART_CONFIG` is not set.
const DEFAULT_CONFIG_PATH: &str = "gophermart.toml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Logging may not be initialized yet.
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = load()?;
    validate_config(&config).context("Configuration validation failed")?;

    init_logging(&config.logging);
    info!(version = VERSION, "Starting gophermart");
    info!(
        accrual = %config.accrual.base_url,
        database = %config.database.path.display(),
        workers = config.reconciler.worker_count,
        "Configuration loaded"
    );

    if !config.reconciler.enabled {
        warn!("Reconciler disabled in configuration, nothing to do");
        return Ok(());
    }

    let store: Arc<dyn OrderStore> = Arc::new(
        SqliteOrderStore::new(&config.database.path).context("Failed to open order store")?,
    );
    info!("Order store initialized");

    let accrual: Arc<dyn AccrualService> = Arc::new(
        HttpAccrualClient::new(config.accrual.clone())
            .context("Failed to create accrual client")?,
    );

    let reconciler =
        AccrualReconciler::new(config.reconciler.clone(), Arc::clone(&store), accrual)
            .context("Failed to create reconciler")?;
    let handle = reconciler.start();

    let health = config.database.health_check_interval().map(|interval| {
        tokio::spawn(
            StoreHealthCheck::new(store, interval, config.reconciler.store_timeout())
                .run(handle.shutdown_token()),
        )
    });

    shutdown_signal().await;

    info!("Shutdown requested, waiting for in-flight work");
    handle.stop().await.context("Reconciler failed")?;
    if let Some(health) = health {
        if let Err(e) = health.await {
            error!(error = %e, "Store health check task failed");
        }
    }

    let status = reconciler.status().await;
    info!(
        written = status.results_written,
        failed_queries = status.queries_failed,
        failed_writes = status.writes_failed,
        "gophermart stopped"
    );
    Ok(())
}

/// Load from `GOPHERMART_CONFIG`, else `gophermart.toml` if present, else env only.
fn load() -> Result<Config> {
    let config_path = std::env::var("GOPHERMART_CONFIG")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            default.exists().then_some(default)
        });

    match config_path {
        Some(path) => load_config(&path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => load_config_from_env().context("Failed to load config from environment"),
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.to_ascii_lowercase()));

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
