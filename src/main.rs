use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ratewindow::config::{AppConfig, StoreConfig};
use ratewindow::http::HttpServer;
use ratewindow::ratelimit::{InMemoryWindowStore, RateDecisionEngine, RedisWindowStore, WindowStore};

/// Distributed sliding window rate limiter.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "RATEWINDOW_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding server.http_addr
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.log_format);

    info!("Starting Ratewindow Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.http_addr = listen;
    }
    info!(
        http_addr = %config.server.http_addr,
        window_seconds = config.window.window_seconds.get(),
        max_requests = config.window.max_requests.get(),
        "Configuration loaded"
    );

    let store: Arc<dyn WindowStore> = match &config.store {
        StoreConfig::Memory => {
            warn!("Using in-memory window store - limits are not shared between instances");
            Arc::new(InMemoryWindowStore::new())
        }
        StoreConfig::Redis(redis) => Arc::new(RedisWindowStore::connect(redis).await?),
    };

    let engine = Arc::new(RateDecisionEngine::new(store, config.window));
    info!("Rate decision engine initialized");

    let server = HttpServer::new(config.server.http_addr, engine, config.http);

    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Ratewindow Rate Limiting Service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolve once the process is asked to stop.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = interrupted() => {}
                    _ = sigterm.recv() => info!("SIGTERM received, draining connections"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM; only Ctrl+C stops the server");
                interrupted().await;
            }
        }
    }

    #[cfg(not(unix))]
    interrupted().await;
}

/// Wait for Ctrl+C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, draining connections"),
        Err(e) => {
            error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
