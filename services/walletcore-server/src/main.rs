//! Walletcore server
//!
//! Serves the wallet wrapper REST surface over a ledger engine backend.
//!
//! # Usage
//!
//! ```bash
//! # Dev mode: embedded in-memory engine, volatile
//! walletcore-server
//!
//! # Durable engine store
//! POSTGRES_URI=postgres://localhost/walletcore AUTO_UPGRADE=1 walletcore-server
//!
//! # Restrict the currency registry
//! ALLOWED_CURRENCIES=USD,NGN,KES walletcore-server --bind 0.0.0.0:8080
//! ```

mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use walletcore_api::{create_router, ApiConfig, AppState};
use walletcore_engine::{LedgerEngine, MemoryLedgerEngine, PostgresLedgerEngine};
use walletcore_types::CurrencyRegistry;

use crate::config::ServerConfig;

/// Walletcore wallet wrapper server
#[derive(Parser, Debug)]
#[command(name = "walletcore-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "WALLETCORE_CONFIG")]
    config: Option<String>,

    /// Address to bind, host:port
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// PostgreSQL connection string for the engine backing store
    #[arg(long, env = "POSTGRES_URI")]
    postgres_uri: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "WALLETCORE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "WALLETCORE_LOG_FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        server_config.server.bind_addr = bind;
    }
    if let Some(uri) = args.postgres_uri {
        server_config.engine.postgres_uri = Some(uri);
    }
    if let Some(level) = args.log_level {
        server_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        server_config.logging.format = format;
    }

    init_logging(&server_config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting walletcore server"
    );

    let registry = build_registry(&server_config);
    tracing::info!(currencies = %registry, "currency registry loaded");

    let engine = init_engine(&server_config).await?;
    let state = Arc::new(AppState::new(engine, Arc::new(registry)));

    let app = create_router(state, ApiConfig::default());

    if server_config.metrics.enabled {
        start_metrics_server(server_config.metrics.port)?;
    }

    let addr = server_config.server.socket_addr()?;
    tracing::info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let drain = Duration::from_secs(server_config.server.shutdown_timeout_secs);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(drain))
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(config: &config::LoggingConfig) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);
    match config.format.as_str() {
        "json" => subscriber.with(fmt::layer().json().with_target(true)).init(),
        _ => subscriber
            .with(fmt::layer().pretty().with_target(true))
            .init(),
    }
    Ok(())
}

/// Seed the immutable currency registry from configuration.
fn build_registry(config: &ServerConfig) -> CurrencyRegistry {
    match &config.currencies.allowed {
        Some(allowed) => CurrencyRegistry::from_allowed_list(allowed),
        None => CurrencyRegistry::builtin(),
    }
}

/// Choose the engine backend: Postgres when configured, the embedded
/// in-memory engine otherwise.
async fn init_engine(config: &ServerConfig) -> anyhow::Result<Arc<dyn LedgerEngine>> {
    match &config.engine.postgres_uri {
        Some(uri) => {
            tracing::info!(
                auto_upgrade = config.engine.auto_upgrade,
                "connecting to postgres engine store"
            );
            let engine = PostgresLedgerEngine::connect(
                uri,
                config.engine.max_connections,
                config.engine.auto_upgrade,
            )
            .await
            .map_err(|e| anyhow::anyhow!("engine store connection failed: {e}"))?;
            Ok(Arc::new(engine))
        }
        None => {
            tracing::warn!("no POSTGRES_URI configured, using in-memory engine (volatile)");
            Ok(Arc::new(MemoryLedgerEngine::new()))
        }
    }
}

/// Start the Prometheus exporter on its side port.
fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(port, "metrics exporter started");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM), then allow in-flight
/// requests to drain.
async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }

    tracing::info!(
        timeout_secs = timeout.as_secs(),
        "draining in-flight requests"
    );
    tokio::time::sleep(timeout).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parsing() {
        let args = Args::parse_from(["walletcore-server", "--bind", "127.0.0.1:9000"]);
        assert_eq!(args.bind.as_deref(), Some("127.0.0.1:9000"));
    }

    #[test]
    fn registry_from_allowed_list() {
        let mut config = ServerConfig::default();
        config.currencies.allowed = Some("usd,kes".to_string());
        let registry = build_registry(&config);
        assert!(registry.require("USD").is_ok());
        assert!(registry.require("KES").is_ok());
        assert!(registry.require("EUR").is_err());
    }
}
