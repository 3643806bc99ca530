//! Server configuration
//!
//! Layered: defaults, then optional config files, then `WALLETCORE__`
//! environment variables, then the flat variables the deployment contract
//! names (`ALLOWED_CURRENCIES`, `POSTGRES_URI`, `BIND_ADDR`, `AUTO_UPGRADE`,
//! `DEBUG`, `EXPERIMENTAL_FEATURES`).

use std::env;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub currencies: CurrencyConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Implementation-defined feature flags.
    #[serde(default)]
    pub experimental_features: bool,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Address to bind, host:port.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Seconds to drain in-flight requests on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid BIND_ADDR: {}", self.bind_addr))
    }
}

/// Ledger engine backing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// PostgreSQL connection string. Absent means the embedded in-memory
    /// engine (dev mode, volatile).
    pub postgres_uri: Option<String>,

    /// Create or upgrade the engine storage schema on startup.
    #[serde(default)]
    pub auto_upgrade: bool,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            postgres_uri: None,
            auto_upgrade: false,
            max_connections: default_max_connections(),
        }
    }
}

/// Currency registry seeding.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CurrencyConfig {
    /// Comma-separated codes overriding the built-in registry defaults.
    pub allowed: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:3068".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    20
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl ServerConfig {
    /// Load configuration from files and the environment.
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("WALLETCORE")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        let mut server_config: ServerConfig = config.try_deserialize().unwrap_or_default();
        server_config.apply_flat_env();
        Ok(server_config)
    }

    /// The flat variables named by the deployment contract win over
    /// everything else.
    fn apply_flat_env(&mut self) {
        if let Ok(allowed) = env::var("ALLOWED_CURRENCIES") {
            if !allowed.is_empty() {
                self.currencies.allowed = Some(allowed);
            }
        }
        if let Ok(uri) = env::var("POSTGRES_URI") {
            if !uri.is_empty() {
                self.engine.postgres_uri = Some(uri);
            }
        }
        if let Ok(addr) = env::var("BIND_ADDR") {
            if !addr.is_empty() {
                self.server.bind_addr = addr;
            }
        }
        if let Ok(flag) = env::var("AUTO_UPGRADE") {
            self.engine.auto_upgrade = is_truthy(&flag);
        }
        if let Ok(flag) = env::var("DEBUG") {
            if is_truthy(&flag) {
                self.logging.level = "debug".to_string();
            }
        }
        if let Ok(flag) = env::var("EXPERIMENTAL_FEATURES") {
            self.experimental_features = is_truthy(&flag);
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:3068");
        assert!(config.engine.postgres_uri.is_none());
        assert!(!config.engine.auto_upgrade);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn socket_addr_parse() {
        let settings = ServerSettings {
            bind_addr: "127.0.0.1:8080".to_string(),
            ..ServerSettings::default()
        };
        assert!(settings.socket_addr().is_ok());

        let settings = ServerSettings {
            bind_addr: "not-an-addr".to_string(),
            ..ServerSettings::default()
        };
        assert!(settings.socket_addr().is_err());
    }

    #[test]
    fn truthy_values() {
        for value in ["1", "true", "TRUE", "yes", "on"] {
            assert!(is_truthy(value));
        }
        for value in ["0", "false", "off", ""] {
            assert!(!is_truthy(value));
        }
    }
}
