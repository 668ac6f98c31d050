//! Application configuration settings
//!
//! Defines all configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Target API configuration
    pub target: TargetConfig,
    /// Interception proxy configuration
    pub proxy: ProxyConfig,
    /// Child process supervision configuration
    pub supervision: SupervisionConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Target API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// URL prefix of the monitored API; only flows matching it are
    /// accounted
    pub url_prefix: String,
}

/// Interception proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Listen host for the interception layer
    pub host: String,
    /// First port to try when allocating the listen port
    pub port_start: u16,
    /// Path to the trust certificate handed to the monitored process
    pub ca_cert_path: PathBuf,
}

/// Child process supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionConfig {
    /// Child liveness poll interval in milliseconds
    pub poll_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (text/json)
    pub format: String,
}

impl MonitorSettings {
    /// Create a new configuration instance from the environment
    pub fn new() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let settings = Self {
            target: TargetConfig {
                url_prefix: get_env_or_default("TOKMETER_TARGET_URL", "https://api.openai.com"),
            },
            proxy: ProxyConfig {
                host: get_env_or_default("TOKMETER_PROXY_HOST", "127.0.0.1"),
                port_start: get_env_or_default("TOKMETER_PORT_START", "7878")
                    .parse()
                    .context("Invalid proxy start port")?,
                ca_cert_path: PathBuf::from(get_env_or_default(
                    "TOKMETER_CA_CERT",
                    &default_ca_cert_path(),
                )),
            },
            supervision: SupervisionConfig {
                poll_interval_ms: get_env_or_default("TOKMETER_POLL_INTERVAL_MS", "1000")
                    .parse()
                    .context("Invalid poll interval")?,
            },
            logging: LoggingConfig {
                level: get_env_or_default("RUST_LOG", "info"),
                format: get_env_or_default("LOG_FORMAT", "text"),
            },
        };

        // Validate configuration
        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration validity
    fn validate(&self) -> Result<()> {
        if !self.target.url_prefix.starts_with("http") {
            anyhow::bail!(
                "Invalid target URL prefix '{}', should start with 'http'",
                self.target.url_prefix
            );
        }

        if self.proxy.port_start == 0 {
            anyhow::bail!("Proxy start port cannot be 0");
        }

        if self.supervision.poll_interval_ms == 0 {
            anyhow::bail!("Poll interval cannot be 0");
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        Ok(())
    }
}

/// Default certificate location, matching where mitm tooling drops its CA
fn default_ca_cert_path() -> String {
    dirs::home_dir()
        .map(|home| {
            home.join(".mitmproxy")
                .join("mitmproxy-ca-cert.pem")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "mitmproxy-ca-cert.pem".to_string())
}

/// Get environment variable or default value
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
