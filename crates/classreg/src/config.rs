//! Application configuration.
//!
//! Layered the usual way: compiled defaults, then the TOML config file, then
//! `CLASSREG__`-prefixed environment variables.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Application name, used for paths and the environment prefix.
pub const APP_NAME: &str = "classreg";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub auth: AuthSettings,
    pub logging: LoggingConfig,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Root URL of the platform API.
    pub base_url: String,
    /// Timeout for ordinary requests, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for the compensating delete, in seconds. Kept short so
    /// abandoning a registration never hangs on a slow backend.
    pub compensation_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
            compensation_timeout_secs: 3,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn compensation_timeout(&self) -> Duration {
        Duration::from_secs(self.compensation_timeout_secs)
    }
}

/// Login/permission-resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Delay between the bounded permission lookups, in milliseconds.
    pub permission_retry_delay_ms: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            permission_retry_delay_ms: 400,
        }
    }
}

impl AuthSettings {
    pub fn permission_retry_delay(&self) -> Duration {
        Duration::from_millis(self.permission_retry_delay_ms)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter level.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Resolve the default config file path under the platform config dir.
pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("could not determine the user config directory")?;
    Ok(base.join(APP_NAME).join("classreg.toml"))
}

/// Load configuration from the given file (or the default location),
/// layered under environment overrides.
pub fn load(config_file: Option<&Path>) -> Result<AppConfig> {
    let path = match config_file {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    let built = Config::builder()
        .set_default("backend.base_url", BackendConfig::default().base_url)?
        .set_default("backend.request_timeout_secs", 30_i64)?
        .set_default("backend.compensation_timeout_secs", 3_i64)?
        .set_default("auth.permission_retry_delay_ms", 400_i64)?
        .set_default("logging.level", "info")?
        .add_source(
            File::from(path.as_path())
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::with_prefix("CLASSREG").separator("__"))
        .build()
        .context("building configuration")?;

    built.try_deserialize().context("deserializing configuration")
}

/// Write the default configuration file, creating parent directories.
pub fn write_default(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = String::new();
    body.push_str("# Configuration for ");
    body.push_str(APP_NAME);
    body.push('\n');
    body.push('\n');
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}
