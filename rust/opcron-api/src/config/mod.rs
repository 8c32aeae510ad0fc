//! Configuration management.
//!
//! Configuration is assembled from defaults, an optional config file,
//! and `OPCRON__`-prefixed environment variables, with a few targeted
//! overrides (`REDIS_URL`) applied last.

use serde::{Deserialize, Serialize};

use crate::cron::lock::DEFAULT_LOCK_TIMEOUT_SECS;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Cron subsystem configuration.
    #[serde(default)]
    pub cron: CronConfig,
    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from defaults, config files, and environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::load_unchecked()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration without validation.
    pub fn load_unchecked() -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .add_source(config::File::with_name("config/opcron").required(false))
            .add_source(
                config::Environment::with_prefix("OPCRON")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = config.try_deserialize().unwrap_or_default();

        if let Ok(url) = std::env::var("REDIS_URL") {
            app_config.redis.url = Some(url);
        }

        Ok(app_config)
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cron.lock_timeout_secs == 0 {
            anyhow::bail!("cron.lock_timeout_secs must be at least 1");
        }
        if self.cron.spawn_timeout_ms == 0 {
            anyhow::bail!("cron.spawn_timeout_ms must be at least 1");
        }
        if self.cron.site_url.is_empty() {
            anyhow::bail!("cron.site_url must not be empty");
        }
        Ok(())
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// API port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Cron subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    /// Administrative override: disables all cron triggering.
    #[serde(default)]
    pub disabled: bool,
    /// Alternate trigger mode: redirect the current request instead of
    /// firing a loopback request, for hosts that block the latter.
    #[serde(default)]
    pub alternate: bool,
    /// Seconds before a run lock is considered stale.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
    /// Base URL the loopback trigger request is sent to.
    #[serde(default = "default_site_url")]
    pub site_url: String,
    /// Timeout for the fire-and-forget trigger request, in milliseconds.
    #[serde(default = "default_spawn_timeout")]
    pub spawn_timeout_ms: u64,
}

fn default_lock_timeout() -> u64 {
    DEFAULT_LOCK_TIMEOUT_SECS
}

fn default_site_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_spawn_timeout() -> u64 {
    10
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            alternate: false,
            lock_timeout_secs: default_lock_timeout(),
            site_url: default_site_url(),
            spawn_timeout_ms: default_spawn_timeout(),
        }
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Connection URL; when absent the in-memory store is used.
    pub url: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON-formatted logs.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
