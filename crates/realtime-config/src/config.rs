//! Configuration management for the realtime connection.

use crate::{resolve_endpoint, ConfigError, ConfigResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Reconnect backoff settings as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Reconnect attempts after the first failure. `None` retries forever.
    pub max_attempts: Option<u32>,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the delay used as the jitter window, 0.0..=1.0.
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: Some(10),
            base_delay_ms: 1000,
            max_delay_ms: 5000,
            jitter_factor: 0.5,
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Reject settings the backoff formula cannot honor.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::Config(format!(
                "jitter_factor must be within 0..=1, got {}",
                self.jitter_factor
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Config(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Realtime connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Explicit endpoint; bypasses page-based resolution.
    pub endpoint_override: Option<String>,
    /// URL of the page hosting the dashboard, used to derive the endpoint.
    pub page_url: Option<String>,
    pub retry: RetrySettings,
    /// Per-attempt connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// How long a send issued while disconnected waits for the connection.
    pub send_grace_ms: u64,
    /// Start connecting as soon as the manager is created.
    pub auto_connect: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            endpoint_override: None,
            page_url: None,
            retry: RetrySettings::default(),
            connect_timeout_ms: 10_000,
            send_grace_ms: 2_000,
            auto_connect: true,
        }
    }
}

impl RealtimeConfig {
    /// Create a new config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file if present, then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.retry.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RealtimeConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `QUANT_*` overrides from `lookup`. Unparseable numbers are
    /// ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(level) = non_empty("QUANT_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = non_empty("QUANT_STREAM_URL") {
            self.endpoint_override = Some(url);
        }
        if let Some(url) = non_empty("QUANT_PAGE_URL") {
            self.page_url = Some(url);
        }
        if let Some(raw) = non_empty("QUANT_STREAM_MAX_ATTEMPTS") {
            match raw.trim() {
                "unbounded" | "infinite" => self.retry.max_attempts = None,
                other => {
                    if let Some(n) = parse_or_warn::<u32>("QUANT_STREAM_MAX_ATTEMPTS", other) {
                        self.retry.max_attempts = Some(n);
                    }
                }
            }
        }
        if let Some(n) = non_empty("QUANT_STREAM_BASE_DELAY_MS")
            .and_then(|v| parse_or_warn::<u64>("QUANT_STREAM_BASE_DELAY_MS", &v))
        {
            self.retry.base_delay_ms = n;
        }
        if let Some(n) = non_empty("QUANT_STREAM_MAX_DELAY_MS")
            .and_then(|v| parse_or_warn::<u64>("QUANT_STREAM_MAX_DELAY_MS", &v))
        {
            self.retry.max_delay_ms = n;
        }
        if let Some(n) =
            non_empty("QUANT_STREAM_JITTER").and_then(|v| parse_or_warn::<f64>("QUANT_STREAM_JITTER", &v))
        {
            self.retry.jitter_factor = n;
        }
        if let Some(n) = non_empty("QUANT_STREAM_GRACE_MS")
            .and_then(|v| parse_or_warn::<u64>("QUANT_STREAM_GRACE_MS", &v))
        {
            self.send_grace_ms = n;
        }
    }

    /// Resolved event-stream endpoint.
    pub fn endpoint(&self) -> ConfigResult<Url> {
        let page = self.page_url.as_deref().map(Url::parse).transpose()?;
        resolve_endpoint(page.as_ref(), self.endpoint_override.as_deref())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_grace(&self) -> Duration {
        Duration::from_millis(self.send_grace_ms)
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = raw, "Ignoring unparseable override");
            None
        }
    }
}
