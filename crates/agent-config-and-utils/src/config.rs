//! Configuration management for the agent.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default agent identifier stamped on every record.
pub const DEFAULT_AGENT_ID: &str = "agent-001";

/// Default collector ingestion endpoint.
pub const DEFAULT_COLLECTOR_URL: &str = "http://localhost:8000/telemetry";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Prefix shared by every environment override.
const ENV_PREFIX: &str = "EDGE_AGENT_";

/// What the backlog uploader does with a line it cannot parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedLines {
    /// Log and skip the line, keep draining.
    #[default]
    Skip,
    /// Stop the drain and keep the line at the head of the backlog.
    Halt,
}

impl std::str::FromStr for MalformedLines {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "halt" => Ok(Self::Halt),
            other => Err(CoreError::Config(format!(
                "unknown malformed line policy '{}' (expected skip or halt)",
                other
            ))),
        }
    }
}

/// Main agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Producer identifier stamped on every record.
    pub agent_id: String,
    /// Collector ingestion endpoint.
    pub collector_url: String,
    /// Directory holding the active store and the processing log.
    /// Defaults to `<base_dir>/buffer` when unset.
    pub buffer_dir: Option<PathBuf>,
    /// Production cadence in milliseconds.
    pub produce_interval_ms: u64,
    /// Flush loop cadence in milliseconds.
    pub flush_interval_ms: u64,
    /// Per-delivery timeout in milliseconds.
    pub delivery_timeout_ms: u64,
    /// Attempts made to append a record before it is dropped.
    pub append_attempts: u32,
    /// Pause between append attempts in milliseconds.
    pub append_backoff_ms: u64,
    /// Policy for unparseable backlog lines.
    pub malformed_lines: MalformedLines,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log output format (compact or json).
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_id: DEFAULT_AGENT_ID.to_string(),
            collector_url: DEFAULT_COLLECTOR_URL.to_string(),
            buffer_dir: None,
            produce_interval_ms: 1_000,
            flush_interval_ms: 5_000,
            delivery_timeout_ms: 2_000,
            append_attempts: 3,
            append_backoff_ms: 50,
            malformed_lines: MalformedLines::Skip,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: "compact".to_string(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> CoreResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            debug!(path = %config_path.display(), "Loading config file");
            Self::load_from_file(&config_path)?
        } else {
            debug!(path = %config_path.display(), "No config file, using defaults");
            Self::default()
        };

        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        std::fs::create_dir_all(paths.base_dir())?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        info!(path = %paths.config_file().display(), "Saved config");
        Ok(())
    }

    /// Override configuration from `EDGE_AGENT_*` environment variables.
    pub fn apply_env(&mut self) -> CoreResult<()> {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Apply overrides from a key lookup (keys without the env prefix).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(agent_id) = lookup("AGENT_ID") {
            self.agent_id = agent_id;
        }
        if let Some(url) = lookup("COLLECTOR_URL") {
            self.collector_url = url;
        }
        if let Some(dir) = lookup("BUFFER_DIR") {
            self.buffer_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = lookup("PRODUCE_INTERVAL_MS") {
            self.produce_interval_ms = parse_number("PRODUCE_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("FLUSH_INTERVAL_MS") {
            self.flush_interval_ms = parse_number("FLUSH_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("DELIVERY_TIMEOUT_MS") {
            self.delivery_timeout_ms = parse_number("DELIVERY_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("APPEND_ATTEMPTS") {
            self.append_attempts = parse_number("APPEND_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = lookup("APPEND_BACKOFF_MS") {
            self.append_backoff_ms = parse_number("APPEND_BACKOFF_MS", &raw)?;
        }
        if let Some(raw) = lookup("MALFORMED_LINES") {
            self.malformed_lines = raw.parse()?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.log_format = format;
        }
        Ok(())
    }

    /// Check that the configuration can drive the agent.
    pub fn validate(&self) -> CoreResult<()> {
        let url = self.collector_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CoreError::Config(format!(
                "collector_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.agent_id.trim().is_empty() {
            return Err(CoreError::Config("agent_id must not be empty".to_string()));
        }
        for (name, value) in [
            ("produce_interval_ms", self.produce_interval_ms),
            ("flush_interval_ms", self.flush_interval_ms),
            ("delivery_timeout_ms", self.delivery_timeout_ms),
        ] {
            if value == 0 {
                return Err(CoreError::Config(format!("{} must be greater than zero", name)));
            }
        }
        if self.append_attempts == 0 {
            return Err(CoreError::Config(
                "append_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the collector URL as a parsed URL.
    pub fn collector_url(&self) -> CoreResult<Url> {
        Url::parse(&self.collector_url).map_err(CoreError::from)
    }

    /// Resolve the buffer directory against the agent paths.
    pub fn buffer_dir(&self, paths: &Paths) -> PathBuf {
        self.buffer_dir
            .clone()
            .unwrap_or_else(|| paths.buffer_dir())
    }

    pub fn produce_interval(&self) -> Duration {
        Duration::from_millis(self.produce_interval_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn append_backoff(&self) -> Duration {
        Duration::from_millis(self.append_backoff_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> CoreResult<T> {
    raw.trim().parse::<T>().map_err(|_| {
        CoreError::Config(format!("{}{} is not a valid number: {}", ENV_PREFIX, key, raw))
    })
}
