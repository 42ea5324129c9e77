//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rmonitor_collector::{CollectorConfig, ReconnectPolicy, DEFAULT_PULL_PORT, DEFAULT_PUSH_PORT};
use rmonitor_protocol::Charset;
use rmonitor_relay::{RelayConfig, DEFAULT_RELAY_PORT};

/// How the upstream timing feed is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    Pull,
    Push,
}

/// Upstream feed settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSection {
    pub mode: FeedMode,

    /// Timing system host (pull) or bind address (push);
    /// defaults to 127.0.0.1 for pull, all interfaces for push
    pub host: Option<String>,

    /// Defaults to 50000 for pull, 40000 for push
    pub port: Option<u16>,

    /// Pull mode reconnect backoff
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
    pub retry_multiplier: f64,
}

impl Default for CollectorSection {
    fn default() -> Self {
        Self {
            mode: FeedMode::Pull,
            host: None,
            port: None,
            retry_initial_ms: 1_000,
            retry_max_ms: 30_000,
            retry_multiplier: 2.0,
        }
    }
}

/// Downstream listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    pub host: String,
    pub port: u16,
    pub line_terminator: String,

    /// Disconnect clients when the listener stops
    pub close_sessions_on_stop: bool,

    /// Disconnect a client that accepts no data for this long
    pub write_timeout_ms: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        let relay = RelayConfig::default();
        Self {
            host: relay.host,
            port: DEFAULT_RELAY_PORT,
            line_terminator: relay.line_terminator,
            close_sessions_on_stop: relay.close_sessions_on_stop,
            write_timeout_ms: relay.write_timeout.as_millis() as u64,
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Charset of the CSV wire format, both directions
    pub charset: Charset,

    /// Maximum log level: error, warn, info, debug or trace
    pub log_level: String,

    pub collector: CollectorSection,

    pub relay: RelaySection,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            charset: Charset::default(),
            log_level: "info".to_string(),
            collector: CollectorSection::default(),
            relay: RelaySection::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save().context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config: DaemonConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Parsed `log_level`
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.log_level
            .parse()
            .with_context(|| format!("Invalid log level '{}'", self.log_level))
    }

    pub fn collector_config(&self) -> CollectorConfig {
        let section = &self.collector;
        let base = match section.mode {
            FeedMode::Pull => CollectorConfig::pull(
                section.host.as_deref().unwrap_or("127.0.0.1"),
                section.port.unwrap_or(DEFAULT_PULL_PORT),
            ),
            FeedMode::Push => {
                let config = CollectorConfig::push(section.port.unwrap_or(DEFAULT_PUSH_PORT));
                match &section.host {
                    Some(host) => config.with_host(host.clone()),
                    None => config,
                }
            }
        };

        base.with_charset(self.charset).with_reconnect(ReconnectPolicy {
            initial_delay: Duration::from_millis(section.retry_initial_ms),
            max_delay: Duration::from_millis(section.retry_max_ms.max(section.retry_initial_ms)),
            multiplier: section.retry_multiplier,
        })
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig::new(self.relay.host.clone(), self.relay.port)
            .with_charset(self.charset)
            .with_line_terminator(self.relay.line_terminator.clone())
            .with_close_sessions_on_stop(self.relay.close_sessions_on_stop)
            .with_write_timeout(Duration::from_millis(self.relay.write_timeout_ms))
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rmonitor")
            .join("config.toml")
    }
}
