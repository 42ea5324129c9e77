//! Collector configuration

use std::time::Duration;

use rmonitor_protocol::Charset;

/// Port a timing system's RMONITOR server usually listens on
pub const DEFAULT_PULL_PORT: u16 = 50000;

/// Port the collector listens on when the timing system pushes to us
pub const DEFAULT_PUSH_PORT: u16 = 40000;

/// Longest sentence accepted before the rest of the line is discarded
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024;

/// How the collector reaches the upstream feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorMode {
    /// Connect out to the timing system, reconnecting forever
    Pull,
    /// Accept connections from the timing system
    Push,
}

/// Delay between reconnection attempts in pull mode
///
/// The delay grows by `multiplier` after each failed attempt, capped at
/// `max_delay`, and starts over once a connection is established.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl ReconnectPolicy {
    /// Same delay before every attempt
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
        }
    }

    /// Delay before reconnect attempt `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// Collector configuration
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub mode: CollectorMode,
    /// Upstream host (pull) or bind address (push)
    pub host: String,
    pub port: u16,
    /// Charset of the upstream CSV feed
    pub charset: Charset,
    /// Pull mode only
    pub reconnect: ReconnectPolicy,
    /// Bytes per line, newline excluded
    pub max_line_length: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self::pull("127.0.0.1", DEFAULT_PULL_PORT)
    }
}

impl CollectorConfig {
    /// Connect out to `host:port`
    pub fn pull(host: impl Into<String>, port: u16) -> Self {
        Self {
            mode: CollectorMode::Pull,
            host: host.into(),
            port,
            charset: Charset::default(),
            reconnect: ReconnectPolicy::default(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Listen on all interfaces at `port`
    pub fn push(port: u16) -> Self {
        Self {
            mode: CollectorMode::Push,
            host: "0.0.0.0".to_string(),
            port,
            charset: Charset::default(),
            reconnect: ReconnectPolicy::default(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// `host:port` string for connecting or binding
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
