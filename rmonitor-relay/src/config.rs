//! Relay configuration

use std::time::Duration;

use rmonitor_protocol::Charset;

/// Port downstream clients connect to by default
pub const DEFAULT_RELAY_PORT: u16 = 50000;

/// How long one record may take to reach a client before it is dropped
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Charset records are encoded in on the wire
    pub charset: Charset,
    /// Appended after every CSV record
    pub line_terminator: String,
    /// When set, `stop()` also closes every accepted session
    pub close_sessions_on_stop: bool,
    /// A client that stops reading is disconnected after this long
    pub write_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_RELAY_PORT,
            charset: Charset::default(),
            line_terminator: "\r\n".to_string(),
            close_sessions_on_stop: false,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl RelayConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    pub fn with_close_sessions_on_stop(mut self, close: bool) -> Self {
        self.close_sessions_on_stop = close;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
