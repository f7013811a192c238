use chrono::NaiveDate;
use core_types::{RunMode, WireProtocol};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Where the backtest server lives.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Prefix for the session endpoints, e.g. `http://localhost:8888`.
    /// Requests go to `{base_url}/api/<name>`.
    pub base_url: String,
    /// The host a port-only channel endpoint is combined with.
    pub page_host: String,
    /// How long to wait for the run's WebSocket to open.
    pub connect_timeout_secs: u64,
}

/// Contains parameters for a single backtest run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// The execution engine the server should use.
    pub mode: RunMode,
    /// Which control tokens the client volunteers.
    pub protocol: WireProtocol,
    /// Date of the first point when the stream carries no dates.
    pub start_date: NaiveDate,
    /// A streaming session fails after this long without a frame.
    pub idle_timeout_secs: u64,
    /// Consecutive malformed frames tolerated before the session fails.
    pub max_consecutive_malformed: u32,
    /// Capacity of the subscriber broadcast channel.
    pub event_buffer: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive. `RUST_LOG` takes precedence when set.
    pub level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<String>,
}

// --- Default Implementations ---
// These allow a user to omit any section (or the whole file) and still get a
// working client against a locally running server.

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8888".to_string(),
            page_host: "localhost".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Generator,
            protocol: WireProtocol::Auto,
            start_date: NaiveDate::from_ymd_opt(2012, 1, 1).unwrap_or_default(),
            idle_timeout_secs: 30,
            max_consecutive_malformed: 3,
            event_buffer: 256,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
