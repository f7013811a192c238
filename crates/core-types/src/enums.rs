use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Selects the execution engine the server runs the algorithm with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunMode {
    /// Synthetic data produced by a generator.
    #[default]
    #[serde(rename = "GENERATOR_MODE", alias = "GENERATOR")]
    Generator,
    /// Historical simulation through zipline.
    #[serde(rename = "ZIPLINE_MODE", alias = "ZIPLINE")]
    Zipline,
}

impl RunMode {
    /// The value the `runBacktest` endpoint expects in its `mode` field.
    pub fn as_wire(&self) -> &'static str {
        match self {
            RunMode::Generator => "GENERATOR_MODE",
            RunMode::Zipline => "ZIPLINE_MODE",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for RunMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GENERATOR" | "GENERATOR_MODE" => Ok(RunMode::Generator),
            "ZIPLINE" | "ZIPLINE_MODE" => Ok(RunMode::Zipline),
            other => Err(CoreError::InvalidInput("run mode".to_string(), other.to_string())),
        }
    }
}

/// Which streaming dialect the client should expect from the server.
///
/// Both dialects are always decoded; this only controls which control
/// tokens the client volunteers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireProtocol {
    /// Send `READY` on open; acknowledge a bare-text terminal with `FINISHED`.
    #[default]
    Auto,
    /// Only JSON frames are expected. No control tokens unless the server asks.
    Structured,
    /// Only bare-text frames are expected.
    BareText,
}

impl WireProtocol {
    /// Whether `READY` should be sent as soon as the channel opens.
    pub fn sends_ready_on_open(&self) -> bool {
        !matches!(self, WireProtocol::Structured)
    }
}

impl FromStr for WireProtocol {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(WireProtocol::Auto),
            "structured" | "json" => Ok(WireProtocol::Structured),
            "bare_text" | "text" => Ok(WireProtocol::BareText),
            other => Err(CoreError::InvalidInput("wire protocol".to_string(), other.to_string())),
        }
    }
}

/// Lifecycle of one backtest session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    SessionCreated,
    Running,
    Streaming,
    Finished,
    Failed,
    /// Closed by its owner before reaching `Finished` or `Failed`.
    Closed,
}

impl SessionState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Finished | SessionState::Failed | SessionState::Closed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_mode_uses_wire_names() {
        let json = serde_json::to_string(&RunMode::Zipline).unwrap();
        assert_eq!(json, "\"ZIPLINE_MODE\"");
        let mode: RunMode = serde_json::from_str("\"GENERATOR\"").unwrap();
        assert_eq!(mode, RunMode::Generator);
    }

    #[test]
    fn run_mode_parses_loosely() {
        assert_eq!("zipline".parse::<RunMode>().unwrap(), RunMode::Zipline);
        assert_eq!("GENERATOR_MODE".parse::<RunMode>().unwrap(), RunMode::Generator);
        assert!("pandas".parse::<RunMode>().is_err());
    }

    #[test]
    fn wire_protocol_parses() {
        assert_eq!("bare-text".parse::<WireProtocol>().unwrap(), WireProtocol::BareText);
        assert_eq!("json".parse::<WireProtocol>().unwrap(), WireProtocol::Structured);
        assert!(!WireProtocol::Structured.sends_ready_on_open());
        assert!(WireProtocol::Auto.sends_ready_on_open());
    }

    #[test]
    fn terminal_states() {
        assert!(SessionState::Finished.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Closed.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
    }
}
