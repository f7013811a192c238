use crate::error::SessionError;
use chrono::NaiveDate;
use core_types::{SeriesPoint, SessionState};
use std::fmt;

/// Stable, machine-readable failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    TransportError,
    ProtocolError,
    OutOfOrder,
    ChannelNotOpen,
    ChannelClosed,
    IdleTimeout,
    Precondition,
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TransportError => "TRANSPORT_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::OutOfOrder => "OUT_OF_ORDER",
            ErrorCode::ChannelNotOpen => "CHANNEL_NOT_OPEN",
            ErrorCode::ChannelClosed => "CHANNEL_CLOSED",
            ErrorCode::IdleTimeout => "IDLE_TIMEOUT",
            ErrorCode::Precondition => "PRECONDITION",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&SessionError> for FailureReport {
    fn from(error: &SessionError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Everything a session tells its subscribers, in the order it happens.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// The series was (re)started. Sent when streaming begins and again if
    /// the server announces its own start date or labels.
    SeriesStarted {
        title: Option<String>,
        axis_label: Option<String>,
        origin: NaiveDate,
    },
    PointAppended(SeriesPoint),
    Finished {
        points: usize,
    },
    Failed(FailureReport),
}
