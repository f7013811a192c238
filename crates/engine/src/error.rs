use crate::event::ErrorCode;
use analytics::SeriesError;
use api_client::ChannelError;
use api_client::error::ApiError;
use core_types::SessionState;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("'{operation}' is not allowed while the session is {state}")]
    Precondition {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Backtest server error: {0}")]
    Api(#[from] ApiError),

    #[error("Stream channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Series error: {0}")]
    Series(#[from] SeriesError),

    #[error("Stream transport error: {0}")]
    Transport(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Channel closed before the run finished (code {code:?}): {reason}")]
    ChannelClosed { code: Option<u16>, reason: String },

    #[error("No frame received for {0:?}")]
    IdleTimeout(Duration),

    #[error("Channel did not open within {0:?}")]
    ConnectTimeout(Duration),

    #[error("The session was closed by its owner")]
    Cancelled,
}

impl SessionError {
    /// The stable code reported to subscribers for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::Precondition { .. } => ErrorCode::Precondition,
            SessionError::Api(e) if e.is_transport() => ErrorCode::TransportError,
            SessionError::Api(_) => ErrorCode::ProtocolError,
            SessionError::Channel(ChannelError::NotOpen) => ErrorCode::ChannelNotOpen,
            SessionError::Channel(ChannelError::InvalidEndpoint(_)) => ErrorCode::ProtocolError,
            SessionError::Series(SeriesError::OutOfOrder { .. }) => ErrorCode::OutOfOrder,
            SessionError::Series(_) => ErrorCode::ProtocolError,
            SessionError::Transport(_) | SessionError::ConnectTimeout(_) => ErrorCode::TransportError,
            SessionError::Protocol(_) => ErrorCode::ProtocolError,
            SessionError::ChannelClosed { .. } => ErrorCode::ChannelClosed,
            SessionError::IdleTimeout(_) => ErrorCode::IdleTimeout,
            SessionError::Cancelled => ErrorCode::Cancelled,
        }
    }
}
