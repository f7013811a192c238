use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to reach the backtest server: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("The backtest server answered with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response from the backtest server: {0}")]
    Protocol(String),
}

impl ApiError {
    /// Network and HTTP-level failures, as opposed to undecodable bodies.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Status { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("The channel is not open")]
    NotOpen,

    #[error("Invalid channel endpoint: {0}")]
    InvalidEndpoint(String),
}
