use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A server-assigned session identifier. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the streaming channel for a run can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelEndpoint {
    /// A bare port, combined with the page host the client was served from.
    Port(u16),
    /// A complete `ws://` or `wss://` URI.
    Uri(String),
}

impl fmt::Display for ChannelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelEndpoint::Port(port) => write!(f, "port {}", port),
            ChannelEndpoint::Uri(uri) => f.write_str(uri),
        }
    }
}

/// One point of the reconstructed performance series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    /// Field name (e.g. `portfolioValue`, `pnl`, `val`) to value.
    pub fields: BTreeMap<String, Decimal>,
}

impl SeriesPoint {
    pub fn get(&self, field: &str) -> Option<Decimal> {
        self.fields.get(field).copied()
    }
}
