use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which of the two wire dialects a frame arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// `{"type": "Init" | "Update" | "End", ...}` JSON objects.
    Structured,
    /// `READY` / numeric value / `end` / `FINISHED` plain text.
    BareText,
}

/// Plot metadata announced by an `Init` frame.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeriesInit {
    pub title: Option<String>,
    pub axis_label: Option<String>,
    /// Date of the first data point. The accumulator origin is the day before.
    pub start_date: Option<NaiveDate>,
}

/// A decoded data frame, before it has been placed on the date axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    /// `None` means "the day after the previous point".
    pub date: Option<NaiveDate>,
    pub fields: BTreeMap<String, Decimal>,
}

impl DataPoint {
    /// A bare-text value, stored under the `val` field.
    pub fn value(val: Decimal) -> Self {
        Self {
            date: None,
            fields: BTreeMap::from([(crate::codec::VALUE_FIELD.to_string(), val)]),
        }
    }
}

/// One decoded unit of the streaming protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// The server is waiting for the client's `READY`.
    Handshake,
    Init(SeriesInit),
    DataPoint(DataPoint),
    /// No more data will follow.
    Terminal(Dialect),
    /// The payload could not be understood; carries it verbatim for logging.
    Malformed(String),
}

impl Frame {
    pub fn is_malformed(&self) -> bool {
        matches!(self, Frame::Malformed(_))
    }
}
