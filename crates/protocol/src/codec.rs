use crate::frame::{DataPoint, Dialect, Frame, SeriesInit};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Client token that starts a bare-text stream.
pub const READY_TOKEN: &str = "READY";
/// Client token that acknowledges a bare-text terminal.
pub const FINISHED_TOKEN: &str = "FINISHED";
/// Server literal that ends a bare-text stream.
pub const END_LITERAL: &str = "end";

pub const PORTFOLIO_VALUE_FIELD: &str = "portfolioValue";
pub const PNL_FIELD: &str = "pnl";
pub const RETURN_FIELD: &str = "return";
/// Field name used for the unlabeled bare-text value.
pub const VALUE_FIELD: &str = "val";

/// Smallest magnitude a `Decimal` can hold (scale 28).
const MIN_POSITIVE_DECIMAL: f64 = 1e-28;

// --- Structured (JSON) Deserialization Structs ---
// The `type` tag picks the variant; anything else in the object is ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StructuredMessage {
    Init(InitMessage),
    Update(UpdateMessage),
    End,
}

#[derive(Debug, Deserialize)]
struct InitMessage {
    title: Option<String>,
    // The server has always spelled it `xlable`.
    #[serde(alias = "xlabel")]
    xlable: Option<String>,
    #[serde(rename = "startDate", alias = "start_date")]
    start_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateMessage {
    #[serde(rename = "portfolioValue", alias = "portfolio_value")]
    portfolio_value: Option<Value>,
    pnl: Option<Value>,
    #[serde(rename = "return")]
    return_value: Option<Value>,
    date: Option<String>,
}

/// Decoder and encoder for the backtest streaming protocol.
///
/// Both dialects go through the same entry point: a payload is first tried
/// as a structured JSON message and falls back to the bare-text rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec;

impl WireCodec {
    /// Decodes one inbound payload. Never fails: anything unrecognised
    /// comes back as `Frame::Malformed`.
    pub fn decode(raw: &str) -> Frame {
        if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(raw) {
            if object.contains_key("type") {
                return match serde_json::from_value::<StructuredMessage>(Value::Object(object)) {
                    Ok(message) => Self::from_structured(message, raw),
                    // Unknown `type` values get one more chance as bare text,
                    // which always ends in `Malformed` for an object.
                    Err(_) => Self::decode_bare(raw),
                };
            }
        }
        Self::decode_bare(raw)
    }

    pub fn encode_ready() -> &'static str {
        READY_TOKEN
    }

    pub fn encode_finished() -> &'static str {
        FINISHED_TOKEN
    }

    fn from_structured(message: StructuredMessage, raw: &str) -> Frame {
        match message {
            StructuredMessage::Init(init) => {
                let start_date = match init.start_date.as_deref() {
                    Some(text) => match parse_date(text) {
                        Some(date) => Some(date),
                        None => return Frame::Malformed(raw.to_string()),
                    },
                    None => None,
                };
                Frame::Init(SeriesInit {
                    title: init.title,
                    axis_label: init.xlable,
                    start_date,
                })
            }
            StructuredMessage::Update(update) => {
                let date = match update.date.as_deref() {
                    Some(text) => match parse_date(text) {
                        Some(date) => Some(date),
                        None => return Frame::Malformed(raw.to_string()),
                    },
                    None => None,
                };

                let mut fields = BTreeMap::new();
                for (name, value) in [
                    (PORTFOLIO_VALUE_FIELD, update.portfolio_value),
                    (PNL_FIELD, update.pnl),
                    (RETURN_FIELD, update.return_value),
                ] {
                    let Some(value) = value else { continue };
                    match numeric_value(&value) {
                        Some(number) => {
                            fields.insert(name.to_string(), number);
                        }
                        None => return Frame::Malformed(raw.to_string()),
                    }
                }

                if fields.is_empty() {
                    return Frame::Malformed(raw.to_string());
                }
                Frame::DataPoint(DataPoint { date, fields })
            }
            StructuredMessage::End => Frame::Terminal(Dialect::Structured),
        }
    }

    fn decode_bare(raw: &str) -> Frame {
        let text = raw.trim();
        if text == END_LITERAL {
            return Frame::Terminal(Dialect::BareText);
        }
        if text == READY_TOKEN {
            return Frame::Handshake;
        }
        match parse_decimal(text) {
            Some(val) => Frame::DataPoint(DataPoint::value(val)),
            None => {
                tracing::trace!(raw, "Payload matches neither wire dialect.");
                Frame::Malformed(raw.to_string())
            }
        }
    }
}

/// Parses a numeric string, accepting plain and scientific notation.
///
/// Magnitudes below the smallest representable `Decimal` round to zero in
/// either notation, so a float such as `1e-300` reads the same as a long run
/// of zero decimals.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text)) {
        return Some(value);
    }
    // Exponents past 28 decimal places; NaN and infinities stay unparsed.
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() && value.abs() < MIN_POSITIVE_DECIMAL => Some(Decimal::ZERO),
        Ok(value) if value.is_finite() => Decimal::from_f64(value),
        _ => None,
    }
}

fn numeric_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(text) => parse_decimal(text),
        Value::Number(number) => parse_decimal(&number.to_string()),
        _ => None,
    }
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and naive `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Some(timestamp.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|timestamp| timestamp.date())
}
