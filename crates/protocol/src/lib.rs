//! # Backtest Streaming Protocol
//!
//! This crate defines the frames exchanged over the run's WebSocket and the
//! `WireCodec` that turns raw payloads into them.
//!
//! Two dialects have been spoken by the server over time: structured JSON
//! objects tagged with `type` and a bare-text stream of numbers closed by
//! `end`. Both are decoded through one entry point, `WireCodec::decode`.
//!
//! As a Layer 0 crate it performs no I/O.

// Declare the modules that make up this crate.
pub mod codec;
pub mod frame;

// Re-export the core types to provide a clean public API.
pub use codec::{WireCodec, parse_date, parse_decimal};
pub use frame::{DataPoint, Dialect, Frame, SeriesInit};
