//! # Performance Series Analytics
//!
//! Rebuilds the portfolio performance series from decoded stream frames and
//! derives a summary from it.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It has no knowledge of the
//!   network. It depends only on `core-types` and `protocol`.
//! - **Append-only:** `SeriesAccumulator` never reorders or rewrites points.
//!   A prefix of `snapshot()` taken before an append is still a prefix after it,
//!   so a renderer only needs to draw the points past its last seen length.
//!
//! ## Public API
//!
//! - `SeriesAccumulator`: folds `DataPoint` frames into dated `SeriesPoint`s.
//! - `AnalyticsEngine` / `PerformanceSummary`: headline metrics for one field.
//! - `SeriesError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod engine;
pub mod error;
pub mod report;
pub mod series;

// Re-export the key components to create a clean, public-facing API.
pub use engine::AnalyticsEngine;
pub use error::SeriesError;
pub use report::PerformanceSummary;
pub use series::SeriesAccumulator;
