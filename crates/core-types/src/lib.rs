pub mod enums;
pub mod error;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{RunMode, SessionState, WireProtocol};
pub use error::CoreError;
pub use structs::{ChannelEndpoint, SeriesPoint, SessionId};
