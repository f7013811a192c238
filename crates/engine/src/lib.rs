//! Drives backtest sessions: creates them on the server, streams their
//! results into a date-indexed series and tells subscribers what happened.

pub mod error;
pub mod event;
pub mod session;
pub mod supervisor;

pub use error::SessionError;
pub use event::{ErrorCode, FailureReport, SessionEvent};
pub use session::{BacktestSession, SessionHandle};
pub use supervisor::{LaunchedRun, RunOutcome, RunSupervisor};
