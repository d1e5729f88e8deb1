//! Time Window Calculator (§4.2) and Query Runner (§4.3).

pub mod runner;
pub mod window;

pub use runner::{run, verify_read_only, QueryRow, RunnerError};
pub use window::{compute as compute_window, TimeWindow, DEFAULT_LOOKBACK_HOURS};
