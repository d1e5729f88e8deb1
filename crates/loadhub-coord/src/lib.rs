//! Distributed Lock Manager + Execution History Store (`spec.md` §4.6/§4.7),
//! composed over `loadhub-db`'s repositories. This crate is the coordination
//! boundary: it owns the `Acquired | Busy` result type and the single-shot
//! stale-lock normalization `loadhub-reaper`'s loop drives repeatedly.

pub mod history;
pub mod locks;
pub mod reap;

pub use history::{FinalizeOutcome, HistoryHandle};
pub use locks::{AcquireOutcome, LockHandle};
pub use reap::{reap_stale, ReapReport};
