//! Shared domain and wire types for the loader platform.
//!
//! Every crate in the workspace that touches a `Loader`, a run, a signal
//! row, or an approval request depends on this crate instead of redefining
//! the shape locally — the storage layer, the HTTP edge, and the executor
//! all read the same struct.

pub mod error;
pub mod loader;
pub mod run;
pub mod signal;
pub mod source;
pub mod state;
pub mod versioning;

pub use error::{ErrorLevel, ErrorResponse, WireError};
pub use loader::{Loader, LoadStatus, PurgeStrategy};
pub use run::{BackfillJob, BackfillStatus, LoadHistory, LoadHistoryStatus, LoaderExecutionLock};
pub use signal::{coalesce_segment, SegmentCombination, SignalsHistory, MAX_SEGMENTS, NULL_SEGMENT_SENTINEL};
pub use source::{SourceDatabase, SourceKind};
pub use state::{is_operational_version, LoaderState};
pub use versioning::{ApprovalRequest, ApprovalStatus, EntityType, RequestType, VersionStatus};
