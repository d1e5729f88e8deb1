use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate row. `segment_code` is dense per `loader_code`, assigned on
/// first sighting by the Segment Dictionary and never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsHistory {
    pub id: Uuid,
    pub loader_code: String,
    pub load_timestamp: i64,
    pub segment_code: i64,
    pub rec_count: i64,
    pub min_val: f64,
    pub max_val: f64,
    pub avg_val: f64,
    pub sum_val: f64,
    pub load_history_id: Uuid,
    pub create_time: DateTime<Utc>,
}

/// Maximum number of segment dimensions a signal row may carry.
pub const MAX_SEGMENTS: usize = 10;

/// `(loader_code, segment_code) -> up to 10 segment values`. `segments` is
/// always exactly `MAX_SEGMENTS` long; unused trailing dimensions are `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentCombination {
    pub loader_code: String,
    pub segment_code: i64,
    pub segments: [Option<String>; MAX_SEGMENTS],
}

/// Sentinel substituted for `NULL` segment values so a unique index can
/// treat two all-NULL tuples as equal (`spec.md` §4.5 implementation
/// guidance). Never produced by user-facing APIs — internal to the
/// interning unique-index/conflict-reread path in `loadhub-transform`.
pub const NULL_SEGMENT_SENTINEL: &str = "\u{1}__loadhub_null__";

pub fn coalesce_segment(value: Option<&str>) -> &str {
    value.unwrap_or(NULL_SEGMENT_SENTINEL)
}
