//! Builders for the handful of structs every scenario needs, so test code
//! states only what it's varying. Mirrors the `base_loader()` helper
//! `loadhub-schemas::state` keeps in its own test module, but exported for
//! reuse across crates that can't see that private helper.

use chrono::{DateTime, Utc};
use loadhub_schemas::{ApprovalStatus, LoadStatus, Loader, PurgeStrategy, SourceDatabase, SourceKind, VersionStatus};
use uuid::Uuid;

/// An ACTIVE, ENABLED, IDLE loader with a watermark one hour in the past —
/// the baseline every scenario starts from and overrides fields on.
pub fn loader(code: &str) -> Loader {
    let now = Utc::now();
    Loader {
        id: Uuid::new_v4(),
        loader_code: code.to_string(),
        loader_sql_encrypted: vec![],
        source_database_id: Uuid::new_v4(),
        min_interval_seconds: 60,
        max_interval_seconds: 3600,
        max_query_period_seconds: 3600,
        max_parallel_executions: 1,
        source_timezone_offset_hours: 0,
        aggregation_period_seconds: None,
        purge_strategy: PurgeStrategy::SkipDuplicates,
        enabled: true,
        load_status: LoadStatus::Idle,
        last_load_timestamp: Some(now - chrono::Duration::hours(1)),
        failed_since: None,
        consecutive_zero_record_runs: 0,
        failed_retry_count: 0,
        version_status: VersionStatus::Active,
        version_number: 1,
        parent_version_id: None,
        approval_status: None,
        approved_by: None,
        approved_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// A loader that has never run — `lastLoadTimestamp` null, as S1 requires.
pub fn first_run_loader(code: &str) -> Loader {
    let mut l = loader(code);
    l.last_load_timestamp = None;
    l
}

/// A loader sitting in FAILED since `failed_since`, as S4's reaper scenario
/// starts from.
pub fn failed_loader(code: &str, failed_since: DateTime<Utc>, retry_count: i64) -> Loader {
    let mut l = loader(code);
    l.load_status = LoadStatus::Failed;
    l.failed_since = Some(failed_since);
    l.failed_retry_count = retry_count;
    l
}

/// A draft pending approval, as S6 needs for `L2`.
pub fn pending_draft(code: &str, parent_version_id: Uuid, version_number: i64) -> Loader {
    let mut l = loader(code);
    l.version_status = VersionStatus::PendingApproval;
    l.parent_version_id = Some(parent_version_id);
    l.version_number = version_number;
    l.approval_status = Some(ApprovalStatus::PendingApproval);
    l
}

pub fn postgres_source(db_code: &str) -> SourceDatabase {
    let now = Utc::now();
    SourceDatabase {
        id: Uuid::new_v4(),
        db_code: db_code.to_string(),
        kind: SourceKind::Postgresql,
        host: "localhost".to_string(),
        port: 5432,
        database: "analytics".to_string(),
        username: "loadhub_ro".to_string(),
        password_encrypted: vec![],
        created_at: now,
        updated_at: now,
    }
}
