use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::loader::{LoadStatus, Loader};
use crate::versioning::{ApprovalStatus, VersionStatus};

/// Derived display state of a loader (4.12), distinct from the persisted
/// [`LoadStatus`]/[`VersionStatus`] columns it's computed from. Never
/// stored — recomputed from the loader row (plus the "is it actually
/// running right now" fact, which outlives a crashed process longer than
/// `loadStatus` alone can tell you) every time a response is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoaderState {
    PendingApproval,
    Rejected,
    Running,
    Error,
    Disabled,
    Idle,
    Enabled,
}

impl LoaderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderState::PendingApproval => "PENDING_APPROVAL",
            LoaderState::Rejected => "REJECTED",
            LoaderState::Running => "RUNNING",
            LoaderState::Error => "ERROR",
            LoaderState::Disabled => "DISABLED",
            LoaderState::Idle => "IDLE",
            LoaderState::Enabled => "ENABLED",
        }
    }

    /// Implements the §4.12 derivation chain in order. `lock_held` is the
    /// ground truth for "running now" — more reliable than `loadStatus`
    /// alone across a crashed process, since the reaper is what eventually
    /// reconciles the two. `recent_failure` is `failedSince` within the
    /// backoff window still in force at `now`.
    pub fn derive(loader: &Loader, lock_held: bool, now: DateTime<Utc>) -> Self {
        if loader.approval_status == Some(ApprovalStatus::PendingApproval) {
            return LoaderState::PendingApproval;
        }
        if loader.approval_status == Some(ApprovalStatus::Rejected) {
            return LoaderState::Rejected;
        }
        if lock_held || loader.load_status == LoadStatus::Running {
            return LoaderState::Running;
        }
        if recent_failure(loader, now) {
            return LoaderState::Error;
        }
        if !loader.enabled {
            return LoaderState::Disabled;
        }
        if loader.last_load_timestamp.is_none() {
            return LoaderState::Idle;
        }
        LoaderState::Enabled
    }
}

/// A failure is "recent" while the loader's own backoff window (§9 open
/// question: exponential base 30s, factor 2, cap 30min — see DESIGN.md)
/// still excludes it from scheduling; once that window has elapsed the
/// loader is eligible again and no longer shown as ERROR.
fn recent_failure(loader: &Loader, now: DateTime<Utc>) -> bool {
    let Some(failed_since) = loader.failed_since else {
        return false;
    };
    if loader.load_status != LoadStatus::Failed {
        return false;
    }
    !is_backoff_elapsed(loader.failed_retry_count, failed_since, now)
}

/// Exponential backoff keyed on `failedRetryCount` (the number of
/// consecutive failed attempts), not on elapsed time alone — a loader that
/// has failed ten times in a row waits longer between retries than one on
/// its first failure, even if both became FAILED moments ago.
pub fn backoff_seconds_since(attempts: i64) -> i64 {
    let capped_exponent = attempts.max(0).min(10) as u32;
    (30i64.saturating_mul(1i64 << capped_exponent)).min(1800)
}

/// True once `failedSince + backoff(failedRetryCount) <= now` — the
/// due-ness check the scheduler's poll tick applies to FAILED loaders on
/// top of `list_schedulable`'s ACTIVE/enabled/IDLE-or-FAILED filter.
pub fn is_backoff_elapsed(failed_retry_count: i64, failed_since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let backoff_seconds = backoff_seconds_since(failed_retry_count);
    (now - failed_since).num_seconds() >= backoff_seconds
}

/// Version-level admissibility check independent of `LoaderState` — a
/// DRAFT/ARCHIVED row is never shown with a live operational state at all,
/// callers should gate on `version_status` before calling [`LoaderState::derive`].
pub fn is_operational_version(version_status: VersionStatus) -> bool {
    matches!(version_status, VersionStatus::Active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::PurgeStrategy;
    use uuid::Uuid;

    fn base_loader() -> Loader {
        Loader {
            id: Uuid::nil(),
            loader_code: "T".into(),
            loader_sql_encrypted: vec![],
            source_database_id: Uuid::nil(),
            min_interval_seconds: 60,
            max_interval_seconds: 300,
            max_query_period_seconds: 3600,
            max_parallel_executions: 1,
            source_timezone_offset_hours: 0,
            aggregation_period_seconds: None,
            purge_strategy: PurgeStrategy::SkipDuplicates,
            enabled: true,
            load_status: LoadStatus::Idle,
            last_load_timestamp: Some(Utc::now()),
            failed_since: None,
            consecutive_zero_record_runs: 0,
            failed_retry_count: 0,
            version_status: VersionStatus::Active,
            version_number: 1,
            parent_version_id: None,
            approval_status: None,
            approved_by: None,
            approved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn pending_approval_wins_over_everything_else() {
        let mut loader = base_loader();
        loader.approval_status = Some(ApprovalStatus::PendingApproval);
        loader.enabled = false;
        assert_eq!(LoaderState::derive(&loader, false, Utc::now()), LoaderState::PendingApproval);
    }

    #[test]
    fn lock_held_means_running_even_if_load_status_lags() {
        let loader = base_loader();
        assert_eq!(LoaderState::derive(&loader, true, Utc::now()), LoaderState::Running);
    }

    #[test]
    fn disabled_wins_over_idle() {
        let mut loader = base_loader();
        loader.enabled = false;
        assert_eq!(LoaderState::derive(&loader, false, Utc::now()), LoaderState::Disabled);
    }

    #[test]
    fn never_run_is_idle_when_enabled() {
        let mut loader = base_loader();
        loader.last_load_timestamp = None;
        assert_eq!(LoaderState::derive(&loader, false, Utc::now()), LoaderState::Idle);
    }

    #[test]
    fn recent_failure_is_error_until_backoff_elapses() {
        let mut loader = base_loader();
        loader.load_status = LoadStatus::Failed;
        loader.failed_since = Some(Utc::now());
        assert_eq!(LoaderState::derive(&loader, false, Utc::now()), LoaderState::Error);

        loader.failed_since = Some(Utc::now() - chrono::Duration::seconds(3600));
        assert_eq!(LoaderState::derive(&loader, false, Utc::now()), LoaderState::Enabled);
    }

    #[test]
    fn repeated_failures_widen_the_backoff_window() {
        let mut loader = base_loader();
        loader.load_status = LoadStatus::Failed;
        loader.failed_since = Some(Utc::now() - chrono::Duration::seconds(45));
        loader.failed_retry_count = 0;
        assert_eq!(LoaderState::derive(&loader, false, Utc::now()), LoaderState::Enabled);

        loader.failed_retry_count = 3;
        assert_eq!(LoaderState::derive(&loader, false, Utc::now()), LoaderState::Error);
    }
}
