//! Single-shot stale-lock + orphaned-RUNNING-history normalization (§4.6
//! reaping, §4.12 "corrupt state" table). `loadhub-reaper` is the background
//! loop that calls this on a timer; this module is the operation itself so
//! the CLI's `locks reap` can invoke it directly too.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ReapReport {
    pub locks_reaped: Vec<String>,
    pub histories_finalized: Vec<Uuid>,
}

/// Marks as released any lock row held past `now - stale_threshold`,
/// finalizes its RUNNING history row to FAILED, and returns the owning
/// loader to FAILED so the scheduler's backoff applies. Also finalizes any
/// RUNNING history row that has outlived the threshold with no
/// corresponding held lock at all (the lock-row-missing half of the
/// corrupt-state table).
pub async fn reap_stale(
    pool: &PgPool,
    stale_threshold: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<ReapReport> {
    let mut report = ReapReport::default();
    let threshold_at = now - stale_threshold;

    let stale_locks = loadhub_db::locks::list_stale_held(pool, threshold_at).await?;
    for lock in stale_locks {
        if !loadhub_db::locks::reap(pool, lock.lock_id).await? {
            continue;
        }
        tracing::warn!(
            loader_code = %lock.loader_code,
            replica_name = %lock.replica_name,
            "reaped stale execution lock"
        );
        report.locks_reaped.push(lock.loader_code.clone());

        if let Some(history_id) = lock.load_history_id {
            if finalize_stale_history(pool, history_id, now, "reaped: stale lock exceeded threshold").await? {
                report.histories_finalized.push(history_id);
            }
        }

        if let Some(loader) = loadhub_db::loaders::fetch_active_by_code(pool, &lock.loader_code).await? {
            loadhub_db::loaders::record_failure(pool, loader.id, now).await?;
        }
    }

    let stale_histories = loadhub_db::history::list_stale_running(pool, threshold_at).await?;
    for history in stale_histories {
        if report.histories_finalized.contains(&history.id) {
            continue;
        }
        if loadhub_db::locks::count_held(pool, &history.loader_code).await? > 0 {
            // A live lock still covers this run; leave it to the lock-side pass.
            continue;
        }
        if finalize_stale_history(pool, history.id, now, "reaped: orphaned RUNNING row with no live lock").await? {
            tracing::warn!(loader_code = %history.loader_code, history_id = %history.id, "finalized orphaned RUNNING history");
            report.histories_finalized.push(history.id);
        }
        if let Some(loader) = loadhub_db::loaders::fetch_active_by_code(pool, &history.loader_code).await? {
            loadhub_db::loaders::record_failure(pool, loader.id, now).await?;
        }
    }

    Ok(report)
}

async fn finalize_stale_history(
    pool: &PgPool,
    history_id: Uuid,
    now: DateTime<Utc>,
    error_message: &str,
) -> Result<bool> {
    loadhub_db::history::finalize(
        pool,
        history_id,
        &loadhub_db::history::Finalize {
            status: loadhub_schemas::LoadHistoryStatus::Failed,
            end_time: now,
            duration_seconds: 0.0,
            query_from_time: now,
            query_to_time: now,
            actual_from_time: None,
            actual_to_time: None,
            records_loaded: 0,
            records_ingested: 0,
            error_message: Some(error_message.to_string()),
        },
    )
    .await
}
