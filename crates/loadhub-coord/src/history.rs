//! Execution History Store (§4.7): append a RUNNING row on acquisition,
//! update it exactly once to a terminal status.

use anyhow::Result;
use chrono::{DateTime, Utc};
use loadhub_schemas::LoadHistoryStatus;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct HistoryHandle {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
}

pub async fn start(
    pool: &PgPool,
    loader_code: &str,
    loader_version: i64,
    replica_name: &str,
    now: DateTime<Utc>,
) -> Result<HistoryHandle> {
    let id = loadhub_db::history::start(pool, loader_code, loader_version, replica_name, now).await?;
    Ok(HistoryHandle { id, start_time: now })
}

/// What the executor reports back for the single RUNNING -> terminal
/// transition.
pub struct FinalizeOutcome {
    pub status: LoadHistoryStatus,
    pub query_from_time: DateTime<Utc>,
    pub query_to_time: DateTime<Utc>,
    pub actual_from_time: Option<DateTime<Utc>>,
    pub actual_to_time: Option<DateTime<Utc>>,
    pub records_loaded: i64,
    pub records_ingested: i64,
    pub error_message: Option<String>,
}

/// Finalizes a RUNNING row. Returns `false` if it was already finalized
/// (e.g. by the reaper racing a slow executor) — the caller must not then
/// also touch the loader's `loadStatus`, since the reaper already did.
pub async fn finalize(
    pool: &PgPool,
    handle: &HistoryHandle,
    now: DateTime<Utc>,
    outcome: &FinalizeOutcome,
) -> Result<bool> {
    let duration_seconds = (now - handle.start_time).num_milliseconds() as f64 / 1000.0;
    loadhub_db::history::finalize(
        pool,
        handle.id,
        &loadhub_db::history::Finalize {
            status: outcome.status,
            end_time: now,
            duration_seconds,
            query_from_time: outcome.query_from_time,
            query_to_time: outcome.query_to_time,
            actual_from_time: outcome.actual_from_time,
            actual_to_time: outcome.actual_to_time,
            records_loaded: outcome.records_loaded,
            records_ingested: outcome.records_ingested,
            error_message: outcome.error_message.clone(),
        },
    )
    .await
}
