//! Loader Executor (§4.10): the end-to-end run orchestration composing
//! every lower-level crate under one `replicaName`-held lock.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use loadhub_coord::{history, locks, AcquireOutcome, FinalizeOutcome, LockHandle};
use loadhub_crypto::EncryptionKey;
use loadhub_ingest::IngestOutcome;
use loadhub_schemas::{Loader, LoadHistoryStatus};
use loadhub_sources::SourceRegistry;
use sqlx::PgPool;
use std::time::Duration as StdDuration;

pub struct ExecutorConfig {
    pub query_timeout: StdDuration,
    pub default_lookback_hours: i64,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// The lock was held elsewhere; no work was attempted (§4.10 `Skipped`).
    Skipped,
    Success { records_loaded: i64, records_ingested: i64 },
    /// FAIL_ON_DUPLICATE found a pre-existing key; `lastLoadTimestamp` did
    /// not advance.
    DuplicateConflict,
    Failed(String),
}

/// Runs one loader to completion against the current ACTIVE version row,
/// exactly the try/finally shape of §4.10's pseudocode: the lock is always
/// released, history is always finalized exactly once, and the watermark
/// advances only on `Success`.
pub async fn execute_once(
    pool: &PgPool,
    registry: &SourceRegistry,
    encryption_key: &EncryptionKey,
    loader: &Loader,
    replica_name: &str,
    config: &ExecutorConfig,
    now: DateTime<Utc>,
) -> Result<RunOutcome> {
    let handle = match locks::try_acquire(pool, &loader.loader_code, replica_name).await? {
        AcquireOutcome::Acquired(handle) => handle,
        AcquireOutcome::Busy => return Ok(RunOutcome::Skipped),
    };

    let history_handle = history::start(pool, &loader.loader_code, loader.version_number, replica_name, now).await?;
    locks::attach_history(pool, &handle, history_handle.id).await?;
    loadhub_db::loaders::set_running(pool, loader.id).await?;

    let window = loadhub_query::compute_window(
        loader.last_load_timestamp,
        loader.max_query_period_seconds,
        config.default_lookback_hours,
        now,
    );

    let outcome = run_window(pool, registry, encryption_key, loader, config, window, history_handle.id).await;

    let run_outcome = match outcome {
        Ok(RunResult::Success { records_loaded, records_ingested, actual_from, actual_to }) => {
            finalize_and_release(pool, &handle, &history_handle, now, FinalizeOutcome {
                status: LoadHistoryStatus::Success,
                query_from_time: window.from_time,
                query_to_time: window.to_time,
                actual_from_time: actual_from,
                actual_to_time: actual_to,
                records_loaded,
                records_ingested,
                error_message: None,
            }).await?;

            loadhub_db::loaders::record_success(pool, loader.id, window.to_time, records_loaded).await?;

            RunOutcome::Success { records_loaded, records_ingested }
        }
        Ok(RunResult::DuplicateConflict) => {
            finalize_and_release(pool, &handle, &history_handle, now, FinalizeOutcome {
                status: LoadHistoryStatus::Partial,
                query_from_time: window.from_time,
                query_to_time: window.to_time,
                actual_from_time: None,
                actual_to_time: None,
                records_loaded: 0,
                records_ingested: 0,
                error_message: Some("duplicates present".to_string()),
            }).await?;
            loadhub_db::loaders::set_idle(pool, loader.id).await?;
            RunOutcome::DuplicateConflict
        }
        Err(e) => {
            let message = e.to_string();
            finalize_and_release(pool, &handle, &history_handle, now, FinalizeOutcome {
                status: LoadHistoryStatus::Failed,
                query_from_time: window.from_time,
                query_to_time: window.to_time,
                actual_from_time: None,
                actual_to_time: None,
                records_loaded: 0,
                records_ingested: 0,
                error_message: Some(message.clone()),
            }).await?;
            loadhub_db::loaders::record_failure(pool, loader.id, now).await?;
            RunOutcome::Failed(message)
        }
    };

    Ok(run_outcome)
}

enum RunResult {
    Success {
        records_loaded: i64,
        records_ingested: i64,
        actual_from: Option<DateTime<Utc>>,
        actual_to: Option<DateTime<Utc>>,
    },
    DuplicateConflict,
}

async fn run_window(
    pool: &PgPool,
    registry: &SourceRegistry,
    encryption_key: &EncryptionKey,
    loader: &Loader,
    config: &ExecutorConfig,
    window: loadhub_query::TimeWindow,
    history_id: uuid::Uuid,
) -> Result<RunResult> {
    let source = loadhub_db::sources::fetch_by_id(pool, loader.source_database_id)
        .await?
        .with_context(|| format!("loader {} references a missing source database", loader.loader_code))?;
    let source_pool = registry
        .get_pool(&source.db_code)
        .await
        .with_context(|| format!("source registry has no pool for '{}'", source.db_code))?;

    let sql = loadhub_crypto::Encrypted::<String>::from_bytes(loader.loader_sql_encrypted.clone())
        .open(encryption_key)
        .context("failed to decrypt loader SQL")?;

    let rows = loadhub_query::run(
        &source_pool,
        &sql,
        window.from_time,
        window.to_time,
        loader.source_timezone_offset_hours,
        config.query_timeout,
    )
    .await
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let transformed =
        loadhub_transform::transform(pool, &loader.loader_code, rows, loader.source_timezone_offset_hours).await?;

    let records_loaded: i64 = transformed.candidates.iter().map(|c| c.rec_count).sum();

    let outcome = loadhub_ingest::apply(
        pool,
        &loader.loader_code,
        history_id,
        loader.purge_strategy,
        (window.from_time.timestamp(), window.to_time.timestamp()),
        &transformed.candidates,
    )
    .await?;

    match outcome {
        IngestOutcome::Applied(counts) => Ok(RunResult::Success {
            records_loaded,
            records_ingested: counts.inserted,
            actual_from: transformed.observed_from_time,
            actual_to: transformed.observed_to_time,
        }),
        IngestOutcome::DuplicateConflict => Ok(RunResult::DuplicateConflict),
    }
}

async fn finalize_and_release(
    pool: &PgPool,
    handle: &LockHandle,
    history_handle: &history::HistoryHandle,
    now: DateTime<Utc>,
    outcome: FinalizeOutcome,
) -> Result<()> {
    history::finalize(pool, history_handle, now, &outcome).await?;
    locks::release(pool, handle).await?;
    Ok(())
}
