//! Ingest Service (§4.8): dispatches a run's `SignalsHistory` candidates to
//! the purge-strategy write that matches the loader's configured policy.
//! Each write is a single atomic storage transaction.

use anyhow::Result;
use loadhub_db::signals::IngestCounts;
use loadhub_schemas::{PurgeStrategy, SignalsHistory};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug)]
pub enum IngestOutcome {
    Applied(IngestCounts),
    /// FAIL_ON_DUPLICATE found a pre-existing key; the batch was not
    /// applied at all (§4.10's ingest-conflict branch: history goes
    /// PARTIAL, the watermark does not advance).
    DuplicateConflict,
}

/// Writes `candidates` under `strategy`. `window` bounds the delete in
/// PURGE_AND_RELOAD; it is the run's `[fromTime, toTime)` expressed as
/// epoch seconds, matching `SignalsHistory::load_timestamp`.
pub async fn apply(
    pool: &PgPool,
    loader_code: &str,
    load_history_id: Uuid,
    strategy: PurgeStrategy,
    window: (i64, i64),
    candidates: &[SignalsHistory],
) -> Result<IngestOutcome> {
    match strategy {
        PurgeStrategy::FailOnDuplicate => {
            match loadhub_db::signals::fail_on_duplicate(pool, loader_code, load_history_id, candidates).await {
                Ok(counts) => Ok(IngestOutcome::Applied(counts)),
                Err(e) if e.to_string().contains("already present") => Ok(IngestOutcome::DuplicateConflict),
                Err(e) => Err(e),
            }
        }
        PurgeStrategy::PurgeAndReload => {
            let (from_epoch, to_epoch) = window;
            let counts = loadhub_db::signals::purge_and_reload(
                pool,
                loader_code,
                load_history_id,
                from_epoch,
                to_epoch,
                candidates,
            )
            .await?;
            Ok(IngestOutcome::Applied(counts))
        }
        PurgeStrategy::SkipDuplicates => {
            let counts = loadhub_db::signals::skip_duplicates(pool, loader_code, load_history_id, candidates).await?;
            Ok(IngestOutcome::Applied(counts))
        }
    }
}

pub async fn query_window(
    pool: &PgPool,
    loader_code: &str,
    from_epoch: i64,
    to_epoch: i64,
) -> Result<Vec<SignalsHistory>> {
    loadhub_db::signals::query_window(pool, loader_code, from_epoch, to_epoch).await
}
