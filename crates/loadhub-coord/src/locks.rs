//! `tryAcquire`/`release` (§4.6) as the `Acquired | Busy` result type the
//! design notes call for in place of exception-for-control-flow.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LockHandle {
    pub lock_id: Uuid,
    pub loader_code: String,
    pub replica_name: String,
    pub acquired_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    Acquired(LockHandle),
    Busy,
}

/// Insert-guarded-by-`uq_lock_one_held` acquisition. Losing the race is a
/// normal scheduling outcome (`Busy`), not an error.
pub async fn try_acquire(
    pool: &PgPool,
    loader_code: &str,
    replica_name: &str,
) -> Result<AcquireOutcome> {
    match loadhub_db::locks::try_acquire(pool, loader_code, replica_name).await? {
        Some(row) => Ok(AcquireOutcome::Acquired(LockHandle {
            lock_id: row.lock_id,
            loader_code: row.loader_code,
            replica_name: row.replica_name,
            acquired_at: row.acquired_at,
            version: row.version,
        })),
        None => Ok(AcquireOutcome::Busy),
    }
}

pub async fn attach_history(pool: &PgPool, handle: &LockHandle, history_id: Uuid) -> Result<()> {
    loadhub_db::locks::attach_load_history(pool, handle.lock_id, history_id).await
}

/// Release the held lock. `false` means the lock was already released —
/// the caller raced a reaper or a duplicate release call and must not treat
/// that as a fault.
pub async fn release(pool: &PgPool, handle: &LockHandle) -> Result<bool> {
    loadhub_db::locks::release(pool, handle.lock_id, handle.version).await
}
