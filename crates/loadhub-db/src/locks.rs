//! `loader_execution_lock` repository: the storage half of the Distributed
//! Lock Manager (4.6). `uq_lock_one_held` (one `released=false` row per
//! `loader_code`) is the actual mutual-exclusion mechanism; this module just
//! translates its unique-violation races into `Ok(None)` ("Busy") instead of
//! propagating a raw `sqlx::Error`, the way the teacher's `arm_run` turns a
//! `uq_live_engine_active_run` violation into a domain error.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use loadhub_schemas::LoaderExecutionLock;
use sqlx::{PgPool, Row};
use uuid::Uuid;

fn row_to_lock(row: sqlx::postgres::PgRow) -> Result<LoaderExecutionLock> {
    Ok(LoaderExecutionLock {
        lock_id: row.try_get("lock_id")?,
        loader_code: row.try_get("loader_code")?,
        replica_name: row.try_get("replica_name")?,
        acquired_at: row.try_get("acquired_at")?,
        released: row.try_get("released")?,
        released_at: row.try_get("released_at")?,
        load_history_id: row.try_get("load_history_id")?,
        version: row.try_get("version")?,
    })
}

/// Attempt to acquire the lock for `loader_code`. Returns `Ok(None)` (Busy)
/// on the expected unique-violation race rather than an error — losing this
/// race is a normal scheduling outcome, not a fault.
pub async fn try_acquire(
    pool: &PgPool,
    loader_code: &str,
    replica_name: &str,
) -> Result<Option<LoaderExecutionLock>> {
    let result = sqlx::query(
        r#"
        insert into loader_execution_lock (loader_code, replica_name)
        values ($1, $2)
        returning lock_id, loader_code, replica_name, acquired_at, released,
                  released_at, load_history_id, version
        "#,
    )
    .bind(loader_code)
    .bind(replica_name)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(Some(row_to_lock(row)?)),
        Err(sqlx::Error::Database(db_err))
            if db_err.code().as_deref() == Some("23505")
                && db_err.constraint() == Some("uq_lock_one_held") =>
        {
            Ok(None)
        }
        Err(e) => Err(anyhow::Error::new(e).context("try_acquire failed")),
    }
}

/// Attach the `LoadHistory` row id once execution history has started.
pub async fn attach_load_history(
    pool: &PgPool,
    lock_id: Uuid,
    load_history_id: Uuid,
) -> Result<()> {
    sqlx::query("update loader_execution_lock set load_history_id = $2 where lock_id = $1")
        .bind(lock_id)
        .bind(load_history_id)
        .execute(pool)
        .await
        .context("attach_load_history failed")?;
    Ok(())
}

/// Release a held lock, bumping `version` as an optimistic guard against
/// double-release. Returns `false` if the lock was already released.
pub async fn release(pool: &PgPool, lock_id: Uuid, expected_version: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        update loader_execution_lock
           set released = true, released_at = now(), version = version + 1
         where lock_id = $1 and released = false and version = $2
        "#,
    )
    .bind(lock_id)
    .bind(expected_version)
    .execute(pool)
    .await
    .context("release failed")?;
    Ok(result.rows_affected() > 0)
}

/// Rows with `released=false` and `acquired_at` older than `threshold` —
/// candidates for the reaper to mark released and whose in-flight run it
/// finalizes as FAILED/STALE.
pub async fn list_stale_held(
    pool: &PgPool,
    threshold: DateTime<Utc>,
) -> Result<Vec<LoaderExecutionLock>> {
    let rows = sqlx::query(
        r#"
        select lock_id, loader_code, replica_name, acquired_at, released,
               released_at, load_history_id, version
        from loader_execution_lock
        where released = false and acquired_at < $1
        order by acquired_at asc
        "#,
    )
    .bind(threshold)
    .fetch_all(pool)
    .await
    .context("list_stale_held failed")?;
    rows.into_iter().map(row_to_lock).collect()
}

/// Force-release a stale lock. Unlike `release`, no caller-known version is
/// available (the reaper observed the row from the outside), so this just
/// requires the row to still be held.
pub async fn reap(pool: &PgPool, lock_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "update loader_execution_lock set released = true, released_at = now(), version = version + 1 \
         where lock_id = $1 and released = false",
    )
    .bind(lock_id)
    .execute(pool)
    .await
    .context("reap failed")?;
    Ok(result.rows_affected() > 0)
}

/// Count of currently-held locks for a loader code — used by tests asserting
/// property 3 (mutual exclusion) and by the executor's "already active on
/// this replica" check.
pub async fn count_held(pool: &PgPool, loader_code: &str) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        "select count(*)::bigint from loader_execution_lock where loader_code = $1 and released = false",
    )
    .bind(loader_code)
    .fetch_one(pool)
    .await
    .context("count_held failed")?;
    Ok(n)
}
