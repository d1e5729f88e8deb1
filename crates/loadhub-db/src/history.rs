//! `loader_load_history` repository (Execution History Store, 4.7).
//! Append-only: one RUNNING row on acquisition, updated exactly once to a
//! terminal status.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use loadhub_schemas::{LoadHistory, LoadHistoryStatus};
use sqlx::{PgPool, Row};
use uuid::Uuid;

fn row_to_history(row: sqlx::postgres::PgRow) -> Result<LoadHistory> {
    Ok(LoadHistory {
        id: row.try_get("id")?,
        loader_code: row.try_get("loader_code")?,
        loader_version: row.try_get("loader_version")?,
        status: LoadHistoryStatus::parse(&row.try_get::<String, _>("status")?)?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        duration_seconds: row.try_get("duration_seconds")?,
        query_from_time: row.try_get("query_from_time")?,
        query_to_time: row.try_get("query_to_time")?,
        actual_from_time: row.try_get("actual_from_time")?,
        actual_to_time: row.try_get("actual_to_time")?,
        records_loaded: row.try_get("records_loaded")?,
        records_ingested: row.try_get("records_ingested")?,
        error_message: row.try_get("error_message")?,
        replica_name: row.try_get("replica_name")?,
    })
}

pub async fn start(
    pool: &PgPool,
    loader_code: &str,
    loader_version: i64,
    replica_name: &str,
    start_time: DateTime<Utc>,
) -> Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        insert into loader_load_history (loader_code, loader_version, status, start_time, replica_name)
        values ($1, $2, 'RUNNING', $3, $4)
        returning id
        "#,
    )
    .bind(loader_code)
    .bind(loader_version)
    .bind(start_time)
    .bind(replica_name)
    .fetch_one(pool)
    .await
    .context("history::start failed")?;
    Ok(id)
}

pub struct Finalize {
    pub status: LoadHistoryStatus,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub query_from_time: DateTime<Utc>,
    pub query_to_time: DateTime<Utc>,
    pub actual_from_time: Option<DateTime<Utc>>,
    pub actual_to_time: Option<DateTime<Utc>>,
    pub records_loaded: i64,
    pub records_ingested: i64,
    pub error_message: Option<String>,
}

/// The single RUNNING -> terminal transition. Guards on `status = 'RUNNING'`
/// so a row already finalized (e.g. by the reaper) cannot be overwritten.
pub async fn finalize(pool: &PgPool, id: Uuid, f: &Finalize) -> Result<bool> {
    let result = sqlx::query(
        r#"
        update loader_load_history set
            status = $2,
            end_time = $3,
            duration_seconds = $4,
            query_from_time = $5,
            query_to_time = $6,
            actual_from_time = $7,
            actual_to_time = $8,
            records_loaded = $9,
            records_ingested = $10,
            error_message = $11
        where id = $1 and status = 'RUNNING'
        "#,
    )
    .bind(id)
    .bind(f.status.as_str())
    .bind(f.end_time)
    .bind(f.duration_seconds)
    .bind(f.query_from_time)
    .bind(f.query_to_time)
    .bind(f.actual_from_time)
    .bind(f.actual_to_time)
    .bind(f.records_loaded)
    .bind(f.records_ingested)
    .bind(&f.error_message)
    .execute(pool)
    .await
    .context("history::finalize failed")?;
    Ok(result.rows_affected() > 0)
}

/// RUNNING rows older than `threshold` — candidates the reaper normalizes to
/// FAILED when their owning lock has also gone stale (4.7, orphaned RUNNING).
pub async fn list_stale_running(
    pool: &PgPool,
    threshold: DateTime<Utc>,
) -> Result<Vec<LoadHistory>> {
    let rows = sqlx::query(
        r#"
        select id, loader_code, loader_version, status, start_time, end_time,
               duration_seconds, query_from_time, query_to_time, actual_from_time,
               actual_to_time, records_loaded, records_ingested, error_message, replica_name
        from loader_load_history
        where status = 'RUNNING' and start_time < $1
        order by start_time asc
        "#,
    )
    .bind(threshold)
    .fetch_all(pool)
    .await
    .context("list_stale_running failed")?;
    rows.into_iter().map(row_to_history).collect()
}

pub async fn list_for_loader(
    pool: &PgPool,
    loader_code: &str,
    limit: i64,
) -> Result<Vec<LoadHistory>> {
    let rows = sqlx::query(
        r#"
        select id, loader_code, loader_version, status, start_time, end_time,
               duration_seconds, query_from_time, query_to_time, actual_from_time,
               actual_to_time, records_loaded, records_ingested, error_message, replica_name
        from loader_load_history
        where loader_code = $1
        order by start_time desc
        limit $2
        "#,
    )
    .bind(loader_code)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list_for_loader failed")?;
    rows.into_iter().map(row_to_history).collect()
}
