//! `loader_backfill_job` repository. Lifecycle: PENDING -> RUNNING ->
//! {SUCCESS|FAILED|CANCELLED}.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use loadhub_schemas::{BackfillJob, BackfillStatus, PurgeStrategy};
use sqlx::{PgPool, Row};
use uuid::Uuid;

fn row_to_job(row: sqlx::postgres::PgRow) -> Result<BackfillJob> {
    Ok(BackfillJob {
        id: row.try_get("id")?,
        loader_code: row.try_get("loader_code")?,
        from_time_epoch: row.try_get("from_time_epoch")?,
        to_time_epoch: row.try_get("to_time_epoch")?,
        purge_strategy: PurgeStrategy::parse(&row.try_get::<String, _>("purge_strategy")?)?,
        status: BackfillStatus::parse(&row.try_get::<String, _>("status")?)?,
        requested_by: row.try_get("requested_by")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        records_loaded: row.try_get("records_loaded")?,
        records_ingested: row.try_get("records_ingested")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}

const SELECT_COLUMNS: &str = r#"
    id, loader_code, from_time_epoch, to_time_epoch, purge_strategy, status,
    requested_by, started_at, finished_at, records_loaded, records_ingested,
    error_message, created_at
"#;

pub struct NewBackfillJob {
    pub loader_code: String,
    pub from_time_epoch: i64,
    pub to_time_epoch: i64,
    pub purge_strategy: PurgeStrategy,
    pub requested_by: String,
}

pub async fn create(pool: &PgPool, job: &NewBackfillJob) -> Result<BackfillJob> {
    let row = sqlx::query(&format!(
        r#"
        insert into loader_backfill_job (loader_code, from_time_epoch, to_time_epoch, purge_strategy, requested_by)
        values ($1, $2, $3, $4, $5)
        returning {SELECT_COLUMNS}
        "#
    ))
    .bind(&job.loader_code)
    .bind(job.from_time_epoch)
    .bind(job.to_time_epoch)
    .bind(job.purge_strategy.as_str())
    .bind(&job.requested_by)
    .fetch_one(pool)
    .await
    .context("backfill::create failed")?;
    row_to_job(row)
}

pub async fn fetch_by_id(pool: &PgPool, id: Uuid) -> Result<Option<BackfillJob>> {
    let row = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from loader_backfill_job where id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("backfill::fetch_by_id failed")?;
    row.map(row_to_job).transpose()
}

pub async fn list_for_loader(pool: &PgPool, loader_code: &str) -> Result<Vec<BackfillJob>> {
    let rows = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from loader_backfill_job where loader_code = $1 order by created_at desc"
    ))
    .bind(loader_code)
    .fetch_all(pool)
    .await
    .context("backfill::list_for_loader failed")?;
    rows.into_iter().map(row_to_job).collect()
}

pub async fn mark_running(pool: &PgPool, id: Uuid, started_at: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        "update loader_backfill_job set status = 'RUNNING', started_at = $2 where id = $1 and status = 'PENDING'",
    )
    .bind(id)
    .bind(started_at)
    .execute(pool)
    .await
    .context("backfill::mark_running failed")?;
    Ok(result.rows_affected() > 0)
}

pub async fn finalize(
    pool: &PgPool,
    id: Uuid,
    status: BackfillStatus,
    finished_at: DateTime<Utc>,
    records_loaded: i64,
    records_ingested: i64,
    error_message: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        update loader_backfill_job set
            status = $2, finished_at = $3, records_loaded = $4,
            records_ingested = $5, error_message = $6
        where id = $1 and status = 'RUNNING'
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(finished_at)
    .bind(records_loaded)
    .bind(records_ingested)
    .bind(error_message)
    .execute(pool)
    .await
    .context("backfill::finalize failed")?;
    Ok(())
}

pub async fn cancel(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "update loader_backfill_job set status = 'CANCELLED', finished_at = now() \
         where id = $1 and status = 'PENDING'",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("backfill::cancel failed")?;
    Ok(result.rows_affected() > 0)
}
