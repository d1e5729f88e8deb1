//! `loader` table repository: one row per configuration version.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use loadhub_schemas::{LoadStatus, Loader, PurgeStrategy, VersionStatus};
use sqlx::{PgPool, Row};
use uuid::Uuid;

fn row_to_loader(row: sqlx::postgres::PgRow) -> Result<Loader> {
    Ok(Loader {
        id: row.try_get("id")?,
        loader_code: row.try_get("loader_code")?,
        loader_sql_encrypted: row.try_get("loader_sql_encrypted")?,
        source_database_id: row.try_get("source_database_id")?,
        min_interval_seconds: row.try_get("min_interval_seconds")?,
        max_interval_seconds: row.try_get("max_interval_seconds")?,
        max_query_period_seconds: row.try_get("max_query_period_seconds")?,
        max_parallel_executions: row.try_get("max_parallel_executions")?,
        source_timezone_offset_hours: row.try_get("source_timezone_offset_hours")?,
        aggregation_period_seconds: row.try_get("aggregation_period_seconds")?,
        purge_strategy: PurgeStrategy::parse(&row.try_get::<String, _>("purge_strategy")?)?,
        enabled: row.try_get("enabled")?,
        load_status: LoadStatus::parse(&row.try_get::<String, _>("load_status")?)?,
        last_load_timestamp: row.try_get("last_load_timestamp")?,
        failed_since: row.try_get("failed_since")?,
        consecutive_zero_record_runs: row.try_get("consecutive_zero_record_runs")?,
        failed_retry_count: row.try_get("failed_retry_count")?,
        version_status: VersionStatus::parse(&row.try_get::<String, _>("version_status")?)?,
        version_number: row.try_get("version_number")?,
        parent_version_id: row.try_get("parent_version_id")?,
        approval_status: row
            .try_get::<Option<String>, _>("approval_status")?
            .map(|s| loadhub_schemas::ApprovalStatus::parse(&s))
            .transpose()?,
        approved_by: row.try_get("approved_by")?,
        approved_at: row.try_get("approved_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const SELECT_COLUMNS: &str = r#"
    id, loader_code, loader_sql_encrypted, source_database_id,
    min_interval_seconds, max_interval_seconds, max_query_period_seconds,
    max_parallel_executions, source_timezone_offset_hours, aggregation_period_seconds,
    purge_strategy, enabled, load_status, last_load_timestamp, failed_since,
    consecutive_zero_record_runs, failed_retry_count, version_status, version_number,
    parent_version_id, approval_status, approved_by, approved_at, created_at, updated_at
"#;

pub async fn fetch_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Loader>> {
    let row = sqlx::query(&format!("select {SELECT_COLUMNS} from loader where id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetch_by_id failed")?;
    row.map(row_to_loader).transpose()
}

/// The single ACTIVE version for a `loaderCode`, if any (invariant i).
pub async fn fetch_active_by_code(pool: &PgPool, loader_code: &str) -> Result<Option<Loader>> {
    let row = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from loader where loader_code = $1 and version_status = 'ACTIVE'"
    ))
    .bind(loader_code)
    .fetch_optional(pool)
    .await
    .context("fetch_active_by_code failed")?;
    row.map(row_to_loader).transpose()
}

/// The single DRAFT/PENDING_APPROVAL version for a `loaderCode`, if any
/// (invariant ii).
pub async fn fetch_draft_or_pending_by_code(
    pool: &PgPool,
    loader_code: &str,
) -> Result<Option<Loader>> {
    let row = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from loader where loader_code = $1 \
         and version_status in ('DRAFT', 'PENDING_APPROVAL')"
    ))
    .bind(loader_code)
    .fetch_optional(pool)
    .await
    .context("fetch_draft_or_pending_by_code failed")?;
    row.map(row_to_loader).transpose()
}

/// All versions of a `loaderCode`, most recent first — version history view.
pub async fn list_versions(pool: &PgPool, loader_code: &str) -> Result<Vec<Loader>> {
    let rows = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from loader where loader_code = $1 order by version_number desc"
    ))
    .bind(loader_code)
    .fetch_all(pool)
    .await
    .context("list_versions failed")?;
    rows.into_iter().map(row_to_loader).collect()
}

/// One specific version, by business key + version number — used to locate
/// the archived row `rollback` copies from.
pub async fn fetch_by_code_and_version(
    pool: &PgPool,
    loader_code: &str,
    version_number: i64,
) -> Result<Option<Loader>> {
    let row = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from loader where loader_code = $1 and version_number = $2"
    ))
    .bind(loader_code)
    .bind(version_number)
    .fetch_optional(pool)
    .await
    .context("fetch_by_code_and_version failed")?;
    row.map(row_to_loader).transpose()
}

/// Highest `version_number` assigned so far for a `loaderCode`, or 0 if
/// none exists yet.
pub async fn max_version_number(pool: &PgPool, loader_code: &str) -> Result<i64> {
    let (max,): (Option<i64>,) =
        sqlx::query_as("select max(version_number) from loader where loader_code = $1")
            .bind(loader_code)
            .fetch_one(pool)
            .await
            .context("max_version_number failed")?;
    Ok(max.unwrap_or(0))
}

/// Every distinct `loaderCode` with at least one version.
pub async fn list_distinct_codes(pool: &PgPool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("select distinct loader_code from loader order by loader_code")
            .fetch_all(pool)
            .await
            .context("list_distinct_codes failed")?;
    Ok(rows.into_iter().map(|(c,)| c).collect())
}

/// Loaders the scheduler's poll tick should consider (4.9 step 1):
/// `versionStatus=ACTIVE AND enabled=true AND loadStatus IN (IDLE, FAILED)`.
pub async fn list_schedulable(pool: &PgPool) -> Result<Vec<Loader>> {
    let rows = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from loader \
         where version_status = 'ACTIVE' and enabled = true \
         and load_status in ('IDLE', 'FAILED') \
         order by max_interval_seconds asc, last_load_timestamp asc nulls first"
    ))
    .fetch_all(pool)
    .await
    .context("list_schedulable failed")?;
    rows.into_iter().map(row_to_loader).collect()
}

pub struct NewLoaderDraft {
    pub loader_code: String,
    pub loader_sql_encrypted: Vec<u8>,
    pub source_database_id: Uuid,
    pub min_interval_seconds: i64,
    pub max_interval_seconds: i64,
    pub max_query_period_seconds: i64,
    pub max_parallel_executions: i32,
    pub source_timezone_offset_hours: i32,
    pub aggregation_period_seconds: Option<i64>,
    pub purge_strategy: PurgeStrategy,
    pub parent_version_id: Option<Uuid>,
    pub version_number: i64,
}

/// Insert a DRAFT version row. Returns `Ok(None)` (Busy) on the expected
/// unique-violation race when a DRAFT/PENDING already exists for this
/// `loaderCode` (invariant ii) — the caller should `update_draft` the
/// existing row instead, the way `spec.md` §4.11 describes "replaced".
pub async fn insert_draft(pool: &PgPool, draft: &NewLoaderDraft) -> Result<Option<Loader>> {
    let result = sqlx::query(&format!(
        r#"
        insert into loader (
            loader_code, loader_sql_encrypted, source_database_id,
            min_interval_seconds, max_interval_seconds, max_query_period_seconds,
            max_parallel_executions, source_timezone_offset_hours, aggregation_period_seconds,
            purge_strategy, enabled, load_status, version_status, version_number,
            parent_version_id
        ) values (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, false, 'IDLE', 'DRAFT', $11, $12
        )
        returning {SELECT_COLUMNS}
        "#
    ))
    .bind(&draft.loader_code)
    .bind(&draft.loader_sql_encrypted)
    .bind(draft.source_database_id)
    .bind(draft.min_interval_seconds)
    .bind(draft.max_interval_seconds)
    .bind(draft.max_query_period_seconds)
    .bind(draft.max_parallel_executions)
    .bind(draft.source_timezone_offset_hours)
    .bind(draft.aggregation_period_seconds)
    .bind(draft.purge_strategy.as_str())
    .bind(draft.version_number)
    .bind(draft.parent_version_id)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(Some(row_to_loader(row)?)),
        Err(sqlx::Error::Database(db_err))
            if db_err.code().as_deref() == Some("23505")
                && db_err.constraint() == Some("uq_loader_one_draft_or_pending") =>
        {
            Ok(None)
        }
        Err(e) => Err(anyhow::Error::new(e).context("insert_draft failed")),
    }
}

/// Overwrites an existing DRAFT's content fields in place (its `id` is
/// reused so cumulative drafts are one row, not a growing chain, §4.11).
pub async fn update_draft(pool: &PgPool, loader_id: Uuid, draft: &NewLoaderDraft) -> Result<Loader> {
    let row = sqlx::query(&format!(
        r#"
        update loader set
            loader_sql_encrypted = $2,
            source_database_id = $3,
            min_interval_seconds = $4,
            max_interval_seconds = $5,
            max_query_period_seconds = $6,
            max_parallel_executions = $7,
            source_timezone_offset_hours = $8,
            aggregation_period_seconds = $9,
            purge_strategy = $10,
            parent_version_id = $11,
            updated_at = now()
        where id = $1 and version_status = 'DRAFT'
        returning {SELECT_COLUMNS}
        "#
    ))
    .bind(loader_id)
    .bind(&draft.loader_sql_encrypted)
    .bind(draft.source_database_id)
    .bind(draft.min_interval_seconds)
    .bind(draft.max_interval_seconds)
    .bind(draft.max_query_period_seconds)
    .bind(draft.max_parallel_executions)
    .bind(draft.source_timezone_offset_hours)
    .bind(draft.aggregation_period_seconds)
    .bind(draft.purge_strategy.as_str())
    .bind(draft.parent_version_id)
    .fetch_one(pool)
    .await
    .context("update_draft failed")?;
    row_to_loader(row)
}

/// DRAFT -> PENDING_APPROVAL, the "submit" transition (§4.11).
pub async fn submit_for_approval(pool: &PgPool, loader_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "update loader set version_status = 'PENDING_APPROVAL', approval_status = 'PENDING_APPROVAL', updated_at = now() \
         where id = $1 and version_status = 'DRAFT'",
    )
    .bind(loader_id)
    .execute(pool)
    .await
    .context("submit_for_approval failed")?;
    Ok(result.rows_affected() > 0)
}

/// DRAFT/PENDING_APPROVAL -> ARCHIVED, and the previous ACTIVE (if any) ->
/// ARCHIVED in the same transaction, then the new version -> ACTIVE. This is
/// the atomic "publish" step of the versioned config lifecycle (4.11).
pub async fn activate_version(
    pool: &PgPool,
    loader_id: Uuid,
    loader_code: &str,
    new_version_number: i64,
) -> Result<()> {
    let mut tx = pool.begin().await.context("activate_version begin tx")?;

    sqlx::query("update loader set version_status = 'ARCHIVED', updated_at = now() where loader_code = $1 and version_status = 'ACTIVE'")
        .bind(loader_code)
        .execute(&mut *tx)
        .await
        .context("activate_version archive previous active")?;

    sqlx::query(
        "update loader set version_status = 'ACTIVE', approval_status = 'APPROVED', \
         version_number = $2, updated_at = now() where id = $1",
    )
    .bind(loader_id)
    .bind(new_version_number)
    .execute(&mut *tx)
    .await
    .context("activate_version promote new")?;

    tx.commit().await.context("activate_version commit")?;
    Ok(())
}

/// Draft/pending -> ARCHIVED with `versionStatus=REJECTED`; the rejection
/// reason itself lives on the `ApprovalRequest` row (§4.11).
pub async fn set_rejected(pool: &PgPool, loader_id: Uuid) -> Result<()> {
    sqlx::query(
        "update loader set version_status = 'ARCHIVED', approval_status = 'REJECTED', updated_at = now() \
         where id = $1",
    )
    .bind(loader_id)
    .execute(pool)
    .await
    .context("set_rejected failed")?;
    Ok(())
}

pub async fn set_enabled(pool: &PgPool, loader_code: &str, enabled: bool) -> Result<()> {
    sqlx::query(
        "update loader set enabled = $2, updated_at = now() \
         where loader_code = $1 and version_status = 'ACTIVE'",
    )
    .bind(loader_code)
    .bind(enabled)
    .execute(pool)
    .await
    .context("set_enabled failed")?;
    Ok(())
}

pub async fn set_running(pool: &PgPool, loader_id: Uuid) -> Result<()> {
    sqlx::query("update loader set load_status = 'RUNNING', updated_at = now() where id = $1")
        .bind(loader_id)
        .execute(pool)
        .await
        .context("set_running failed")?;
    Ok(())
}

/// Returns to IDLE without touching the watermark or `failedSince` — the
/// FAIL_ON_DUPLICATE ingest-conflict branch of the executor (4.10): the
/// run did not fail, but it also did not advance.
pub async fn set_idle(pool: &PgPool, loader_id: Uuid) -> Result<()> {
    sqlx::query("update loader set load_status = 'IDLE', updated_at = now() where id = $1")
        .bind(loader_id)
        .execute(pool)
        .await
        .context("set_idle failed")?;
    Ok(())
}

/// Successful (possibly zero-record) completion: advances the watermark,
/// clears `failedSince`, resets the failure-retry counter, and updates the
/// zero-record streak.
pub async fn record_success(
    pool: &PgPool,
    loader_id: Uuid,
    new_watermark: DateTime<Utc>,
    records_loaded: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        update loader set
            load_status = 'IDLE',
            last_load_timestamp = $2,
            failed_since = null,
            failed_retry_count = 0,
            consecutive_zero_record_runs = case when $3 = 0 then consecutive_zero_record_runs + 1 else 0 end,
            updated_at = now()
        where id = $1
        "#,
    )
    .bind(loader_id)
    .bind(new_watermark)
    .bind(records_loaded)
    .execute(pool)
    .await
    .context("record_success failed")?;
    Ok(())
}

/// Removes every non-ACTIVE version row for a `loaderCode`. Direct deletion
/// of the ACTIVE version is forbidden (invariant vi / 4.11) — archival only
/// happens as a side effect of a new version being approved — so the
/// current ACTIVE row, if any, is left untouched no matter what is passed
/// here.
pub async fn delete_by_code(pool: &PgPool, loader_code: &str) -> Result<bool> {
    let result = sqlx::query("delete from loader where loader_code = $1 and version_status != 'ACTIVE'")
        .bind(loader_code)
        .execute(pool)
        .await
        .context("delete_by_code failed")?;
    Ok(result.rows_affected() > 0)
}

/// Marks a run failed and bumps `failedRetryCount` unconditionally — it's
/// the count of consecutive failed attempts, so it grows every time this is
/// called regardless of whether `failedSince` was already set, unlike
/// `failedSince` itself which only latches on the first failure in a streak.
pub async fn record_failure(pool: &PgPool, loader_id: Uuid, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        update loader set
            load_status = 'FAILED',
            failed_since = coalesce(failed_since, $2),
            failed_retry_count = failed_retry_count + 1,
            updated_at = now()
        where id = $1
        "#,
    )
    .bind(loader_id)
    .bind(now)
    .execute(pool)
    .await
    .context("record_failure failed")?;
    Ok(())
}
