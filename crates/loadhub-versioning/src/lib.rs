//! Versioned Config Manager (§4.11): createDraft/approve/reject/rollback
//! over `Loader` rows, generalizing the teacher's result-type-over-exceptions
//! redesign (`Ok(...) | Conflict(...)` rather than throwing) to version
//! transitions.

use anyhow::{Context, Result};
use loadhub_crypto::{Encrypted, EncryptionKey};
use loadhub_schemas::{ApprovalStatus, EntityType, Loader, PurgeStrategy, RequestType};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug)]
pub enum DraftOutcome {
    Saved(Loader),
    /// Lost the race to create a brand-new draft against a concurrent
    /// caller; the normal path is to retry as an update against the
    /// now-existing row.
    Busy,
}

pub struct DraftFields {
    pub loader_sql: String,
    pub source_database_id: Uuid,
    pub min_interval_seconds: i64,
    pub max_interval_seconds: i64,
    pub max_query_period_seconds: i64,
    pub max_parallel_executions: i32,
    pub source_timezone_offset_hours: i32,
    pub aggregation_period_seconds: Option<i64>,
    pub purge_strategy: PurgeStrategy,
}

fn seal_sql(key: &EncryptionKey, sql: &str) -> Result<Vec<u8>> {
    Ok(Encrypted::seal(key, &sql.to_string())?.as_bytes().to_vec())
}

/// `createDraft(code, baseVersion?)`. If a DRAFT/PENDING_APPROVAL already
/// exists it is overwritten in place (its id is reused); otherwise a new
/// DRAFT is inserted at `version_number = 1` for a brand-new `loaderCode`
/// or left to the caller-supplied `base_version` fields when cloning from
/// an archived one.
pub async fn create_draft(
    pool: &PgPool,
    key: &EncryptionKey,
    loader_code: &str,
    fields: &DraftFields,
    parent_version_id: Option<Uuid>,
) -> Result<DraftOutcome> {
    let loader_sql_encrypted = seal_sql(key, &fields.loader_sql)?;

    if let Some(existing) = loadhub_db::loaders::fetch_draft_or_pending_by_code(pool, loader_code).await? {
        let draft = loadhub_db::loaders::NewLoaderDraft {
            loader_code: loader_code.to_string(),
            loader_sql_encrypted,
            source_database_id: fields.source_database_id,
            min_interval_seconds: fields.min_interval_seconds,
            max_interval_seconds: fields.max_interval_seconds,
            max_query_period_seconds: fields.max_query_period_seconds,
            max_parallel_executions: fields.max_parallel_executions,
            source_timezone_offset_hours: fields.source_timezone_offset_hours,
            aggregation_period_seconds: fields.aggregation_period_seconds,
            purge_strategy: fields.purge_strategy,
            parent_version_id,
            version_number: existing.version_number,
        };
        let updated = loadhub_db::loaders::update_draft(pool, existing.id, &draft).await?;
        return Ok(DraftOutcome::Saved(updated));
    }

    let version_number = loadhub_db::loaders::max_version_number(pool, loader_code).await? + 1;
    let draft = loadhub_db::loaders::NewLoaderDraft {
        loader_code: loader_code.to_string(),
        loader_sql_encrypted,
        source_database_id: fields.source_database_id,
        min_interval_seconds: fields.min_interval_seconds,
        max_interval_seconds: fields.max_interval_seconds,
        max_query_period_seconds: fields.max_query_period_seconds,
        max_parallel_executions: fields.max_parallel_executions,
        source_timezone_offset_hours: fields.source_timezone_offset_hours,
        aggregation_period_seconds: fields.aggregation_period_seconds,
        purge_strategy: fields.purge_strategy,
        parent_version_id,
        version_number,
    };

    match loadhub_db::loaders::insert_draft(pool, &draft).await? {
        Some(loader) => Ok(DraftOutcome::Saved(loader)),
        None => Ok(DraftOutcome::Busy),
    }
}

/// Submits a DRAFT for approval, opening an `ApprovalRequest` row. Returns
/// `false` if the loader was not actually in DRAFT (already submitted, or
/// never existed as one).
pub async fn submit(pool: &PgPool, loader_id: Uuid, requested_by: &str) -> Result<bool> {
    if !loadhub_db::loaders::submit_for_approval(pool, loader_id).await? {
        return Ok(false);
    }
    loadhub_db::approvals::create(
        pool,
        &loadhub_db::approvals::NewApprovalRequest {
            entity_type: EntityType::Loader,
            entity_id: loader_id,
            request_type: RequestType::Update,
            request_data: serde_json::json!({ "loaderId": loader_id }),
            current_data: None,
            requested_by: requested_by.to_string(),
        },
    )
    .await?;
    Ok(true)
}

/// `approve(draftId, admin)`: archive the current ACTIVE, promote the
/// draft to ACTIVE at `version_number = previousMax + 1`, decide the
/// matching `ApprovalRequest`.
pub async fn approve(pool: &PgPool, draft_id: Uuid, admin: &str) -> Result<bool> {
    let Some(draft) = loadhub_db::loaders::fetch_by_id(pool, draft_id).await? else {
        return Ok(false);
    };

    let next_version = loadhub_db::loaders::max_version_number(pool, &draft.loader_code).await? + 1;
    loadhub_db::loaders::activate_version(pool, draft_id, &draft.loader_code, next_version)
        .await
        .context("approve: activate_version failed")?;

    if let Some(request) = loadhub_db::approvals::fetch_pending_for_entity(pool, EntityType::Loader, draft_id).await? {
        loadhub_db::approvals::decide(pool, request.id, ApprovalStatus::Approved, admin, None).await?;
    }

    Ok(true)
}

/// `reject(draftId, admin, reason)`: draft -> ARCHIVED/REJECTED; the draft
/// row is never mutated again, resubmission always means a new draft.
pub async fn reject(pool: &PgPool, draft_id: Uuid, admin: &str, reason: &str) -> Result<bool> {
    let exists = loadhub_db::loaders::fetch_by_id(pool, draft_id).await?.is_some();
    if !exists {
        return Ok(false);
    }

    loadhub_db::loaders::set_rejected(pool, draft_id).await?;

    if let Some(request) = loadhub_db::approvals::fetch_pending_for_entity(pool, EntityType::Loader, draft_id).await? {
        loadhub_db::approvals::decide(pool, request.id, ApprovalStatus::Rejected, admin, Some(reason)).await?;
    }

    Ok(true)
}

/// `rollback(code, targetVersion, admin)`: clone an archived version's
/// fields into a fresh draft, then follow the normal approval path.
pub async fn rollback(
    pool: &PgPool,
    key: &EncryptionKey,
    loader_code: &str,
    target_version: i64,
) -> Result<DraftOutcome> {
    let Some(target) = loadhub_db::loaders::fetch_by_code_and_version(pool, loader_code, target_version).await?
    else {
        anyhow::bail!("rollback: no version {target_version} found for {loader_code}");
    };

    let loader_sql = Encrypted::<String>::from_bytes(target.loader_sql_encrypted.clone()).open(key)?;
    let fields = DraftFields {
        loader_sql,
        source_database_id: target.source_database_id,
        min_interval_seconds: target.min_interval_seconds,
        max_interval_seconds: target.max_interval_seconds,
        max_query_period_seconds: target.max_query_period_seconds,
        max_parallel_executions: target.max_parallel_executions,
        source_timezone_offset_hours: target.source_timezone_offset_hours,
        aggregation_period_seconds: target.aggregation_period_seconds,
        purge_strategy: target.purge_strategy,
    };

    create_draft(pool, key, loader_code, &fields, Some(target.id)).await
}
