//! `loader_approval_request` repository. `uq_approval_one_pending` is the
//! storage-level enforcement of "at most one non-terminal request per
//! (entityType, entityId)".

use anyhow::{Context, Result};
use loadhub_schemas::{ApprovalRequest, ApprovalStatus, EntityType, RequestType};
use sqlx::{PgPool, Row};
use uuid::Uuid;

fn row_to_request(row: sqlx::postgres::PgRow) -> Result<ApprovalRequest> {
    Ok(ApprovalRequest {
        id: row.try_get("id")?,
        entity_type: EntityType::parse(&row.try_get::<String, _>("entity_type")?)?,
        entity_id: row.try_get("entity_id")?,
        request_type: RequestType::parse(&row.try_get::<String, _>("request_type")?)?,
        approval_status: ApprovalStatus::parse(&row.try_get::<String, _>("approval_status")?)?,
        request_data: row.try_get("request_data")?,
        current_data: row.try_get("current_data")?,
        requested_by: row.try_get("requested_by")?,
        decided_by: row.try_get("decided_by")?,
        decided_at: row.try_get("decided_at")?,
        rejection_reason: row.try_get("rejection_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const SELECT_COLUMNS: &str = r#"
    id, entity_type, entity_id, request_type, approval_status, request_data,
    current_data, requested_by, decided_by, decided_at, rejection_reason,
    created_at, updated_at
"#;

pub struct NewApprovalRequest {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub request_type: RequestType,
    pub request_data: serde_json::Value,
    pub current_data: Option<serde_json::Value>,
    pub requested_by: String,
}

/// Returns `Ok(None)` (Busy) if a non-terminal request already exists for
/// this `(entityType, entityId)` rather than propagating the raw violation.
pub async fn create(pool: &PgPool, req: &NewApprovalRequest) -> Result<Option<ApprovalRequest>> {
    let result = sqlx::query(&format!(
        r#"
        insert into loader_approval_request
            (entity_type, entity_id, request_type, request_data, current_data, requested_by)
        values ($1, $2, $3, $4, $5, $6)
        returning {SELECT_COLUMNS}
        "#
    ))
    .bind(req.entity_type.as_str())
    .bind(req.entity_id)
    .bind(req.request_type.as_str())
    .bind(&req.request_data)
    .bind(&req.current_data)
    .bind(&req.requested_by)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(Some(row_to_request(row)?)),
        Err(sqlx::Error::Database(db_err))
            if db_err.code().as_deref() == Some("23505")
                && db_err.constraint() == Some("uq_approval_one_pending") =>
        {
            Ok(None)
        }
        Err(e) => Err(anyhow::Error::new(e).context("approvals::create failed")),
    }
}

pub async fn fetch_pending_for_entity(
    pool: &PgPool,
    entity_type: EntityType,
    entity_id: Uuid,
) -> Result<Option<ApprovalRequest>> {
    let row = sqlx::query(&format!(
        "select {SELECT_COLUMNS} from loader_approval_request \
         where entity_type = $1 and entity_id = $2 and approval_status = 'PENDING_APPROVAL'"
    ))
    .bind(entity_type.as_str())
    .bind(entity_id)
    .fetch_optional(pool)
    .await
    .context("approvals::fetch_pending_for_entity failed")?;
    row.map(row_to_request).transpose()
}

pub async fn decide(
    pool: &PgPool,
    id: Uuid,
    approval_status: ApprovalStatus,
    decided_by: &str,
    rejection_reason: Option<&str>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        update loader_approval_request set
            approval_status = $2, decided_by = $3, decided_at = now(),
            rejection_reason = $4, updated_at = now()
        where id = $1 and approval_status = 'PENDING_APPROVAL'
        "#,
    )
    .bind(id)
    .bind(approval_status.as_str())
    .bind(decided_by)
    .bind(rejection_reason)
    .execute(pool)
    .await
    .context("approvals::decide failed")?;
    Ok(result.rows_affected() > 0)
}
