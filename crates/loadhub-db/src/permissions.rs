//! `resource_management_state_permission` repository: the data half of the
//! role x state permission matrix (4.12) — fetched whole and cached by
//! `loadhub-permissions`, never branched on here.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};

#[derive(Debug, Clone)]
pub struct StatePermissionRow {
    pub resource_type_code: String,
    pub state_code: String,
    pub role_code: String,
    pub action_code: String,
    pub http_method: String,
    pub href_template: String,
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<StatePermissionRow>> {
    let rows = sqlx::query(
        r#"
        select rt.resource_type_code, p.state_code, p.role_code, p.action_code,
               p.http_method, p.href_template
        from resource_management_state_permission p
        join resource_management_resource_type rt on rt.id = p.resource_type_id
        "#,
    )
    .fetch_all(pool)
    .await
    .context("permissions::list_all failed")?;

    rows.into_iter()
        .map(|row| {
            Ok(StatePermissionRow {
                resource_type_code: row.try_get("resource_type_code")?,
                state_code: row.try_get("state_code")?,
                role_code: row.try_get("role_code")?,
                action_code: row.try_get("action_code")?,
                http_method: row.try_get("http_method")?,
                href_template: row.try_get("href_template")?,
            })
        })
        .collect()
}
