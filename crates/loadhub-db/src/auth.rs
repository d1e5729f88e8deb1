//! `auth_user`/`auth_role` repository. Credential verification and token
//! issuance themselves are out of scope for this platform (assumed to be
//! fronted by an existing identity provider) — this module only answers
//! "does this username exist, what is its password hash, which roles does
//! it carry", the minimum the login endpoint needs to mint a token.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub enabled: bool,
}

pub async fn fetch_user_by_username(pool: &PgPool, username: &str) -> Result<Option<AuthUser>> {
    let row = sqlx::query(
        "select id, username, password_hash, enabled from auth_user where username = $1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await
    .context("fetch_user_by_username failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(AuthUser {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        enabled: row.try_get("enabled")?,
    }))
}

/// Role codes held by a user, e.g. `["ADMIN", "OPERATOR"]`.
pub async fn roles_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        select r.role_code
        from auth_role r
        join auth_user_role ur on ur.role_id = r.id
        where ur.user_id = $1
        order by r.role_code
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("roles_for_user failed")?;
    Ok(rows.into_iter().map(|(r,)| r).collect())
}
