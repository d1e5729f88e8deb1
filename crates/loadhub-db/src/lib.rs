//! Storage layer: connection pool lifecycle plus one repository module per
//! entity family. Every row carrying `loaderSql`/`password` crosses the
//! `loadhub-crypto` boundary on the way in and out — no plaintext column
//! reads happen outside `loaders::` / `sources::`.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub mod approvals;
pub mod auth;
pub mod backfill;
pub mod history;
pub mod loaders;
pub mod locks;
pub mod permissions;
pub mod segments;
pub mod signals;
pub mod sources;

pub const ENV_DB_URL: &str = "LOADHUB_DATABASE_URL";

/// Connect to the control-plane Postgres database named by `LOADHUB_DATABASE_URL`.
/// This is the platform's own metadata store, distinct from the heterogeneous
/// source databases the Source Registry pools.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to control-plane Postgres")
}

/// Test helper: connect using `LOADHUB_DATABASE_URL` then apply migrations.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_loader_table: bool,
}

pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1 from information_schema.tables
            where table_schema = 'public' and table_name = 'loader'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_loader_table: exists,
    })
}

/// Detect a Postgres unique-constraint violation by name, used across
/// repository modules to translate races into domain-level `Busy`/`Conflict`
/// results instead of bubbling a raw `sqlx::Error`.
pub(crate) fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}
