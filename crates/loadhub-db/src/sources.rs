//! `loader_source_database` repository: connection descriptors for the
//! heterogeneous databases the Source Registry pools. Rows with a kind the
//! registry can't parse are still readable here — `SourceKind::parse`
//! isolates the bad descriptor at the registry layer, not this one.

use anyhow::{Context, Result};
use loadhub_schemas::SourceDatabase;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Raw descriptor row: `kind` kept as a string because a malformed value
/// must not prevent the rest of the table from loading (4.1).
pub struct RawSourceDescriptor {
    pub id: Uuid,
    pub db_code: String,
    pub kind_raw: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password_encrypted: Vec<u8>,
}

pub async fn list_all_raw(pool: &PgPool) -> Result<Vec<RawSourceDescriptor>> {
    let rows = sqlx::query(
        "select id, db_code, kind, host, port, database, username, password_encrypted \
         from loader_source_database order by db_code",
    )
    .fetch_all(pool)
    .await
    .context("list_all_raw failed")?;

    rows.into_iter()
        .map(|row| {
            Ok(RawSourceDescriptor {
                id: row.try_get("id")?,
                db_code: row.try_get("db_code")?,
                kind_raw: row.try_get("kind")?,
                host: row.try_get("host")?,
                port: row.try_get::<i32, _>("port")? as u16,
                database: row.try_get("database")?,
                username: row.try_get("username")?,
                password_encrypted: row.try_get("password_encrypted")?,
            })
        })
        .collect()
}

pub async fn fetch_by_code(pool: &PgPool, db_code: &str) -> Result<Option<SourceDatabase>> {
    let row = sqlx::query(
        "select id, db_code, kind, host, port, database, username, password_encrypted, \
         created_at, updated_at from loader_source_database where db_code = $1",
    )
    .bind(db_code)
    .fetch_optional(pool)
    .await
    .context("fetch_by_code failed")?;

    let Some(row) = row else { return Ok(None) };
    let kind_raw: String = row.try_get("kind")?;
    let Some(kind) = loadhub_schemas::SourceKind::parse(&kind_raw) else {
        anyhow::bail!("source {db_code} has malformed kind '{kind_raw}'");
    };

    Ok(Some(SourceDatabase {
        id: row.try_get("id")?,
        db_code: row.try_get("db_code")?,
        kind,
        host: row.try_get("host")?,
        port: row.try_get::<i32, _>("port")? as u16,
        database: row.try_get("database")?,
        username: row.try_get("username")?,
        password_encrypted: row.try_get("password_encrypted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

/// Resolves a `Loader.source_database_id` to the `dbCode` the Source
/// Registry is keyed by.
pub async fn fetch_by_id(pool: &PgPool, id: Uuid) -> Result<Option<SourceDatabase>> {
    let row = sqlx::query(
        "select id, db_code, kind, host, port, database, username, password_encrypted, \
         created_at, updated_at from loader_source_database where id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("fetch_by_id failed")?;

    let Some(row) = row else { return Ok(None) };
    let kind_raw: String = row.try_get("kind")?;
    let db_code: String = row.try_get("db_code")?;
    let Some(kind) = loadhub_schemas::SourceKind::parse(&kind_raw) else {
        anyhow::bail!("source {db_code} has malformed kind '{kind_raw}'");
    };

    Ok(Some(SourceDatabase {
        id: row.try_get("id")?,
        db_code,
        kind,
        host: row.try_get("host")?,
        port: row.try_get::<i32, _>("port")? as u16,
        database: row.try_get("database")?,
        username: row.try_get("username")?,
        password_encrypted: row.try_get("password_encrypted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

pub struct NewSourceDescriptor {
    pub db_code: String,
    pub kind: loadhub_schemas::SourceKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password_encrypted: Vec<u8>,
}

pub async fn insert(pool: &PgPool, desc: &NewSourceDescriptor) -> Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        insert into loader_source_database (db_code, kind, host, port, database, username, password_encrypted)
        values ($1, $2, $3, $4, $5, $6, $7)
        returning id
        "#,
    )
    .bind(&desc.db_code)
    .bind(desc.kind.as_str())
    .bind(&desc.host)
    .bind(desc.port as i32)
    .bind(&desc.database)
    .bind(&desc.username)
    .bind(&desc.password_encrypted)
    .fetch_one(pool)
    .await
    .context("insert source descriptor failed")?;
    Ok(id)
}

pub async fn delete_by_code(pool: &PgPool, db_code: &str) -> Result<bool> {
    let result = sqlx::query("delete from loader_source_database where db_code = $1")
        .bind(db_code)
        .execute(pool)
        .await
        .context("delete_by_code failed")?;
    Ok(result.rows_affected() > 0)
}
