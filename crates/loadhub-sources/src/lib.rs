//! Source Registry (`spec.md` §4.1): `dbCode -> pool<connection>` keyed by
//! `SourceKind`. Connection pools are owned exclusively here; worker code in
//! `loadhub-executor` only ever borrows one scoped to a single run.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use loadhub_crypto::EncryptionKey;
use loadhub_schemas::SourceKind;
use sqlx::{mysql::MySqlPoolOptions, postgres::PgPoolOptions, MySqlPool, PgPool};
use tokio::sync::RwLock;

/// A pooled connection to one source database, of whichever driver its
/// `SourceKind` names.
#[derive(Clone)]
pub enum SourcePool {
    Mysql(MySqlPool),
    Postgresql(PgPool),
}

impl SourcePool {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourcePool::Mysql(_) => SourceKind::Mysql,
            SourcePool::Postgresql(_) => SourceKind::Postgresql,
        }
    }

    async fn close(&self) {
        match self {
            SourcePool::Mysql(p) => p.close().await,
            SourcePool::Postgresql(p) => p.close().await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    MissingSource(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::MissingSource(code) => write!(f, "no pool for dbCode '{code}'"),
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Debug, Clone, Default)]
pub struct ReloadReport {
    pub loaded: Vec<String>,
    /// `(db_code_or_raw_kind, reason)` for descriptors the reload could not
    /// turn into a pool — a single bad row must not abort the rest (4.1).
    pub skipped: Vec<(String, String)>,
}

fn connection_url(
    kind: SourceKind,
    host: &str,
    port: u16,
    database: &str,
    username: &str,
    password: &str,
) -> String {
    match kind {
        SourceKind::Mysql => format!("mysql://{username}:{password}@{host}:{port}/{database}"),
        SourceKind::Postgresql => {
            format!("postgres://{username}:{password}@{host}:{port}/{database}")
        }
    }
}

async fn build_pool(
    kind: SourceKind,
    host: &str,
    port: u16,
    database: &str,
    username: &str,
    password: &str,
) -> Result<SourcePool> {
    let url = connection_url(kind, host, port, database, username, password);
    match kind {
        SourceKind::Mysql => {
            let pool = MySqlPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
                .context("failed to connect to MySQL source")?;
            Ok(SourcePool::Mysql(pool))
        }
        SourceKind::Postgresql => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
                .context("failed to connect to Postgres source")?;
            Ok(SourcePool::Postgresql(pool))
        }
    }
}

/// Owns every live source pool, keyed by `dbCode`. `control_pool` is the
/// platform's own metadata store (where `loader_source_database` lives),
/// never itself returned by `get_pool`.
pub struct SourceRegistry {
    control_pool: PgPool,
    encryption_key: EncryptionKey,
    pools: RwLock<HashMap<String, Arc<SourcePool>>>,
}

impl SourceRegistry {
    pub fn new(control_pool: PgPool, encryption_key: EncryptionKey) -> Self {
        Self {
            control_pool,
            encryption_key,
            pools: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_pool(&self, db_code: &str) -> Result<Arc<SourcePool>, RegistryError> {
        self.pools
            .read()
            .await
            .get(db_code)
            .cloned()
            .ok_or_else(|| RegistryError::MissingSource(db_code.to_string()))
    }

    /// Rebuild every pool from the descriptor table. A new pool is created
    /// before the corresponding old one is closed, so in-flight borrows
    /// against the old pool run to completion while new borrows see the new
    /// pool as soon as the swap lands (4.1 draining policy).
    pub async fn reload_all(&self) -> Result<ReloadReport> {
        let descriptors = loadhub_db::sources::list_all_raw(&self.control_pool)
            .await
            .context("reload_all: failed to list source descriptors")?;

        let mut report = ReloadReport::default();
        let mut fresh = HashMap::new();

        for d in descriptors {
            let Some(kind) = SourceKind::parse(&d.kind_raw) else {
                tracing::warn!(db_code = %d.db_code, kind_raw = %d.kind_raw, "skipping source with malformed kind");
                report
                    .skipped
                    .push((d.db_code.clone(), format!("malformed kind '{}'", d.kind_raw)));
                continue;
            };

            let password = match loadhub_crypto::Encrypted::<String>::from_bytes(d.password_encrypted)
                .open(&self.encryption_key)
            {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(db_code = %d.db_code, error = %e, "skipping source with undecryptable password");
                    report.skipped.push((d.db_code.clone(), format!("decrypt failed: {e}")));
                    continue;
                }
            };

            match build_pool(kind, &d.host, d.port, &d.database, &d.username, &password).await {
                Ok(pool) => {
                    fresh.insert(d.db_code.clone(), Arc::new(pool));
                    report.loaded.push(d.db_code);
                }
                Err(e) => {
                    tracing::warn!(db_code = %d.db_code, error = %e, "skipping source: pool construction failed");
                    report.skipped.push((d.db_code, e.to_string()));
                }
            }
        }

        let old = {
            let mut guard = self.pools.write().await;
            std::mem::replace(&mut *guard, fresh)
        };

        for (code, pool) in old {
            tracing::info!(db_code = %code, "draining superseded source pool");
            tokio::spawn(async move { pool.close().await });
        }

        Ok(report)
    }

    /// Mark `db_code`'s pool draining: new borrows immediately see
    /// `MissingSource`, while the pool itself closes once idle.
    pub async fn close(&self, db_code: &str) -> Result<(), RegistryError> {
        let removed = self.pools.write().await.remove(db_code);
        match removed {
            Some(pool) => {
                tokio::spawn(async move { pool.close().await });
                Ok(())
            }
            None => Err(RegistryError::MissingSource(db_code.to_string())),
        }
    }

    pub async fn loaded_codes(&self) -> Vec<String> {
        self.pools.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_url_selects_scheme_by_kind() {
        let mysql = connection_url(SourceKind::Mysql, "h", 3306, "db", "u", "p");
        assert!(mysql.starts_with("mysql://"));
        let pg = connection_url(SourceKind::Postgresql, "h", 5432, "db", "u", "p");
        assert!(pg.starts_with("postgres://"));
    }
}
