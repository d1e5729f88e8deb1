//! Shared runtime state for `loadhub-scheduler`.
//!
//! One composition root per replica (`spec.md` §9 "implicit global state"
//! redesign note): `AppState` owns the control-plane pool, the Source
//! Registry, the encryption key, and the in-memory permission matrix.
//! Handlers receive `State<Arc<AppState>>` from Axum; nothing here is a
//! singleton reached for out-of-band.

use std::sync::Arc;

use loadhub_config::scheduler::SchedulerConfig;
use loadhub_crypto::EncryptionKey;
use loadhub_permissions::PermissionMatrix;
use loadhub_sources::SourceRegistry;
use sqlx::PgPool;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub registry: Arc<SourceRegistry>,
    pub encryption_key: EncryptionKey,
    /// Reloaded by `POST /ops/v1/admin/security/reload`; the link set in
    /// any response built after a reload reflects the new matrix.
    pub permissions: Arc<RwLock<PermissionMatrix>>,
    pub config: SchedulerConfig,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: i64,
    /// Identifies this process to the Distributed Lock Manager and
    /// Execution History Store — distinct across replicas.
    pub replica_name: String,
}

impl AppState {
    pub async fn reload_permissions(&self) -> anyhow::Result<()> {
        let fresh = PermissionMatrix::load(&self.db).await?;
        *self.permissions.write().await = fresh;
        Ok(())
    }
}
