//! `loadhub-scheduler` entry point.
//!
//! Thin composition root: load config, resolve secrets, connect to the
//! control-plane database, build the Source Registry and permission
//! matrix, spawn the reaper and poll loops, then serve. All route handlers
//! live in `routes.rs`; all shared state lives in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use loadhub_config::{scheduler::SchedulerConfig, secrets::resolve_secrets};
use loadhub_scheduler::{poll, routes, state::AppState};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config_paths = config_paths_from_env();
    let config_path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = loadhub_config::load_layered_yaml(&config_path_refs).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "no layered config found, running on scheduler defaults");
        loadhub_config::LoadedConfig {
            scheduler: SchedulerConfig::test_defaults(),
            raw_json: serde_json::json!({}),
            config_hash: String::new(),
        }
    });
    let scheduler_config = loaded.scheduler.clone();
    info!(config_hash = %loaded.config_hash, "configuration loaded");

    let secrets = resolve_secrets(&loaded.raw_json).context("failed to resolve runtime secrets")?;
    let encryption_key = loadhub_crypto::EncryptionKey::from_base64(&secrets.encryption_key_base64)
        .context("LOADHUB_ENCRYPTION_KEY did not decode to a valid key")?;

    let db = loadhub_db::connect(&secrets.database_url).await.context("failed to connect to control-plane database")?;
    loadhub_db::migrate(&db).await.context("failed to run pending migrations")?;

    let registry = Arc::new(loadhub_sources::SourceRegistry::new(db.clone(), encryption_key.clone()));
    let report = registry.reload_all().await.context("initial source registry load failed")?;
    info!(loaded = report.loaded.len(), skipped = report.skipped.len(), "source registry populated");

    let permissions = loadhub_permissions::PermissionMatrix::load(&db).await.context("failed to load permission matrix")?;

    let replica_name = std::env::var("LOADHUB_REPLICA_NAME").unwrap_or_else(|_| format!("replica-{}", uuid::Uuid::new_v4()));

    let shared = Arc::new(AppState {
        db: db.clone(),
        registry: Arc::clone(&registry),
        encryption_key,
        permissions: Arc::new(tokio::sync::RwLock::new(permissions)),
        config: scheduler_config.clone(),
        jwt_secret: secrets.jwt_secret,
        jwt_expiry_seconds: secrets.jwt_expiry_seconds,
        replica_name: replica_name.clone(),
    });

    info!(replica_name = %replica_name, "scheduler replica starting");

    loadhub_reaper::spawn(
        db.clone(),
        loadhub_reaper::ReaperConfig::new(
            Duration::from_secs(scheduler_config.poll_interval_seconds.max(1)),
            chrono::Duration::seconds(scheduler_config.stale_lock_threshold_seconds() as i64),
        ),
    );

    poll::spawn(Arc::clone(&shared));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr(&scheduler_config).unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("loadhub-scheduler listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

fn config_paths_from_env() -> Vec<String> {
    std::env::var("LOADHUB_CONFIG_FILES")
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_else(|_| vec!["config/base.yaml".to_string()])
}

fn bind_addr(config: &SchedulerConfig) -> Option<SocketAddr> {
    std::env::var("LOADHUB_SCHEDULER_ADDR")
        .ok()
        .or_else(|| config.bind_addr.clone())
        .and_then(|s| s.parse().ok())
}

/// CORS: allow only localhost origins, matching the operator consoles the
/// platform ships with.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}
