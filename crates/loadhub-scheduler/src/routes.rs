//! HTTP route table (`spec.md` §6). Every handler takes `AuthUser` for
//! bearer verification and re-checks `PermissionMatrix::is_allowed` before
//! any state-changing action — the `_links` in a response body are
//! advisory, never the enforcement point (§4.12).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use loadhub_schemas::{LoaderState, PurgeStrategy};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{hash_password, issue_token, AuthUser};
use crate::dto::{
    loader_to_dto, BackfillJobDto, CreateBackfillRequest, LoaderDraftRequest, LoginRequest, LoginResponse,
    SignalsHistoryDto,
};
use crate::error::ApiError;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/actuator/health", get(health))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/res/loaders", get(list_loaders).post(create_loader))
        .route(
            "/api/v1/res/loaders/:code",
            get(get_loader).put(update_loader).delete(delete_loader),
        )
        .route("/api/v1/res/loaders/:code/toggle", put(toggle_loader))
        .route("/api/v1/res/loaders/:code/execute", post(force_start))
        .route("/api/v1/res/loaders/:code/approve", post(approve_loader))
        .route("/api/v1/res/loaders/:code/reject", post(reject_loader))
        .route("/api/v1/res/signals/signal/:code", get(query_signals))
        .route("/api/v1/res/backfill", get(list_backfill).post(create_backfill))
        .route("/api/v1/res/backfill/:id/execute", post(execute_backfill))
        .route("/ops/v1/admin/res/db-sources", get(list_db_sources))
        .route("/ops/v1/admin/security/reload", post(reload_security))
        .route("/api/v1/admin/security/read-only-check", get(read_only_check))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "UP" }))
}

async fn login(State(state): State<Arc<AppState>>, Json(req): Json<LoginRequest>) -> Result<Json<LoginResponse>, ApiError> {
    let user = loadhub_db::auth::fetch_user_by_username(&state.db, &req.username)
        .await?
        .filter(|u| u.enabled)
        .ok_or_else(|| ApiError::new("UNAUTHORIZED", "invalid username or password"))?;

    if user.password_hash != hash_password(&req.password) {
        return Err(ApiError::new("UNAUTHORIZED", "invalid username or password"));
    }

    let roles = loadhub_db::auth::roles_for_user(&state.db, user.id).await?;
    let token = issue_token(&state.jwt_secret, state.jwt_expiry_seconds, &user.username, &roles)?;

    Ok(Json(LoginResponse { token, username: user.username, roles }))
}

async fn lock_held(state: &AppState, loader_code: &str) -> Result<bool, ApiError> {
    Ok(loadhub_db::locks::count_held(&state.db, loader_code).await? > 0)
}

async fn list_loaders(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<crate::dto::LoaderDto>>, ApiError> {
    let codes = loadhub_db::loaders::list_distinct_codes(&state.db).await?;
    let matrix = state.permissions.read().await;
    let now = Utc::now();

    let mut out = Vec::with_capacity(codes.len());
    for code in codes {
        let Some(loader) = loadhub_db::loaders::fetch_active_by_code(&state.db, &code).await? else {
            continue;
        };
        let held = lock_held(&state, &code).await?;
        out.push(loader_to_dto(&loader, held, now, &matrix, &user.roles));
    }
    Ok(Json(out))
}

async fn get_loader(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<crate::dto::LoaderDto>, ApiError> {
    let loader = loadhub_db::loaders::fetch_active_by_code(&state.db, &code)
        .await?
        .ok_or_else(|| ApiError::not_found("LOADER", &code))?;
    let held = lock_held(&state, &code).await?;
    let matrix = state.permissions.read().await;
    Ok(Json(loader_to_dto(&loader, held, Utc::now(), &matrix, &user.roles)))
}

fn require_author(user: &AuthUser) -> Result<(), ApiError> {
    if user.has_role("OPERATOR") || user.has_role("ADMIN") {
        Ok(())
    } else {
        Err(ApiError::permission_denied("EDIT_LOADER"))
    }
}

fn draft_fields(req: &LoaderDraftRequest) -> Result<loadhub_versioning::DraftFields, ApiError> {
    let purge_strategy = PurgeStrategy::parse(&req.purge_strategy).map_err(|e| ApiError::validation(e.to_string()))?;
    Ok(loadhub_versioning::DraftFields {
        loader_sql: req.loader_sql.clone(),
        source_database_id: req.source_database_id,
        min_interval_seconds: req.min_interval_seconds,
        max_interval_seconds: req.max_interval_seconds,
        max_query_period_seconds: req.max_query_period_seconds,
        max_parallel_executions: req.max_parallel_executions,
        source_timezone_offset_hours: req.source_timezone_offset_hours,
        aggregation_period_seconds: req.aggregation_period_seconds,
        purge_strategy,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoaderCreateRequest {
    loader_code: String,
    #[serde(flatten)]
    fields: LoaderDraftRequest,
}

/// Creating a loader has no seeded permission-matrix row (there's no
/// `LoaderState` for a code that doesn't exist yet) — gated on role alone.
/// The DRAFT it produces is submitted for approval immediately; nothing in
/// the matrix names a separate ungated "submit" action either.
async fn create_loader(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<LoaderCreateRequest>,
) -> Result<Json<crate::dto::LoaderDto>, ApiError> {
    require_author(&user)?;

    loadhub_schemas::Loader::validate_code(&req.loader_code).map_err(|e| ApiError::validation(e.to_string()))?;
    let fields = draft_fields(&req.fields)?;

    let outcome = loadhub_versioning::create_draft(&state.db, &state.encryption_key, &req.loader_code, &fields, None).await?;
    let loader = match outcome {
        loadhub_versioning::DraftOutcome::Saved(loader) => loader,
        loadhub_versioning::DraftOutcome::Busy => {
            return Err(ApiError::new("LOADER_ALREADY_EXISTS", "a draft is already being written"))
        }
    };

    loadhub_versioning::submit(&state.db, loader.id, &user.username).await?;
    let loader = loadhub_db::loaders::fetch_by_id(&state.db, loader.id)
        .await?
        .ok_or_else(|| ApiError::not_found("LOADER", &req.loader_code))?;

    let held = lock_held(&state, &loader.loader_code).await?;
    let matrix = state.permissions.read().await;
    Ok(Json(loader_to_dto(&loader, held, Utc::now(), &matrix, &user.roles)))
}

async fn update_loader(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(code): Path<String>,
    Json(req): Json<LoaderDraftRequest>,
) -> Result<Json<crate::dto::LoaderDto>, ApiError> {
    require_author(&user)?;
    let fields = draft_fields(&req)?;

    let outcome = loadhub_versioning::create_draft(&state.db, &state.encryption_key, &code, &fields, None).await?;
    let loader = match outcome {
        loadhub_versioning::DraftOutcome::Saved(loader) => loader,
        loadhub_versioning::DraftOutcome::Busy => {
            return Err(ApiError::new("LOADER_DRAFT_CONFLICT", "a concurrent update is already in flight"))
        }
    };

    loadhub_versioning::submit(&state.db, loader.id, &user.username).await?;
    let loader = loadhub_db::loaders::fetch_by_id(&state.db, loader.id)
        .await?
        .ok_or_else(|| ApiError::not_found("LOADER", &code))?;

    let held = lock_held(&state, &code).await?;
    let matrix = state.permissions.read().await;
    Ok(Json(loader_to_dto(&loader, held, Utc::now(), &matrix, &user.roles)))
}

/// Direct deletion of the ACTIVE version is forbidden (invariant vi /
/// 4.11) — a loader can only be removed by deleting a REJECTED/DRAFT/
/// PENDING_APPROVAL version, never the one currently live. Picks the most
/// recent non-ACTIVE version to derive state/permissions from, the same
/// pattern `approve_loader`/`reject_loader` already use for draft rows.
async fn delete_loader(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let versions = loadhub_db::loaders::list_versions(&state.db, &code).await?;
    if versions.is_empty() {
        return Err(ApiError::not_found("LOADER", &code));
    }
    let target = versions
        .into_iter()
        .find(|v| v.version_status != loadhub_schemas::VersionStatus::Active)
        .ok_or_else(|| ApiError::validation("the ACTIVE version cannot be deleted directly; it must be superseded or archived first"))?;

    let state_now = LoaderState::derive(&target, false, Utc::now());

    let matrix = state.permissions.read().await;
    if !matrix.is_allowed("LOADER", state_now, &user.roles, "DELETE_LOADER") {
        return Err(ApiError::permission_denied("DELETE_LOADER"));
    }
    drop(matrix);

    loadhub_db::loaders::delete_by_code(&state.db, &code).await?;
    Ok(Json(json!({ "deleted": true })))
}

async fn toggle_loader(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<crate::dto::LoaderDto>, ApiError> {
    let loader = loadhub_db::loaders::fetch_active_by_code(&state.db, &code)
        .await?
        .ok_or_else(|| ApiError::not_found("LOADER", &code))?;
    let held = lock_held(&state, &code).await?;
    let now = Utc::now();
    let state_now = LoaderState::derive(&loader, held, now);

    let matrix = state.permissions.read().await;
    if !matrix.is_allowed("LOADER", state_now, &user.roles, "TOGGLE_ENABLED") {
        return Err(ApiError::permission_denied("TOGGLE_ENABLED"));
    }

    if !loader.enabled && !loader.enable_admissible() {
        return Err(ApiError::validation("only an ACTIVE version may be enabled"));
    }

    loadhub_db::loaders::set_enabled(&state.db, &code, !loader.enabled).await?;
    let loader = loadhub_db::loaders::fetch_active_by_code(&state.db, &code)
        .await?
        .ok_or_else(|| ApiError::not_found("LOADER", &code))?;
    Ok(Json(loader_to_dto(&loader, held, now, &matrix, &user.roles)))
}

/// `FORCE_START`: bypasses the interval schedule, still goes through the
/// normal lock/history/executor path — a forced run is never exempt from
/// mutual exclusion (§4.6).
async fn force_start(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let loader = loadhub_db::loaders::fetch_active_by_code(&state.db, &code)
        .await?
        .ok_or_else(|| ApiError::not_found("LOADER", &code))?;
    let held = lock_held(&state, &code).await?;
    let state_now = LoaderState::derive(&loader, held, Utc::now());

    {
        let matrix = state.permissions.read().await;
        if !matrix.is_allowed("LOADER", state_now, &user.roles, "FORCE_START") {
            return Err(ApiError::permission_denied("FORCE_START"));
        }
    }

    tokio::spawn(async move {
        let config = loadhub_executor::ExecutorConfig {
            query_timeout: std::time::Duration::from_secs(state.config.query_timeout_seconds),
            default_lookback_hours: state.config.default_lookback_hours,
        };
        let outcome = loadhub_executor::execute_once(
            &state.db,
            &state.registry,
            &state.encryption_key,
            &loader,
            &state.replica_name,
            &config,
            Utc::now(),
        )
        .await;
        if let Err(err) = outcome {
            tracing::warn!(loader_code = %loader.loader_code, error = %err, "forced run errored");
        }
    });

    Ok(Json(json!({ "accepted": true })))
}

async fn approve_loader(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<crate::dto::LoaderDto>, ApiError> {
    let draft = loadhub_db::loaders::fetch_draft_or_pending_by_code(&state.db, &code)
        .await?
        .ok_or_else(|| ApiError::not_found("LOADER", &code))?;
    let state_now = LoaderState::derive(&draft, false, Utc::now());

    let matrix = state.permissions.read().await;
    if !matrix.is_allowed("LOADER", state_now, &user.roles, "APPROVE_LOADER") {
        return Err(ApiError::permission_denied("APPROVE_LOADER"));
    }

    if !loadhub_versioning::approve(&state.db, draft.id, &user.username).await? {
        return Err(ApiError::not_found("LOADER", &code));
    }

    let loader = loadhub_db::loaders::fetch_active_by_code(&state.db, &code)
        .await?
        .ok_or_else(|| ApiError::not_found("LOADER", &code))?;
    Ok(Json(loader_to_dto(&loader, false, Utc::now(), &matrix, &user.roles)))
}

#[derive(Debug, Deserialize)]
struct RejectRequest {
    reason: String,
}

async fn reject_loader(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(code): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let draft = loadhub_db::loaders::fetch_draft_or_pending_by_code(&state.db, &code)
        .await?
        .ok_or_else(|| ApiError::not_found("LOADER", &code))?;
    let state_now = LoaderState::derive(&draft, false, Utc::now());

    let matrix = state.permissions.read().await;
    if !matrix.is_allowed("LOADER", state_now, &user.roles, "REJECT_LOADER") {
        return Err(ApiError::permission_denied("REJECT_LOADER"));
    }

    if !loadhub_versioning::reject(&state.db, draft.id, &user.username, &req.reason).await? {
        return Err(ApiError::not_found("LOADER", &code));
    }

    Ok(Json(json!({ "rejected": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignalsQuery {
    from_epoch: i64,
    to_epoch: i64,
}

async fn query_signals(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(code): Path<String>,
    Query(q): Query<SignalsQuery>,
) -> Result<Json<Vec<SignalsHistoryDto>>, ApiError> {
    let loader = loadhub_db::loaders::fetch_active_by_code(&state.db, &code)
        .await?
        .ok_or_else(|| ApiError::not_found("LOADER", &code))?;
    let held = lock_held(&state, &code).await?;
    let state_now = LoaderState::derive(&loader, held, Utc::now());

    let matrix = state.permissions.read().await;
    if !matrix.is_allowed("LOADER", state_now, &user.roles, "VIEW_SIGNALS") {
        return Err(ApiError::permission_denied("VIEW_SIGNALS"));
    }

    let rows = loadhub_db::signals::query_window(&state.db, &code, q.from_epoch, q.to_epoch).await?;
    Ok(Json(rows.iter().map(SignalsHistoryDto::from).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListBackfillQuery {
    loader_code: String,
}

async fn list_backfill(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(q): Query<ListBackfillQuery>,
) -> Result<Json<Vec<BackfillJobDto>>, ApiError> {
    let jobs = loadhub_db::backfill::list_for_loader(&state.db, &q.loader_code).await?;
    Ok(Json(jobs.iter().map(BackfillJobDto::from).collect()))
}

async fn create_backfill(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateBackfillRequest>,
) -> Result<Json<BackfillJobDto>, ApiError> {
    require_author(&user)?;
    if req.from_time_epoch >= req.to_time_epoch {
        return Err(ApiError::validation("fromTimeEpoch must precede toTimeEpoch"));
    }
    let purge_strategy = PurgeStrategy::parse(&req.purge_strategy).map_err(|e| ApiError::validation(e.to_string()))?;

    loadhub_db::loaders::fetch_active_by_code(&state.db, &req.loader_code)
        .await?
        .ok_or_else(|| ApiError::not_found("LOADER", &req.loader_code))?;

    let job = loadhub_db::backfill::create(
        &state.db,
        &loadhub_db::backfill::NewBackfillJob {
            loader_code: req.loader_code,
            from_time_epoch: req.from_time_epoch,
            to_time_epoch: req.to_time_epoch,
            purge_strategy,
            requested_by: user.username,
        },
    )
    .await?;

    Ok(Json(BackfillJobDto::from(&job)))
}

/// Runs a backfill job over its fixed `[fromTimeEpoch, toTimeEpoch)` window
/// (distinct from the scheduler's normal rolling-watermark window) — the
/// same query/transform/ingest pipeline the executor uses, keyed by the
/// job's own `purgeStrategy` instead of the loader's.
async fn execute_backfill(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_author(&user)?;
    let job = loadhub_db::backfill::fetch_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("BACKFILL_JOB", &id.to_string()))?;

    let loader = loadhub_db::loaders::fetch_active_by_code(&state.db, &job.loader_code)
        .await?
        .ok_or_else(|| ApiError::not_found("LOADER", &job.loader_code))?;

    tokio::spawn(async move {
        if let Err(err) = run_backfill_job(&state, job, loader).await {
            tracing::warn!(error = %err, "backfill job failed");
        }
    });

    Ok(Json(json!({ "accepted": true })))
}

async fn run_backfill_job(
    state: &AppState,
    job: loadhub_schemas::BackfillJob,
    loader: loadhub_schemas::Loader,
) -> anyhow::Result<()> {
    let now = Utc::now();

    // Shares the loaderCode lock with the scheduler's normal runs so a
    // backfill can never race a scheduled load over the same destination
    // rows (§4.6's mutual exclusion applies to any writer, not only the
    // poll loop).
    let replica_name = format!("{}-backfill", state.replica_name);
    let handle = match loadhub_coord::locks::try_acquire(&state.db, &loader.loader_code, &replica_name).await? {
        loadhub_coord::AcquireOutcome::Acquired(handle) => handle,
        loadhub_coord::AcquireOutcome::Busy => {
            anyhow::bail!("loader '{}' is currently locked by another run", loader.loader_code);
        }
    };

    if !loadhub_db::backfill::mark_running(&state.db, job.id, now).await? {
        loadhub_coord::locks::release(&state.db, &handle).await?;
        return Ok(());
    }

    let from_time = chrono::DateTime::from_timestamp(job.from_time_epoch, 0).unwrap_or(now);
    let to_time = chrono::DateTime::from_timestamp(job.to_time_epoch, 0).unwrap_or(now);

    let result: anyhow::Result<(i64, i64)> = async {
        let source = loadhub_db::sources::fetch_by_id(&state.db, loader.source_database_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("loader references a missing source database"))?;
        let source_pool = state.registry.get_pool(&source.db_code).await?;
        let sql = loadhub_crypto::Encrypted::<String>::from_bytes(loader.loader_sql_encrypted.clone())
            .open(&state.encryption_key)?;

        let rows = loadhub_query::run(
            &source_pool,
            &sql,
            from_time,
            to_time,
            loader.source_timezone_offset_hours,
            std::time::Duration::from_secs(state.config.query_timeout_seconds),
        )
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

        let transformed =
            loadhub_transform::transform(&state.db, &loader.loader_code, rows, loader.source_timezone_offset_hours).await?;
        let records_loaded: i64 = transformed.candidates.iter().map(|c| c.rec_count).sum();

        let history_id = Uuid::new_v4();
        let outcome = loadhub_ingest::apply(
            &state.db,
            &loader.loader_code,
            history_id,
            job.purge_strategy,
            (job.from_time_epoch, job.to_time_epoch),
            &transformed.candidates,
        )
        .await?;

        match outcome {
            loadhub_ingest::IngestOutcome::Applied(counts) => Ok((records_loaded, counts.inserted)),
            loadhub_ingest::IngestOutcome::DuplicateConflict => anyhow::bail!("duplicate rows found in backfill window"),
        }
    }
    .await;

    match result {
        Ok((records_loaded, records_ingested)) => {
            loadhub_db::backfill::finalize(
                &state.db,
                job.id,
                loadhub_schemas::BackfillStatus::Success,
                Utc::now(),
                records_loaded,
                records_ingested,
                None,
            )
            .await?;
        }
        Err(err) => {
            let message = err.to_string();
            loadhub_db::backfill::finalize(
                &state.db,
                job.id,
                loadhub_schemas::BackfillStatus::Failed,
                Utc::now(),
                0,
                0,
                Some(message.as_str()),
            )
            .await?;
        }
    }

    loadhub_coord::locks::release(&state.db, &handle).await?;
    Ok(())
}

async fn list_db_sources(State(state): State<Arc<AppState>>, user: AuthUser) -> Result<Json<serde_json::Value>, ApiError> {
    if !user.has_role("ADMIN") {
        return Err(ApiError::permission_denied("VIEW_DB_SOURCES"));
    }
    let descriptors = loadhub_db::sources::list_all_raw(&state.db).await?;
    let loaded = state.registry.loaded_codes().await;
    let out: Vec<_> = descriptors
        .into_iter()
        .map(|d| {
            json!({
                "dbCode": d.db_code,
                "kind": d.kind_raw,
                "host": d.host,
                "port": d.port,
                "database": d.database,
                "pooled": loaded.contains(&d.db_code),
            })
        })
        .collect();
    Ok(Json(json!(out)))
}

async fn reload_security(State(state): State<Arc<AppState>>, user: AuthUser) -> Result<Json<serde_json::Value>, ApiError> {
    if !user.has_role("ADMIN") {
        return Err(ApiError::permission_denied("RELOAD_SECURITY"));
    }
    let report = state.registry.reload_all().await?;
    state.reload_permissions().await?;
    Ok(Json(json!({ "loaded": report.loaded, "skipped": report.skipped })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadOnlyCheckQuery {
    db_code: String,
}

async fn read_only_check(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(q): Query<ReadOnlyCheckQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !user.has_role("ADMIN") {
        return Err(ApiError::permission_denied("VIEW_DB_SOURCES"));
    }
    let pool = state
        .registry
        .get_pool(&q.db_code)
        .await
        .map_err(|e| ApiError::not_found("SOURCE_DATABASE", &e.to_string()))?;
    let read_only = loadhub_query::runner::verify_read_only(&pool).await.is_ok();
    Ok(Json(json!({ "dbCode": q.db_code, "readOnly": read_only })))
}
