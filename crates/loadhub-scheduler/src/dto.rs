//! HTTP wire shapes. Every `Loader` response carries a derived `state` and
//! an explicit `_links` map built by `loadhub-permissions`, replacing
//! reflection-based HATEOAS serialization (`spec.md` §9 redesign note).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use loadhub_permissions::{ActionLink, PermissionMatrix};
use loadhub_schemas::{BackfillJob, Loader, LoaderState, SignalsHistory};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderDto {
    pub loader_code: String,
    pub source_database_id: Uuid,
    pub min_interval_seconds: i64,
    pub max_interval_seconds: i64,
    pub max_query_period_seconds: i64,
    pub max_parallel_executions: i32,
    pub source_timezone_offset_hours: i32,
    pub aggregation_period_seconds: Option<i64>,
    pub purge_strategy: String,
    pub enabled: bool,
    pub load_status: String,
    pub last_load_timestamp: Option<DateTime<Utc>>,
    pub failed_since: Option<DateTime<Utc>>,
    pub consecutive_zero_record_runs: i64,
    pub failed_retry_count: i64,
    pub version_status: String,
    pub version_number: i64,
    pub approval_status: Option<String>,
    pub state: String,
    #[serde(rename = "_links")]
    pub links: HashMap<String, ActionLink>,
}

/// Builds the wire shape for one `Loader` row: state derivation plus the
/// `_links` set (§4.12), using the union of every role `roles` carries.
pub fn loader_to_dto(
    loader: &Loader,
    lock_held: bool,
    now: DateTime<Utc>,
    matrix: &PermissionMatrix,
    roles: &[String],
) -> LoaderDto {
    let state = LoaderState::derive(loader, lock_held, now);
    let links = matrix.links_for_loader(&loader.loader_code, state, roles);
    LoaderDto {
        loader_code: loader.loader_code.clone(),
        source_database_id: loader.source_database_id,
        min_interval_seconds: loader.min_interval_seconds,
        max_interval_seconds: loader.max_interval_seconds,
        max_query_period_seconds: loader.max_query_period_seconds,
        max_parallel_executions: loader.max_parallel_executions,
        source_timezone_offset_hours: loader.source_timezone_offset_hours,
        aggregation_period_seconds: loader.aggregation_period_seconds,
        purge_strategy: loader.purge_strategy.as_str().to_string(),
        enabled: loader.enabled,
        load_status: loader.load_status.as_str().to_string(),
        last_load_timestamp: loader.last_load_timestamp,
        failed_since: loader.failed_since,
        consecutive_zero_record_runs: loader.consecutive_zero_record_runs,
        failed_retry_count: loader.failed_retry_count,
        version_status: loader.version_status.as_str().to_string(),
        version_number: loader.version_number,
        approval_status: loader.approval_status.map(|s| s.as_str().to_string()),
        state: state.as_str().to_string(),
        links,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderDraftRequest {
    pub loader_sql: String,
    pub source_database_id: Uuid,
    pub min_interval_seconds: i64,
    pub max_interval_seconds: i64,
    pub max_query_period_seconds: i64,
    pub max_parallel_executions: i32,
    pub source_timezone_offset_hours: i32,
    pub aggregation_period_seconds: Option<i64>,
    pub purge_strategy: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalsHistoryDto {
    pub loader_code: String,
    pub load_timestamp: i64,
    pub segment_code: i64,
    pub rec_count: i64,
    pub min_val: f64,
    pub max_val: f64,
    pub avg_val: f64,
    pub sum_val: f64,
}

impl From<&SignalsHistory> for SignalsHistoryDto {
    fn from(row: &SignalsHistory) -> Self {
        Self {
            loader_code: row.loader_code.clone(),
            load_timestamp: row.load_timestamp,
            segment_code: row.segment_code,
            rec_count: row.rec_count,
            min_val: row.min_val,
            max_val: row.max_val,
            avg_val: row.avg_val,
            sum_val: row.sum_val,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackfillRequest {
    pub loader_code: String,
    pub from_time_epoch: i64,
    pub to_time_epoch: i64,
    pub purge_strategy: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillJobDto {
    pub id: Uuid,
    pub loader_code: String,
    pub from_time_epoch: i64,
    pub to_time_epoch: i64,
    pub purge_strategy: String,
    pub status: String,
    pub requested_by: String,
    pub records_loaded: i64,
    pub records_ingested: i64,
    pub error_message: Option<String>,
}

impl From<&BackfillJob> for BackfillJobDto {
    fn from(job: &BackfillJob) -> Self {
        Self {
            id: job.id,
            loader_code: job.loader_code.clone(),
            from_time_epoch: job.from_time_epoch,
            to_time_epoch: job.to_time_epoch,
            purge_strategy: job.purge_strategy.as_str().to_string(),
            status: job.status.as_str().to_string(),
            requested_by: job.requested_by.clone(),
            records_loaded: job.records_loaded,
            records_ingested: job.records_ingested,
            error_message: job.error_message.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub roles: Vec<String>,
}
