use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::loader::PurgeStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoadHistoryStatus {
    Running,
    Success,
    Failed,
    Partial,
}

impl LoadHistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadHistoryStatus::Running => "RUNNING",
            LoadHistoryStatus::Success => "SUCCESS",
            LoadHistoryStatus::Failed => "FAILED",
            LoadHistoryStatus::Partial => "PARTIAL",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "RUNNING" => Ok(LoadHistoryStatus::Running),
            "SUCCESS" => Ok(LoadHistoryStatus::Success),
            "FAILED" => Ok(LoadHistoryStatus::Failed),
            "PARTIAL" => Ok(LoadHistoryStatus::Partial),
            other => anyhow::bail!("invalid load_history status: {other}"),
        }
    }
}

/// One row per run. Append-only except for the single RUNNING -> terminal
/// transition performed by `loadhub-coord::history::finalize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadHistory {
    pub id: Uuid,
    pub loader_code: String,
    pub loader_version: i64,
    pub status: LoadHistoryStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub query_from_time: Option<DateTime<Utc>>,
    pub query_to_time: Option<DateTime<Utc>>,
    pub actual_from_time: Option<DateTime<Utc>>,
    pub actual_to_time: Option<DateTime<Utc>>,
    pub records_loaded: i64,
    pub records_ingested: i64,
    pub error_message: Option<String>,
    pub replica_name: String,
}

/// One row per lock acquisition. At most one row per `loader_code` may have
/// `released = false` at any consistent snapshot (property 3, `spec.md` §8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderExecutionLock {
    pub lock_id: Uuid,
    pub loader_code: String,
    pub replica_name: String,
    pub acquired_at: DateTime<Utc>,
    pub released: bool,
    pub released_at: Option<DateTime<Utc>>,
    pub load_history_id: Option<Uuid>,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BackfillStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl BackfillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackfillStatus::Pending => "PENDING",
            BackfillStatus::Running => "RUNNING",
            BackfillStatus::Success => "SUCCESS",
            BackfillStatus::Failed => "FAILED",
            BackfillStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "PENDING" => Ok(BackfillStatus::Pending),
            "RUNNING" => Ok(BackfillStatus::Running),
            "SUCCESS" => Ok(BackfillStatus::Success),
            "FAILED" => Ok(BackfillStatus::Failed),
            "CANCELLED" => Ok(BackfillStatus::Cancelled),
            other => anyhow::bail!("invalid backfill status: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillJob {
    pub id: Uuid,
    pub loader_code: String,
    pub from_time_epoch: i64,
    pub to_time_epoch: i64,
    pub purge_strategy: PurgeStrategy,
    pub status: BackfillStatus,
    pub requested_by: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub records_loaded: i64,
    pub records_ingested: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BackfillJob {
    pub fn window_valid(&self) -> bool {
        self.from_time_epoch < self.to_time_epoch
    }
}
