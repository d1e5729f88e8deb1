use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::versioning::{ApprovalStatus, VersionStatus};

/// Runtime status of a loader's most recent run, distinct from
/// [`VersionStatus`] (which governs the draft/active/archive lifecycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoadStatus {
    Idle,
    Running,
    Failed,
    Paused,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Idle => "IDLE",
            LoadStatus::Running => "RUNNING",
            LoadStatus::Failed => "FAILED",
            LoadStatus::Paused => "PAUSED",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "IDLE" => Ok(LoadStatus::Idle),
            "RUNNING" => Ok(LoadStatus::Running),
            "FAILED" => Ok(LoadStatus::Failed),
            "PAUSED" => Ok(LoadStatus::Paused),
            other => anyhow::bail!("invalid load_status: {other}"),
        }
    }
}

/// Policy for handling rows already present in the ingest window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurgeStrategy {
    FailOnDuplicate,
    PurgeAndReload,
    SkipDuplicates,
}

impl PurgeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurgeStrategy::FailOnDuplicate => "FAIL_ON_DUPLICATE",
            PurgeStrategy::PurgeAndReload => "PURGE_AND_RELOAD",
            PurgeStrategy::SkipDuplicates => "SKIP_DUPLICATES",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "FAIL_ON_DUPLICATE" => Ok(PurgeStrategy::FailOnDuplicate),
            "PURGE_AND_RELOAD" => Ok(PurgeStrategy::PurgeAndReload),
            "SKIP_DUPLICATES" => Ok(PurgeStrategy::SkipDuplicates),
            other => anyhow::bail!("invalid purge_strategy: {other}"),
        }
    }
}

/// One row per configuration version of a loader.
///
/// `loader_code` is the stable business key shared by every version;
/// `id` is the internal primary key of this particular version row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loader {
    pub id: Uuid,
    pub loader_code: String,
    pub loader_sql_encrypted: Vec<u8>,
    pub source_database_id: Uuid,

    pub min_interval_seconds: i64,
    pub max_interval_seconds: i64,
    pub max_query_period_seconds: i64,
    pub max_parallel_executions: i32,
    pub source_timezone_offset_hours: i32,
    pub aggregation_period_seconds: Option<i64>,
    pub purge_strategy: PurgeStrategy,

    pub enabled: bool,
    pub load_status: LoadStatus,
    pub last_load_timestamp: Option<DateTime<Utc>>,
    pub failed_since: Option<DateTime<Utc>>,
    pub consecutive_zero_record_runs: i64,
    pub failed_retry_count: i64,

    pub version_status: VersionStatus,
    pub version_number: i64,
    pub parent_version_id: Option<Uuid>,
    pub approval_status: Option<ApprovalStatus>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loader {
    /// `loaderCode` validity per `spec.md` §3: 1-64 chars, `[A-Z0-9_]`.
    pub fn validate_code(code: &str) -> Result<(), LoaderCodeError> {
        if code.is_empty() || code.len() > 64 {
            return Err(LoaderCodeError::Length(code.len()));
        }
        if !code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
        {
            return Err(LoaderCodeError::Charset);
        }
        Ok(())
    }

    /// Invariant (iii): only ACTIVE versions may be enabled.
    pub fn enable_admissible(&self) -> bool {
        self.version_status == VersionStatus::Active
    }

    /// Invariant (iv): scheduling parameters are strictly positive.
    pub fn scheduling_params_valid(&self) -> bool {
        self.min_interval_seconds > 0
            && self.max_interval_seconds > 0
            && self.max_query_period_seconds > 0
            && self.max_parallel_executions >= 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderCodeError {
    Length(usize),
    Charset,
}

impl std::fmt::Display for LoaderCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoaderCodeError::Length(n) => {
                write!(f, "loaderCode must be 1-64 chars, got {n}")
            }
            LoaderCodeError::Charset => {
                write!(f, "loaderCode must match [A-Z0-9_]")
            }
        }
    }
}

impl std::error::Error for LoaderCodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_codes() {
        assert!(Loader::validate_code("DAILY_SALES_1").is_ok());
    }

    #[test]
    fn rejects_lowercase() {
        assert!(matches!(
            Loader::validate_code("daily_sales"),
            Err(LoaderCodeError::Charset)
        ));
    }

    #[test]
    fn rejects_empty_and_overlong() {
        assert!(matches!(
            Loader::validate_code(""),
            Err(LoaderCodeError::Length(0))
        ));
        let too_long = "A".repeat(65);
        assert!(matches!(
            Loader::validate_code(&too_long),
            Err(LoaderCodeError::Length(65))
        ));
    }
}
