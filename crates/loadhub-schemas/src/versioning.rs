use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a `Loader` configuration version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    Active,
    Draft,
    PendingApproval,
    Archived,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Active => "ACTIVE",
            VersionStatus::Draft => "DRAFT",
            VersionStatus::PendingApproval => "PENDING_APPROVAL",
            VersionStatus::Archived => "ARCHIVED",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "ACTIVE" => Ok(VersionStatus::Active),
            "DRAFT" => Ok(VersionStatus::Draft),
            "PENDING_APPROVAL" => Ok(VersionStatus::PendingApproval),
            "ARCHIVED" => Ok(VersionStatus::Archived),
            other => anyhow::bail!("invalid version_status: {other}"),
        }
    }
}

/// Approval disposition of a draft or of a generic `ApprovalRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    PendingApproval,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::PendingApproval => "PENDING_APPROVAL",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "PENDING_APPROVAL" => Ok(ApprovalStatus::PendingApproval),
            "APPROVED" => Ok(ApprovalStatus::Approved),
            "REJECTED" => Ok(ApprovalStatus::Rejected),
            other => anyhow::bail!("invalid approval_status: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Loader,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Loader => "LOADER",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "LOADER" => Ok(EntityType::Loader),
            other => anyhow::bail!("invalid entity_type: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Create => "CREATE",
            RequestType::Update => "UPDATE",
            RequestType::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "CREATE" => Ok(RequestType::Create),
            "UPDATE" => Ok(RequestType::Update),
            "DELETE" => Ok(RequestType::Delete),
            other => anyhow::bail!("invalid request_type: {other}"),
        }
    }
}

/// Generic approval workflow row. At most one non-terminal
/// (`PENDING_APPROVAL`) request may exist per `(entity_type, entity_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub request_type: RequestType,
    pub approval_status: ApprovalStatus,
    pub request_data: serde_json::Value,
    pub current_data: Option<serde_json::Value>,
    pub requested_by: String,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
