use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two source database drivers the Source Registry can pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceKind {
    Mysql,
    Postgresql,
}

impl SourceKind {
    /// Parses the kind stored in the descriptor table, returning `None`
    /// for anything else so the registry can skip a malformed row instead
    /// of aborting the whole reload.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "MYSQL" => Some(SourceKind::Mysql),
            "POSTGRESQL" | "POSTGRES" => Some(SourceKind::Postgresql),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Mysql => "MYSQL",
            SourceKind::Postgresql => "POSTGRESQL",
        }
    }
}

/// Connection descriptor for one source database. `password_encrypted` is
/// opaque ciphertext produced by `loadhub-crypto::Encrypted::seal`; nothing
/// outside that boundary ever sees the plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDatabase {
    pub id: Uuid,
    pub db_code: String,
    pub kind: SourceKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password_encrypted: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
