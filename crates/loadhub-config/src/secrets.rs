//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only env var **NAMES** (e.g. `"LOADHUB_JWT_SECRET"`),
//!   never values.
//! - Callers invoke [`resolve_secrets`] once, at the composition root, and
//!   pass the returned [`ResolvedSecrets`] into constructors; no scattered
//!   `std::env::var` calls elsewhere in the platform.
//! - `Debug` redacts every secret value.
//! - Error messages name the missing env var, never its value.

use anyhow::{bail, Result};
use serde_json::Value;

/// All runtime-resolved secrets for one scheduler replica.
#[derive(Clone)]
pub struct ResolvedSecrets {
    pub encryption_key_base64: String,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: i64,
    pub database_url: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("encryption_key_base64", &"<REDACTED>")
            .field("jwt_secret", &"<REDACTED>")
            .field("jwt_expiry_seconds", &self.jwt_expiry_seconds)
            .field("database_url", &"<REDACTED>")
            .finish()
    }
}

struct SecretEnvNames {
    encryption_key_var: String,
    jwt_secret_var: String,
    database_url_var: String,
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        encryption_key_var: read_str_at(config_json, "/secrets/encryption_key_env")
            .unwrap_or_else(|| loadhub_crypto::ENV_ENCRYPTION_KEY.to_string()),
        jwt_secret_var: read_str_at(config_json, "/secrets/jwt_secret_env")
            .unwrap_or_else(|| "LOADHUB_JWT_SECRET".to_string()),
        database_url_var: read_str_at(config_json, "/secrets/database_url_env")
            .unwrap_or_else(|| "LOADHUB_DATABASE_URL".to_string()),
    }
}

fn jwt_expiry_seconds(config_json: &Value) -> i64 {
    config_json
        .pointer("/secrets/jwt_expiry_seconds")
        .and_then(Value::as_i64)
        .unwrap_or(3600)
}

/// Resolve all required secrets from the environment. Every field is
/// required (unlike the teacher's mode-gated secrets); a missing var fails
/// fast with the variable's NAME, never its would-be value.
pub fn resolve_secrets(config_json: &Value) -> Result<ResolvedSecrets> {
    let names = parse_env_names(config_json);

    let encryption_key_base64 = resolve_env(&names.encryption_key_var).ok_or_else(|| {
        anyhow::anyhow!(
            "SECRETS_MISSING: required env var '{}' (encryption key) is not set or empty",
            names.encryption_key_var
        )
    })?;

    let jwt_secret = resolve_env(&names.jwt_secret_var).ok_or_else(|| {
        anyhow::anyhow!(
            "SECRETS_MISSING: required env var '{}' (JWT secret) is not set or empty",
            names.jwt_secret_var
        )
    })?;

    let database_url = resolve_env(&names.database_url_var).ok_or_else(|| {
        anyhow::anyhow!(
            "SECRETS_MISSING: required env var '{}' (database URL) is not set or empty",
            names.database_url_var
        )
    })?;

    if loadhub_crypto::EncryptionKey::from_base64(&encryption_key_base64).is_err() {
        bail!(
            "SECRETS_INVALID: env var '{}' must decode to 32 bytes base64",
            names.encryption_key_var
        );
    }

    Ok(ResolvedSecrets {
        encryption_key_base64,
        jwt_secret,
        jwt_expiry_seconds: jwt_expiry_seconds(config_json),
        database_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    // env vars are process-global; serialize the tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn resolves_from_default_var_names() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("LOADHUB_ENCRYPTION_KEY", base64::Engine::encode(&base64::engine::general_purpose::STANDARD, [3u8; 32]));
        std::env::set_var("LOADHUB_JWT_SECRET", "shh-its-a-secret");
        std::env::set_var("LOADHUB_DATABASE_URL", "postgres://localhost/loadhub");

        let resolved = resolve_secrets(&json!({})).unwrap();
        assert_eq!(resolved.jwt_secret, "shh-its-a-secret");
        assert_eq!(resolved.jwt_expiry_seconds, 3600);

        std::env::remove_var("LOADHUB_ENCRYPTION_KEY");
        std::env::remove_var("LOADHUB_JWT_SECRET");
        std::env::remove_var("LOADHUB_DATABASE_URL");
    }

    #[test]
    fn missing_var_names_the_var_not_a_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("LOADHUB_JWT_SECRET_CUSTOM");
        let cfg = json!({"secrets": {"jwt_secret_env": "LOADHUB_JWT_SECRET_CUSTOM"}});
        let err = resolve_secrets(&cfg).unwrap_err();
        assert!(err.to_string().contains("LOADHUB_JWT_SECRET_CUSTOM"));
    }

    #[test]
    fn debug_redacts_every_field() {
        let resolved = ResolvedSecrets {
            encryption_key_base64: "topsecretkey".to_string(),
            jwt_secret: "topsecretjwt".to_string(),
            jwt_expiry_seconds: 900,
            database_url: "postgres://user:pw@host/db".to_string(),
        };
        let debug_str = format!("{resolved:?}");
        assert!(!debug_str.contains("topsecretkey"));
        assert!(!debug_str.contains("topsecretjwt"));
        assert!(!debug_str.contains("user:pw"));
    }
}
