//! Bearer-token verification (`spec.md` §1: login/issuance are assumed to
//! exist externally; token *verification* is this crate's job). A minimal
//! `POST /api/v1/auth/login` is still wired here because the wire surface
//! in §6 names it and nothing upstream issues tokens for this workspace —
//! see `DESIGN.md` for the reconciliation.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub roles: Vec<String>,
    pub exp: i64,
}

/// `sha256(password)` hex digest, compared against `auth_user.password_hash`.
/// A placeholder for the real identity provider's hashing scheme (out of
/// scope per `spec.md` §1) — good enough to exercise the login endpoint and
/// the downstream role-aware surface it gates.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn issue_token(secret: &str, expiry_seconds: i64, username: &str, roles: &[String]) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let claims = Claims {
        sub: username.to_string(),
        roles: roles.to_vec(),
        exp: (now + chrono::Duration::seconds(expiry_seconds)).timestamp(),
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?;
    Ok(token)
}

fn verify_token(secret: &str, token: &str) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// The verified identity of the caller on every authenticated route — the
/// real enforcement surface; `_links` in a response body are advisory only
/// (`spec.md` §4.12).
pub struct AuthUser {
    pub username: String,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[async_trait::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::new("UNAUTHORIZED", "missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::new("UNAUTHORIZED", "Authorization header must be a Bearer token"))?;

        let claims =
            verify_token(&state.jwt_secret, token).map_err(|_| ApiError::new("UNAUTHORIZED", "invalid or expired token"))?;

        Ok(AuthUser { username: claims.sub, roles: claims.roles })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_claims_through_the_same_secret() {
        let token = issue_token("test-secret", 60, "alice", &["OPERATOR".to_string()]).unwrap();
        let claims = verify_token("test-secret", &token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.roles, vec!["OPERATOR".to_string()]);
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let token = issue_token("test-secret", 60, "alice", &["VIEWER".to_string()]).unwrap();
        assert!(verify_token("different-secret", &token).is_err());
    }

    #[test]
    fn hash_password_is_deterministic() {
        assert_eq!(hash_password("hunter2"), hash_password("hunter2"));
        assert_ne!(hash_password("hunter2"), hash_password("hunter3"));
    }
}
