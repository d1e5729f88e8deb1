//! Approval / State Permissions (4.12): an explicit `_links` builder
//! consuming the role x state permission matrix as data, replacing
//! reflection-based HATEOAS serialization.
//!
//! The matrix itself lives in Postgres (`resource_management_state_permission`,
//! seeded by migration, fetched whole once via [`PermissionMatrix::load`]);
//! this crate never branches on role or state in code — every link decision
//! is a table lookup.

use std::collections::HashMap;

use anyhow::Result;
use loadhub_schemas::LoaderState;
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize)]
pub struct ActionLink {
    pub href: String,
    pub method: String,
}

/// One (resourceType, state, role) -> (action -> method/href template) slice
/// of the matrix, held entirely in memory after [`PermissionMatrix::load`].
pub struct PermissionMatrix {
    entries: HashMap<(String, String, String), Vec<(String, String, String)>>,
}

impl PermissionMatrix {
    pub async fn load(pool: &PgPool) -> Result<Self> {
        let rows = loadhub_db::permissions::list_all(pool).await?;
        let mut entries: HashMap<(String, String, String), Vec<(String, String, String)>> =
            HashMap::new();
        for row in rows {
            entries
                .entry((row.resource_type_code, row.state_code, row.role_code))
                .or_default()
                .push((row.action_code, row.http_method, row.href_template));
        }
        Ok(Self { entries })
    }

    /// `allowed = (role permits action) AND (state permits action)`: since
    /// the matrix is keyed by `(resourceType, state, role)` already, "state
    /// permits" and "role permits" collapse into one row lookup — there is
    /// no role-only or state-only table to intersect separately.
    fn actions_for(&self, resource_type: &str, state: LoaderState, role: &str) -> &[(String, String, String)] {
        self.entries
            .get(&(resource_type.to_string(), state.as_str().to_string(), role.to_string()))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Builds the `_links` map for one loader across every role the caller
    /// holds, substituting `{code}` in each `href_template`. A caller with
    /// multiple roles sees the union of what any one role admits.
    pub fn links_for_loader(
        &self,
        loader_code: &str,
        state: LoaderState,
        roles: &[String],
    ) -> HashMap<String, ActionLink> {
        let mut links = HashMap::new();
        for role in roles {
            for (action_code, method, href_template) in self.actions_for("LOADER", state, role) {
                links.entry(action_code.clone()).or_insert_with(|| ActionLink {
                    href: href_template.replace("{code}", loader_code),
                    method: method.clone(),
                });
            }
        }
        links
    }

    /// Server-side re-check for one state-changing action — the `_links`
    /// set in a response body is advisory only, every mutating endpoint
    /// must call this before acting (4.12).
    pub fn is_allowed(
        &self,
        resource_type: &str,
        state: LoaderState,
        roles: &[String],
        action_code: &str,
    ) -> bool {
        roles.iter().any(|role| {
            self.actions_for(resource_type, state, role)
                .iter()
                .any(|(code, _, _)| code == action_code)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix_with(rows: Vec<(&str, &str, &str, &str, &str, &str)>) -> PermissionMatrix {
        let mut entries: HashMap<(String, String, String), Vec<(String, String, String)>> =
            HashMap::new();
        for (resource_type, state, role, action, method, href) in rows {
            entries
                .entry((resource_type.into(), state.into(), role.into()))
                .or_default()
                .push((action.into(), method.into(), href.into()));
        }
        PermissionMatrix { entries }
    }

    #[test]
    fn substitutes_loader_code_into_href() {
        let matrix = matrix_with(vec![(
            "LOADER",
            "ENABLED",
            "OPERATOR",
            "TOGGLE_ENABLED",
            "PUT",
            "/api/v1/res/loaders/{code}/toggle",
        )]);
        let links = matrix.links_for_loader(
            "DAILY_SALES",
            LoaderState::Enabled,
            &["OPERATOR".to_string()],
        );
        assert_eq!(
            links.get("TOGGLE_ENABLED").unwrap().href,
            "/api/v1/res/loaders/DAILY_SALES/toggle"
        );
    }

    #[test]
    fn role_with_no_matching_row_sees_no_links() {
        let matrix = matrix_with(vec![(
            "LOADER",
            "PENDING_APPROVAL",
            "ADMIN",
            "APPROVE_LOADER",
            "POST",
            "/api/v1/res/loaders/{code}/approve",
        )]);
        let links = matrix.links_for_loader(
            "DAILY_SALES",
            LoaderState::PendingApproval,
            &["VIEWER".to_string()],
        );
        assert!(links.is_empty());
    }

    #[test]
    fn is_allowed_checks_every_held_role() {
        let matrix = matrix_with(vec![(
            "LOADER",
            "IDLE",
            "OPERATOR",
            "FORCE_START",
            "POST",
            "/api/v1/res/loaders/{code}/execute",
        )]);
        assert!(matrix.is_allowed(
            "LOADER",
            LoaderState::Idle,
            &["VIEWER".to_string(), "OPERATOR".to_string()],
            "FORCE_START"
        ));
        assert!(!matrix.is_allowed(
            "LOADER",
            LoaderState::Idle,
            &["VIEWER".to_string()],
            "FORCE_START"
        ));
    }
}
