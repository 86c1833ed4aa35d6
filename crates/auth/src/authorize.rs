use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' lacks permission '{permission}'")]
    Forbidden { role: String, permission: String },
}

/// Permissions granted by a role.
///
/// Admin holds the wildcard. Staff may move, count, and view stock, export the
/// catalog, and register counterparties; everything else is admin-only.
pub fn role_permissions(role: &Role) -> Vec<Permission> {
    if role.is_admin() {
        vec![Permission::WILDCARD]
    } else if *role == Role::STAFF {
        vec![
            Permission::STOCK_MOVE,
            Permission::STOCK_ADJUST,
            Permission::STOCK_READ,
            Permission::CATALOG_EXPORT,
            Permission::PARTIES_WRITE,
        ]
    } else {
        vec![]
    }
}

/// Capability check callers run before invoking a ledger mutation.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = role_permissions(&principal.role)
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        debug!(
            user = %principal.username,
            role = %principal.role,
            permission = %required,
            "authorization denied"
        );
        Err(AuthzError::Forbidden {
            role: principal.role.as_str().to_string(),
            permission: required.as_str().to_string(),
        })
    }
}

/// Why a request was allowed or denied (for audit screens and logs).
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub reason: String,
    pub role: String,
    pub effective_permissions: Vec<String>,
}

pub fn explain_authorization(principal: &Principal, required: &Permission) -> AuthorizationExplanation {
    let mut effective: Vec<String> = role_permissions(&principal.role)
        .iter()
        .map(|p| p.as_str().to_string())
        .collect();
    effective.sort();

    let has_wildcard = effective.iter().any(|p| p == "*");
    let granted = has_wildcard || effective.iter().any(|p| p == required.as_str());

    let reason = if has_wildcard {
        format!("role '{}' holds the wildcard permission", principal.role)
    } else if granted {
        format!("role '{}' grants '{}'", principal.role, required)
    } else {
        format!(
            "role '{}' does not grant '{}'; it grants {:?}",
            principal.role, required, effective
        )
    };

    AuthorizationExplanation {
        required_permission: required.as_str().to_string(),
        granted,
        reason,
        role: principal.role.as_str().to_string(),
        effective_permissions: effective,
    }
}
