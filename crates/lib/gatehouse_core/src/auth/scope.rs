//! Scope evaluation — turns a token's prioritized rules into a decision.
//!
//! Scopes for the requested application are walked from the highest level
//! down. Inside a scope, the first role that survives every filter ends the
//! scope: approved grants, anything else moves on to the next scope.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use super::{AuthError, ScopeDenial};
use crate::models::auth::{Params, RoleStatus, Scope, ScopeRole, Token};
use crate::models::resource::Resource;

/// Evaluate `token` against `resource` at the current time.
pub fn validate_scope(token: &Token, resource: &Resource) -> Result<Params, AuthError> {
    validate_scope_at(token, resource, Utc::now())
}

/// Evaluate `token` against `resource` using a single `now` for every expiry
/// check in the pass.
pub fn validate_scope_at(
    token: &Token,
    resource: &Resource,
    now: DateTime<Utc>,
) -> Result<Params, AuthError> {
    let mut scopes: Vec<&Scope> = token
        .user_scopes
        .iter()
        .filter(|us| us.is_active_at(now))
        .filter_map(|us| us.scope.as_ref())
        .filter(|scope| scope.application_id == resource.application_id)
        .collect();
    scopes.sort_by(|a, b| b.level.cmp(&a.level));

    let auth_types: BTreeSet<&str> = token
        .user
        .as_ref()
        .map(|u| u.auth_types.iter().map(String::as_str).collect())
        .unwrap_or_default();

    for scope in scopes {
        let Some(role) = scope
            .roles
            .iter()
            .find(|role| role_matches(role, token, resource, &auth_types))
        else {
            continue;
        };
        if role.status == RoleStatus::Approved {
            debug!(
                token_id = %token.id,
                level = scope.level,
                action = %resource.action,
                "scope granted"
            );
            return Ok(role.params.clone());
        }
        debug!(
            token_id = %token.id,
            level = scope.level,
            status = ?role.status,
            "matching role does not grant, skipping scope"
        );
    }

    Err(AuthError::ScopeForbidden(ScopeDenial::for_resource(
        resource,
    )))
}

fn role_matches(
    role: &ScopeRole,
    token: &Token,
    resource: &Resource,
    auth_types: &BTreeSet<&str>,
) -> bool {
    if role.status == RoleStatus::Pending {
        return false;
    }
    if role.action != "*" && role.action != resource.action {
        return false;
    }
    if !role.auths.is_empty() && !role.auths.iter().any(|a| auth_types.contains(a.as_str())) {
        return false;
    }
    owner_matches(&role.user, token, resource.owner_id())
        && type_matches(&role.resource_type, &resource.resource_type)
}

fn owner_matches(rule: &str, token: &Token, owner: Option<&str>) -> bool {
    match (rule, owner) {
        ("", _) => false,
        ("*", _) => true,
        (_, None) => false,
        ("me", Some(owner)) => owner == token.user_id,
        (id, Some(owner)) => id == owner,
    }
}

fn type_matches(rule: &str, resource_type: &str) -> bool {
    rule == "*" || rule == resource_type || glob_match(rule, resource_type)
}

/// Anchored glob match where `*` matches any run of characters, including an
/// empty one. Every other character is literal. A pattern that fails to
/// compile matches nothing.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let source = format!("^{}$", regex::escape(pattern).replace(r"\*", ".*"));
    match Regex::new(&source) {
        Ok(re) => re.is_match(text),
        Err(e) => {
            debug!(pattern, error = %e, "invalid type pattern, skipping role");
            false
        }
    }
}
