//! Authentication domain models.
//!
//! Field names on the wire follow the authority's JSON (`_id`, `user_id`,
//! `user_scopes`, ...). The same shapes are stored as cached documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Action parameters attached to a granting role.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Token record issued by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub token_type: String,
    pub user_id: String,
    /// Owner of the token. Populated on resolution, never stored with the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default)]
    pub application_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "skip_null_entries",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub user_scopes: Vec<UserScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Whether the token itself has expired at `now`. Tokens without an
    /// expiry never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expired_at.is_some_and(|at| at < now)
    }
}

/// Time-bounded grant of one scope to a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
}

impl UserScope {
    /// Eligible while the expiry is unset or strictly after `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expired_at.is_none_or(|at| at > now)
    }
}

/// Prioritized list of rules for one application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default)]
    pub application_id: String,
    /// Higher levels are evaluated first.
    #[serde(default)]
    pub level: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<ScopeRole>,
}

/// Lifecycle state of a scope role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleStatus {
    /// Not yet active; ignored during evaluation.
    Pending,
    Approved,
    Banned,
    /// Absent or unrecognized; never grants.
    #[default]
    #[serde(other)]
    Unknown,
}

/// A single rule inside a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeRole {
    /// Auth types of which the token owner must hold at least one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auths: Vec<String>,
    #[serde(default)]
    pub status: RoleStatus,
    /// `"*"`, `"me"` or a user object id.
    #[serde(default)]
    pub user: String,
    /// Exact resource type or a `*` glob.
    #[serde(rename = "type", default)]
    pub resource_type: String,
    /// `"*"` or an exact action.
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: Params,
}

/// User profile as known to the authority, plus locally owned fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub avatar: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub locale: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gender: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auth_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Copy the fields the authority owns from `source`, keeping local ones
    /// (currently `auth_types`) untouched.
    pub fn merge_authority_fields(&mut self, source: &User) {
        self.username = source.username.clone();
        self.nickname = source.nickname.clone();
        self.avatar = source.avatar.clone();
        self.locale = source.locale.clone();
        self.description = source.description.clone();
        self.gender = source.gender.clone();
        self.birthday = source.birthday;
        self.created_at = source.created_at;
        self.updated_at = source.updated_at;
    }
}

/// Accepts `null` for the whole list and drops `null` entries inside it.
fn skip_null_entries<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let entries: Option<Vec<Option<T>>> = Option::deserialize(deserializer)?;
    Ok(entries.unwrap_or_default().into_iter().flatten().collect())
}

/// Claims carried by an authority-signed bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the token id.
    #[serde(rename = "sub", default)]
    pub subject: String,
    /// Issuer: hash of the signing key.
    #[serde(rename = "iss", default)]
    pub issuer_hash: String,
    #[serde(rename = "type", default)]
    pub token_type: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(rename = "scope", default)]
    pub scope_hint: String,
    /// Must be `"token"` for the credential to be accepted as a token.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(rename = "iat", default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,
    #[serde(rename = "exp", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    #[test]
    fn token_deserializes_authority_json() {
        let token: Token = serde_json::from_value(json!({
            "_id": "5cb2d0ba11ca2b19eefc2001",
            "type": "access",
            "user_id": "5cb2d0ba11ca2b19eefc2002",
            "application_id": "5cb2d0ba11ca2b19eefc2003",
            "user": { "_id": "5cb2d0ba11ca2b19eefc2002", "username": "ann", "nickname": "Ann" },
            "user_scopes": [{
                "scope": {
                    "application_id": "5cb2d0ba11ca2b19eefc2003",
                    "level": 3,
                    "roles": [{
                        "status": "approved", "user": "me", "type": "post.*",
                        "action": "read", "params": { "limit": 10 }
                    }]
                }
            }],
            "expired_at": "2030-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(token.token_type, "access");
        assert_eq!(token.user.as_ref().unwrap().username, "ann");
        let scope = token.user_scopes[0].scope.as_ref().unwrap();
        assert_eq!(scope.level, 3);
        assert_eq!(scope.roles[0].status, RoleStatus::Approved);
        assert_eq!(scope.roles[0].resource_type, "post.*");
        assert_eq!(scope.roles[0].params["limit"], 10);
    }

    #[test]
    fn unknown_role_status_is_preserved_as_unknown() {
        let role: ScopeRole =
            serde_json::from_value(json!({ "status": "suspended", "user": "*" })).unwrap();
        assert_eq!(role.status, RoleStatus::Unknown);
    }

    #[test]
    fn role_without_status_never_grants() {
        let role: ScopeRole =
            serde_json::from_value(json!({ "user": "*", "type": "*", "action": "*" })).unwrap();
        assert_eq!(role.status, RoleStatus::Unknown);
    }

    #[test]
    fn null_user_scopes_are_dropped() {
        let token: Token = serde_json::from_value(json!({
            "_id": "5cb2d0ba11ca2b19eefc2001",
            "user_id": "5cb2d0ba11ca2b19eefc2002",
            "user_scopes": [null, { "scope": { "level": 1, "roles": [{ "user": "*" }] } }, null],
        }))
        .unwrap();
        assert_eq!(token.user_scopes.len(), 1);
        let roles = &token.user_scopes[0].scope.as_ref().unwrap().roles;
        assert_eq!(roles[0].status, RoleStatus::Unknown);

        let token: Token = serde_json::from_value(json!({
            "_id": "5cb2d0ba11ca2b19eefc2001",
            "user_id": "5cb2d0ba11ca2b19eefc2002",
            "user_scopes": null,
        }))
        .unwrap();
        assert!(token.user_scopes.is_empty());
    }

    #[test]
    fn user_scope_expiry_is_strict() {
        let now = Utc::now();
        let scope = UserScope {
            scope: None,
            expired_at: Some(now),
        };
        assert!(!scope.is_active_at(now));
        assert!(scope.is_active_at(now - Duration::seconds(1)));
        let open = UserScope {
            scope: None,
            expired_at: None,
        };
        assert!(open.is_active_at(now));
    }

    #[test]
    fn merge_keeps_local_auth_types() {
        let mut local = User {
            id: "5cb2d0ba11ca2b19eefc2002".into(),
            username: "old".into(),
            nickname: "Old".into(),
            avatar: String::new(),
            locale: String::new(),
            description: String::new(),
            gender: String::new(),
            auth_types: vec!["password".into()],
            birthday: None,
            created_at: None,
            updated_at: None,
        };
        let mut remote = local.clone();
        remote.username = "new".into();
        remote.nickname = "New".into();
        remote.auth_types = vec![];
        remote.updated_at = Some(Utc::now());

        local.merge_authority_fields(&remote);
        assert_eq!(local.username, "new");
        assert_eq!(local.nickname, "New");
        assert_eq!(local.updated_at, remote.updated_at);
        assert_eq!(local.auth_types, vec!["password".to_string()]);
    }
}
