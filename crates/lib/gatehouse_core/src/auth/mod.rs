//! Authentication and authorization logic.
//!
//! Credential verification against the authority's rotating keys and
//! evaluation of token scopes against an access request.

pub mod jwt;
pub mod scope;

use serde_json::json;
use thiserror::Error;

use crate::models::resource::Resource;
use crate::store::StoreError;

/// Authentication and authorization errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token is required")]
    CredentialRequired,

    #[error("Invalid credential: {0}")]
    CredentialInvalid(String),

    #[error("Token not found")]
    TokenNotFound,

    #[error("Token has expired")]
    TokenExpired,

    #[error("User not found")]
    UserNotFound,

    #[error("Scope forbids {} on {}", .0.action, .0.resource_type)]
    ScopeForbidden(ScopeDenial),

    #[error("Authority unavailable: {message}")]
    UpstreamUnavailable {
        message: String,
        status: Option<u16>,
    },

    #[error("Authority request timed out")]
    UpstreamTimeout,

    #[error("Key refresh failed: {0}")]
    KeyRefreshFailed(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// HTTP status class of the error before any boundary normalization.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::CredentialRequired => 400,
            AuthError::CredentialInvalid(_) => 403,
            AuthError::TokenNotFound | AuthError::TokenExpired => 401,
            AuthError::UserNotFound => 404,
            AuthError::ScopeForbidden(_) => 403,
            AuthError::UpstreamUnavailable { status, .. } => status.unwrap_or(502),
            AuthError::UpstreamTimeout => 504,
            AuthError::KeyRefreshFailed(_) => 503,
            AuthError::Store(_) => 500,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::UpstreamTimeout | AuthError::UpstreamUnavailable { status: None, .. }
        )
    }
}

/// Diagnostic context of a denied access request. Never names the rule that
/// caused the denial.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeDenial {
    pub action: String,
    pub resource_type: String,
    pub application_id: String,
    pub owner: Option<String>,
    pub value: Option<serde_json::Value>,
}

impl ScopeDenial {
    pub fn for_resource(resource: &Resource) -> Self {
        Self {
            action: resource.action.clone(),
            resource_type: resource.resource_type.clone(),
            application_id: resource.application_id.clone(),
            owner: resource.owner_id().map(str::to_string),
            value: resource.value.clone(),
        }
    }

    /// Params object surfaced to API callers.
    pub fn params(&self) -> serde_json::Value {
        let mut params = json!({
            "action": self.action,
            "type": self.resource_type,
            "application_id": self.application_id,
        });
        if let Some(owner) = &self.owner {
            params["owner_id"] = json!(owner);
        }
        params
    }
}
