//! Per-request authentication and authorization.
//!
//! [`Gate`] is the entry point callers use: it verifies the bearer
//! credential, resolves the token and its owner, checks the token against the
//! caller's requirements and finally evaluates scopes for a resource.
//! Everything resolved for one request is memoized in a [`RequestContext`]
//! that the caller threads through its handlers.

use std::sync::Arc;

use chrono::Utc;
use tracing::{Span, debug, instrument, warn};

use crate::auth::AuthError;
use crate::auth::jwt::verify_credential;
use crate::auth::scope::validate_scope;
use crate::authority::Authority;
use crate::keys::KeyStore;
use crate::models::auth::{Params, Token, User};
use crate::models::is_object_id;
use crate::models::resource::Resource;
use crate::resolver::{ResolveOptions, Resolver};
use crate::store::RecordStore;

/// Identifier that refers to the authenticated token's own user.
pub const ME: &str = "me";

/// Requirements a request places on its bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenOptions {
    /// Accepted token types. Empty accepts any type.
    pub types: Vec<String>,
    /// Fail when the request carries no credential.
    pub required: bool,
    /// Reject tokens whose `expired_at` has passed.
    pub reject_expired: bool,
    /// Use the local record store.
    pub cache: bool,
}

impl Default for TokenOptions {
    fn default() -> Self {
        Self {
            types: Vec::new(),
            required: true,
            reject_expired: true,
            cache: true,
        }
    }
}

impl TokenOptions {
    /// Authenticate when a credential is present, carry on anonymously
    /// otherwise.
    pub fn optional() -> Self {
        Self {
            required: false,
            ..Self::default()
        }
    }

    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }
}

/// Where a user lookup may look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserOptions {
    pub cache: bool,
    pub fetch: bool,
}

impl Default for UserOptions {
    fn default() -> Self {
        Self {
            cache: true,
            fetch: true,
        }
    }
}

impl From<UserOptions> for ResolveOptions {
    fn from(options: UserOptions) -> Self {
        ResolveOptions {
            use_cache: options.cache,
            allow_fetch: options.fetch,
        }
    }
}

/// Identity resolved for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// The authenticated token, with its owner populated.
    pub token: Option<Arc<Token>>,
    /// The user addressed by the request.
    pub user: Option<Arc<User>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The authenticated token's owner.
    pub fn token_user(&self) -> Option<&User> {
        self.token.as_ref().and_then(|t| t.user.as_ref())
    }
}

/// Authentication and authorization façade.
#[derive(Clone)]
pub struct Gate {
    keys: Arc<KeyStore>,
    resolver: Resolver,
}

impl Gate {
    pub fn new(
        keys: Arc<KeyStore>,
        store: Arc<dyn RecordStore>,
        authority: Arc<dyn Authority>,
    ) -> Self {
        Self {
            keys,
            resolver: Resolver::new(store, authority),
        }
    }

    pub fn keys(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Authenticate an optional bearer credential.
    ///
    /// Without a credential the result is `Ok(None)`, unless `options`
    /// require one, in which case the token is not found.
    pub async fn authenticate(
        &self,
        ctx: &mut RequestContext,
        credential: Option<&str>,
        options: &TokenOptions,
    ) -> Result<Option<Arc<Token>>, AuthError> {
        match credential.map(str::trim).filter(|c| !c.is_empty()) {
            Some(credential) => self.get_token(ctx, credential, options).await.map(Some),
            None if options.required => Err(AuthError::TokenNotFound),
            None => Ok(None),
        }
    }

    /// Verify `credential` and return its token, resolving it once per
    /// request.
    #[instrument(
        skip_all,
        fields(token_id = tracing::field::Empty, user_id = tracing::field::Empty)
    )]
    pub async fn get_token(
        &self,
        ctx: &mut RequestContext,
        credential: &str,
        options: &TokenOptions,
    ) -> Result<Arc<Token>, AuthError> {
        let claims = verify_credential(&self.keys, credential)?;

        let token = match &ctx.token {
            Some(token) => Arc::clone(token),
            None => {
                let token = self
                    .resolver
                    .resolve_token(credential, &claims.subject, options.cache)
                    .await?
                    .ok_or(AuthError::TokenNotFound)?;
                if token.user.is_none() {
                    return Err(AuthError::UserNotFound);
                }
                let token = Arc::new(token);
                ctx.token = Some(Arc::clone(&token));
                token
            }
        };

        let span = Span::current();
        span.record("token_id", token.id.as_str());
        span.record("user_id", token.user_id.as_str());

        if token.id != claims.subject
            || token.token_type != claims.token_type
            || token.user_id != claims.user_id
        {
            warn!(
                claims_subject = %claims.subject,
                claims_type = %claims.token_type,
                claims_user = %claims.user_id,
                "token record disagrees with credential"
            );
            return Err(AuthError::TokenNotFound);
        }

        if !options.types.is_empty() && !options.types.contains(&token.token_type) {
            debug!(token_type = %token.token_type, "token type not accepted");
            return Err(AuthError::TokenNotFound);
        }

        if options.reject_expired && token.is_expired_at(Utc::now()) {
            return Err(AuthError::TokenExpired);
        }

        Ok(token)
    }

    /// Resolve the user `id`, where `me` stands for the authenticated
    /// token's owner.
    pub async fn get_user(
        &self,
        ctx: &mut RequestContext,
        id: &str,
        options: UserOptions,
    ) -> Result<Arc<User>, AuthError> {
        if id == ME {
            let token = ctx.token.as_ref().ok_or(AuthError::CredentialRequired)?;
            let owner = Arc::new(token.user.clone().ok_or(AuthError::UserNotFound)?);
            ctx.user = Some(Arc::clone(&owner));
            return Ok(owner);
        }

        if let Some(user) = &ctx.user
            && user.id == id
        {
            return Ok(Arc::clone(user));
        }

        if !is_object_id(id) {
            return Err(AuthError::UserNotFound);
        }

        let user = self
            .resolver
            .resolve_user(id, options.into())
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let user = Arc::new(user);
        ctx.user = Some(Arc::clone(&user));
        Ok(user)
    }

    /// Evaluate the token's scopes for `resource`.
    ///
    /// An owner of `me` is replaced by the token's user id before
    /// evaluation.
    pub fn authorize(&self, token: &Token, resource: &Resource) -> Result<Params, AuthError> {
        if resource.owner.as_deref() == Some(ME) {
            let resource = resource.clone().owned_by(token.user_id.clone());
            return validate_scope(token, &resource);
        }
        validate_scope(token, resource)
    }

    /// Authenticate the `Authorization` header value and authorize
    /// `resource` in one step.
    pub async fn check(
        &self,
        authorization: Option<&str>,
        resource: &Resource,
        options: &TokenOptions,
    ) -> Result<Params, AuthError> {
        let credential = authorization.and_then(bearer_credential);
        let mut ctx = RequestContext::new();
        let token = self
            .authenticate(&mut ctx, credential, options)
            .await?
            .ok_or(AuthError::TokenNotFound)?;
        self.authorize(&token, resource)
    }
}

/// Extract the credential from an `Authorization` header value.
///
/// Only the `Bearer` scheme (any case) is recognized.
pub fn bearer_credential(value: &str) -> Option<&str> {
    if value.len() <= 7 {
        return None;
    }
    let (scheme, rest) = value.split_at_checked(7)?;
    if !scheme.eq_ignore_ascii_case("bearer ") {
        return None;
    }
    Some(rest.trim()).filter(|c| !c.is_empty())
}
