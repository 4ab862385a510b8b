//! Record resolution — local store first, authority second, persist on fetch.
//!
//! Resolution order: local store (if caching) → authority (if fetching).
//! A freshly fetched record is inserted into the store; losing an insert race
//! to a concurrent resolver is not an error, and this resolver keeps using
//! its own copy.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::AuthError;
use crate::authority::Authority;
use crate::models::auth::{Token, User};
use crate::store::{self, InsertOutcome, Record, RecordStore};

/// Where a resolution may look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Consult and populate the local store.
    pub use_cache: bool,
    /// Ask the authority when the store has nothing.
    pub allow_fetch: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            allow_fetch: true,
        }
    }
}

/// Where a resolved record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Remote,
}

/// A record plus its origin.
#[derive(Debug, Clone)]
pub struct Resolved<R> {
    pub record: R,
    pub source: Source,
}

/// Cache-or-fetch resolver for tokens and users.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn RecordStore>,
    authority: Arc<dyn Authority>,
}

impl Resolver {
    pub fn new(store: Arc<dyn RecordStore>, authority: Arc<dyn Authority>) -> Self {
        Self { store, authority }
    }

    /// Resolve the record `id` of type `R`, calling `fetch` on a cache miss.
    ///
    /// Returns `Ok(None)` when neither source has the record, or when the
    /// record found does not carry the requested id.
    pub async fn resolve<R, F, Fut>(
        &self,
        id: &str,
        options: ResolveOptions,
        fetch: F,
    ) -> Result<Option<Resolved<R>>, AuthError>
    where
        R: Record,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<R>, AuthError>>,
    {
        let mut resolved = None;

        if options.use_cache
            && let Some(record) = store::find::<R>(self.store.as_ref(), id).await?
        {
            resolved = Some(Resolved {
                record,
                source: Source::Cache,
            });
        }

        if resolved.is_none()
            && options.allow_fetch
            && let Some(record) = fetch().await?
        {
            if options.use_cache {
                self.persist_new(&record).await?;
            }
            resolved = Some(Resolved {
                record,
                source: Source::Remote,
            });
        }

        match resolved {
            Some(r) if r.record.id() == id => Ok(Some(r)),
            Some(r) => {
                warn!(
                    collection = %R::COLLECTION,
                    requested = id,
                    found = r.record.id(),
                    "resolved record id mismatch"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Resolve a token by id on behalf of `credential`.
    ///
    /// A cached token gets its user populated from the store. A fetched
    /// token must embed its user, which is created or refreshed locally.
    pub async fn resolve_token(
        &self,
        credential: &str,
        token_id: &str,
        use_cache: bool,
    ) -> Result<Option<Token>, AuthError> {
        let options = ResolveOptions {
            use_cache,
            allow_fetch: true,
        };
        let resolved = self
            .resolve::<Token, _, _>(token_id, options, || async {
                let token = self.authority.fetch_token(credential).await?;
                if token.as_ref().is_some_and(|t| t.user.is_none()) {
                    return Err(AuthError::UserNotFound);
                }
                Ok(token)
            })
            .await?;

        let Some(Resolved { mut record, source }) = resolved else {
            return Ok(None);
        };

        match source {
            Source::Cache => {
                record.user = store::find::<User>(self.store.as_ref(), &record.user_id).await?;
            }
            Source::Remote => {
                let embedded = record.user.take().ok_or(AuthError::UserNotFound)?;
                if embedded.id != record.user_id {
                    warn!(
                        token_id = %record.id,
                        user_id = %record.user_id,
                        embedded = %embedded.id,
                        "token embeds a different user"
                    );
                    return Err(AuthError::UserNotFound);
                }
                record.user = Some(self.sync_user(embedded, use_cache).await?);
            }
        }
        debug!(token_id = %record.id, user_id = %record.user_id, ?source, "token resolved");
        Ok(Some(record))
    }

    /// Resolve a user by id.
    pub async fn resolve_user(
        &self,
        user_id: &str,
        options: ResolveOptions,
    ) -> Result<Option<User>, AuthError> {
        let resolved = self
            .resolve::<User, _, _>(user_id, options, || self.authority.fetch_user(user_id))
            .await?;
        Ok(resolved.map(|r| {
            debug!(user_id = %r.record.id, source = ?r.source, "user resolved");
            r.record
        }))
    }

    /// Bring the local copy of a user in line with what the authority just
    /// sent. Locally owned fields of an existing copy are kept.
    async fn sync_user(&self, remote: User, use_cache: bool) -> Result<User, AuthError> {
        if !use_cache {
            return Ok(remote);
        }
        match store::find::<User>(self.store.as_ref(), &remote.id).await? {
            None => {
                self.persist_new(&remote).await?;
                Ok(remote)
            }
            Some(mut local) => {
                local.merge_authority_fields(&remote);
                store::replace(self.store.as_ref(), &local).await?;
                Ok(local)
            }
        }
    }

    async fn persist_new<R: Record>(&self, record: &R) -> Result<(), AuthError> {
        match store::insert(self.store.as_ref(), record).await? {
            InsertOutcome::Inserted => {
                debug!(collection = %R::COLLECTION, id = record.id(), "record cached");
            }
            InsertOutcome::Duplicate => {
                debug!(
                    collection = %R::COLLECTION,
                    id = record.id(),
                    "record already cached by a concurrent resolver"
                );
            }
        }
        Ok(())
    }
}
