//! Rotating verification keys published by the authority.
//!
//! The current key set is an immutable [`KeySnapshot`] behind an [`ArcSwap`]:
//! readers never block, and a refresh replaces the whole snapshot at once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use jsonwebtoken::DecodingKey;
use tracing::{error, info};

use crate::auth::AuthError;
use crate::authority::{Authority, RawPublicKey};

/// One parsed verification key.
#[derive(Clone)]
pub struct PublicKey {
    pub name: String,
    /// Lookup key; matches a credential's `iss` claim.
    pub hash: String,
    /// DER-encoded SubjectPublicKeyInfo as published.
    pub raw: Vec<u8>,
    decoding: DecodingKey,
}

impl PublicKey {
    /// Parse a DER SubjectPublicKeyInfo holding an EC public key.
    pub fn from_der(name: String, hash: String, der: Vec<u8>) -> Result<Self, AuthError> {
        let pem = der_to_pem(&der);
        let decoding = DecodingKey::from_ec_pem(pem.as_bytes())
            .map_err(|e| AuthError::KeyRefreshFailed(format!("key {name}: {e}")))?;
        Ok(Self {
            name,
            hash,
            raw: der,
            decoding,
        })
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("name", &self.name)
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

/// Wrap DER bytes as a `PUBLIC KEY` PEM block.
fn der_to_pem(der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = String::from("-----BEGIN PUBLIC KEY-----\n");
    for line in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    pem
}

/// Key set as of one successful fetch.
#[derive(Debug)]
pub struct KeySnapshot {
    pub fetched_at: DateTime<Utc>,
    pub keys: Vec<PublicKey>,
}

impl KeySnapshot {
    /// Parse every fetched entry. Any missing or malformed entry fails the
    /// whole snapshot.
    pub fn parse(raw: Vec<Option<RawPublicKey>>) -> Result<Self, AuthError> {
        let keys = raw
            .into_iter()
            .map(|entry| {
                let entry = entry.ok_or_else(|| {
                    AuthError::KeyRefreshFailed("found unknown public key entry".into())
                })?;
                let der = STANDARD.decode(entry.public_key.trim()).map_err(|e| {
                    AuthError::KeyRefreshFailed(format!("key {}: base64: {e}", entry.name))
                })?;
                PublicKey::from_der(entry.name, entry.hash, der)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            fetched_at: Utc::now(),
            keys,
        })
    }

    /// Find the key whose hash equals `hash`.
    pub fn lookup(&self, hash: &str) -> Option<&PublicKey> {
        if hash.is_empty() {
            return None;
        }
        self.keys.iter().find(|k| k.hash == hash)
    }
}

/// Holder of the current [`KeySnapshot`].
pub struct KeyStore {
    authority: Arc<dyn Authority>,
    current: ArcSwap<KeySnapshot>,
}

impl KeyStore {
    /// Fetch the initial key set. Fails if the authority cannot provide one.
    pub async fn bootstrap(authority: Arc<dyn Authority>) -> Result<Arc<Self>, AuthError> {
        let snapshot = fetch_snapshot(authority.as_ref()).await?;
        info!(keys = snapshot.keys.len(), "verification keys loaded");
        Ok(Arc::new(Self::with_snapshot(authority, snapshot)))
    }

    /// Build a store around an already parsed snapshot.
    pub fn with_snapshot(authority: Arc<dyn Authority>, snapshot: KeySnapshot) -> Self {
        Self {
            authority,
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    /// The latest published snapshot.
    pub fn current(&self) -> Arc<KeySnapshot> {
        self.current.load_full()
    }

    /// Fetch and publish a new snapshot. On failure the previous snapshot
    /// stays in place.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let snapshot = fetch_snapshot(self.authority.as_ref()).await?;
        info!(keys = snapshot.keys.len(), "verification keys refreshed");
        self.current.store(Arc::new(snapshot));
        Ok(())
    }

    /// Spawn the periodic refresh task. The first refresh happens one
    /// `period` after the call.
    pub fn spawn_refresh_task(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                if let Err(e) = store.refresh().await {
                    error!(error = %e, "verification key refresh failed");
                }
            }
        })
    }
}

async fn fetch_snapshot(authority: &dyn Authority) -> Result<KeySnapshot, AuthError> {
    let raw = authority
        .fetch_keys()
        .await
        .map_err(|e| match e {
            AuthError::KeyRefreshFailed(_) => e,
            other => AuthError::KeyRefreshFailed(other.to_string()),
        })?;
    KeySnapshot::parse(raw)
}
