//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use tokio::sync::Barrier;

use crate::auth::AuthError;
use crate::authority::{Authority, RawPublicKey};
use crate::keys::{KeySnapshot, KeyStore};
use crate::models::auth::{RoleStatus, Scope, ScopeRole, Token, TokenClaims, User, UserScope};

pub const PRIMARY_HASH: &str = "3f1c0a9e-primary";
pub const ROTATED_HASH: &str = "b72d44e1-rotated";

pub const PRIMARY_PRIVATE_PEM: &str = include_str!("../tests/fixtures/primary-private.pem");
pub const ROTATED_PRIVATE_PEM: &str = include_str!("../tests/fixtures/rotated-private.pem");
pub const PRIMARY_PUBLIC_DER_B64: &str = include_str!("../tests/fixtures/primary-public.der.b64");
pub const ROTATED_PUBLIC_DER_B64: &str = include_str!("../tests/fixtures/rotated-public.der.b64");

pub const APP_ID: &str = "5cb2d0ba11ca2b19eefc3001";

pub fn raw_key(name: &str, hash: &str, public_key_b64: &str) -> RawPublicKey {
    RawPublicKey {
        name: name.into(),
        hash: hash.into(),
        public_key: public_key_b64.trim().into(),
    }
}

/// Key store holding both fixture keys.
pub fn key_store() -> Arc<KeyStore> {
    let snapshot = KeySnapshot::parse(vec![
        Some(raw_key("primary", PRIMARY_HASH, PRIMARY_PUBLIC_DER_B64)),
        Some(raw_key("rotated", ROTATED_HASH, ROTATED_PUBLIC_DER_B64)),
    ])
    .unwrap();
    Arc::new(KeyStore::with_snapshot(
        Arc::new(FakeAuthority::default()),
        snapshot,
    ))
}

/// Claims of a valid access token, issued now and valid for an hour.
pub fn claims_for(token_id: &str, user_id: &str) -> TokenClaims {
    let now = Utc::now().timestamp();
    TokenClaims {
        subject: token_id.into(),
        issuer_hash: String::new(),
        token_type: "access".into(),
        user_id: user_id.into(),
        scope_hint: String::new(),
        name: "token".into(),
        username: "ann".into(),
        nickname: "Ann".into(),
        issued_at: Some(now),
        expires_at: Some(now + 3600),
    }
}

/// Sign `claims` with an ES256 private key, naming `hash` as the issuer.
pub fn sign(claims: &TokenClaims, private_pem: &str, hash: &str) -> String {
    let mut claims = claims.clone();
    claims.issuer_hash = hash.into();
    let key = EncodingKey::from_ec_pem(private_pem.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::ES256), &claims, &key).unwrap()
}

pub fn sample_user(id: &str) -> User {
    User {
        id: id.into(),
        username: "ann".into(),
        nickname: "Ann".into(),
        avatar: String::new(),
        locale: "en".into(),
        description: String::new(),
        gender: String::new(),
        auth_types: vec!["password".into()],
        birthday: None,
        created_at: Some(Utc::now() - Duration::days(30)),
        updated_at: None,
    }
}

pub fn role(status: RoleStatus, user: &str, resource_type: &str, action: &str) -> ScopeRole {
    ScopeRole {
        auths: vec![],
        status,
        user: user.into(),
        resource_type: resource_type.into(),
        action: action.into(),
        params: Default::default(),
    }
}

/// Access token for `user_id` embedding its user and one open scope.
pub fn sample_token(token_id: &str, user_id: &str) -> Token {
    Token {
        id: token_id.into(),
        token_type: "access".into(),
        user_id: user_id.into(),
        user: Some(sample_user(user_id)),
        application_id: APP_ID.into(),
        client_id: None,
        user_scopes: vec![UserScope {
            scope: Some(Scope {
                application_id: APP_ID.into(),
                level: 1,
                roles: vec![role(RoleStatus::Approved, "me", "*", "read")],
            }),
            expired_at: None,
        }],
        created_at: Some(Utc::now()),
        expired_at: Some(Utc::now() + Duration::days(1)),
    }
}

/// In-process [`Authority`] with scripted responses.
#[derive(Default)]
pub struct FakeAuthority {
    keys: Mutex<Vec<Option<RawPublicKey>>>,
    keys_fail: AtomicBool,
    records_fail: AtomicBool,
    tokens: Mutex<HashMap<String, Token>>,
    users: Mutex<HashMap<String, User>>,
    rendezvous: Mutex<Option<Arc<Barrier>>>,
    pub key_fetches: AtomicUsize,
    pub token_fetches: AtomicUsize,
    pub user_fetches: AtomicUsize,
}

impl FakeAuthority {
    pub fn set_keys(&self, keys: Vec<Option<RawPublicKey>>) {
        *self.keys.lock().unwrap() = keys;
        self.keys_fail.store(false, Ordering::SeqCst);
    }

    pub fn fail_keys(&self, fail: bool) {
        self.keys_fail.store(fail, Ordering::SeqCst);
    }

    pub fn fail_records(&self, fail: bool) {
        self.records_fail.store(fail, Ordering::SeqCst);
    }

    /// Serve `token` to requests made with `credential`.
    pub fn put_token(&self, credential: &str, token: Token) {
        self.tokens.lock().unwrap().insert(credential.into(), token);
    }

    pub fn put_user(&self, user: User) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }

    /// Hold token fetches until `n` of them are in flight.
    pub fn rendezvous_token_fetches(&self, n: usize) {
        *self.rendezvous.lock().unwrap() = Some(Arc::new(Barrier::new(n)));
    }

    fn check_records(&self) -> Result<(), AuthError> {
        if self.records_fail.load(Ordering::SeqCst) {
            return Err(AuthError::UpstreamUnavailable {
                message: "authority unavailable".into(),
                status: Some(503),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Authority for FakeAuthority {
    async fn fetch_keys(&self) -> Result<Vec<Option<RawPublicKey>>, AuthError> {
        self.key_fetches.fetch_add(1, Ordering::SeqCst);
        if self.keys_fail.load(Ordering::SeqCst) {
            return Err(AuthError::KeyRefreshFailed("authority unavailable".into()));
        }
        Ok(self.keys.lock().unwrap().clone())
    }

    async fn fetch_token(&self, credential: &str) -> Result<Option<Token>, AuthError> {
        self.token_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_records()?;
        let token = self.tokens.lock().unwrap().get(credential).cloned();
        let barrier = self.rendezvous.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        Ok(token)
    }

    async fn fetch_user(&self, id: &str) -> Result<Option<User>, AuthError> {
        self.user_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_records()?;
        Ok(self.users.lock().unwrap().get(id).cloned())
    }
}
