//! Test harness: a scripted authority, fixture keys and signed credentials.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use chrono::{Duration, Utc};
use gatehouse_api::{AppState, router};
use gatehouse_core::auth::AuthError;
use gatehouse_core::authority::{Authority, RawPublicKey};
use gatehouse_core::gate::Gate;
use gatehouse_core::keys::{KeySnapshot, KeyStore};
use gatehouse_core::models::auth::{
    RoleStatus, Scope, ScopeRole, Token, TokenClaims, User, UserScope,
};
use gatehouse_core::store::memory::MemoryStore;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

pub const KEY_HASH: &str = "3f1c0a9e-primary";
const PRIVATE_PEM: &str = include_str!("../../../gatehouse_core/tests/fixtures/primary-private.pem");
const PUBLIC_DER_B64: &str =
    include_str!("../../../gatehouse_core/tests/fixtures/primary-public.der.b64");

pub const APP_ID: &str = "5cb2d0ba11ca2b19eefc3001";
pub const TOKEN_ID: &str = "5cb2d0ba11ca2b19eefc2001";
pub const USER_ID: &str = "5cb2d0ba11ca2b19eefc1001";
pub const OTHER_USER_ID: &str = "5cb2d0ba11ca2b19eefc1002";

/// Authority answering from in-memory maps.
#[derive(Default)]
pub struct ScriptedAuthority {
    tokens: Mutex<HashMap<String, Token>>,
    users: Mutex<HashMap<String, User>>,
}

impl ScriptedAuthority {
    pub fn put_token(&self, credential: &str, token: Token) {
        self.tokens.lock().unwrap().insert(credential.into(), token);
    }

    pub fn put_user(&self, user: User) {
        self.users.lock().unwrap().insert(user.id.clone(), user);
    }
}

#[async_trait]
impl Authority for ScriptedAuthority {
    async fn fetch_keys(&self) -> Result<Vec<Option<RawPublicKey>>, AuthError> {
        Ok(vec![Some(RawPublicKey {
            name: "primary".into(),
            hash: KEY_HASH.into(),
            public_key: PUBLIC_DER_B64.trim().into(),
        })])
    }

    async fn fetch_token(&self, credential: &str) -> Result<Option<Token>, AuthError> {
        Ok(self.tokens.lock().unwrap().get(credential).cloned())
    }

    async fn fetch_user(&self, id: &str) -> Result<Option<User>, AuthError> {
        Ok(self.users.lock().unwrap().get(id).cloned())
    }
}

pub fn user(id: &str, username: &str) -> User {
    User {
        id: id.into(),
        username: username.into(),
        nickname: username.to_uppercase(),
        avatar: String::new(),
        locale: "en".into(),
        description: String::new(),
        gender: String::new(),
        auth_types: vec!["password".into()],
        birthday: None,
        created_at: None,
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

/// Token for [`USER_ID`] with one scope holding `roles`.
pub fn token(roles: Vec<ScopeRole>) -> Token {
    Token {
        id: TOKEN_ID.into(),
        token_type: "access".into(),
        user_id: USER_ID.into(),
        user: Some(user(USER_ID, "ann")),
        application_id: APP_ID.into(),
        client_id: None,
        user_scopes: vec![UserScope {
            scope: Some(Scope {
                application_id: APP_ID.into(),
                level: 1,
                roles,
            }),
            expired_at: None,
        }],
        created_at: Some(Utc::now()),
        expired_at: Some(Utc::now() + Duration::days(1)),
    }
}

/// ES256 credential for [`TOKEN_ID`] with the given `name` claim.
pub fn credential_named(name: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = TokenClaims {
        subject: TOKEN_ID.into(),
        issuer_hash: KEY_HASH.into(),
        token_type: "access".into(),
        user_id: USER_ID.into(),
        scope_hint: String::new(),
        name: name.into(),
        username: "ann".into(),
        nickname: "ANN".into(),
        issued_at: Some(now),
        expires_at: Some(now + 3600),
    };
    let key = EncodingKey::from_ec_pem(PRIVATE_PEM.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::ES256), &claims, &key).unwrap()
}

pub fn credential() -> String {
    credential_named("token")
}

pub struct Harness {
    pub app: Router,
    pub authority: Arc<ScriptedAuthority>,
    pub store: Arc<MemoryStore>,
}

pub async fn harness() -> Harness {
    let authority = Arc::new(ScriptedAuthority::default());
    let raw = authority.fetch_keys().await.unwrap();
    let keys = Arc::new(KeyStore::with_snapshot(
        authority.clone(),
        KeySnapshot::parse(raw).unwrap(),
    ));
    let store = Arc::new(MemoryStore::new());
    let gate = Arc::new(Gate::new(keys, store.clone(), authority.clone()));
    Harness {
        app: router(AppState::new(gate)),
        authority,
        store,
    }
}
