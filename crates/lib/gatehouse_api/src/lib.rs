//! # gatehouse_api
//!
//! Axum glue for Gatehouse: bearer token and `{user}` middlewares, error
//! responses and the decision endpoints.

pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use gatehouse_core::gate::{Gate, TokenOptions, UserOptions};

use crate::handlers::{authorize, users};
use crate::middleware::token::{self, TokenGuard};
use crate::middleware::user::{self, UserGuard};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<Gate>,
    /// Token requirements of authenticated routes.
    pub token_options: TokenOptions,
    /// Lookup policy for `{user}` path parameters.
    pub user_options: UserOptions,
}

impl AppState {
    pub fn new(gate: Arc<Gate>) -> Self {
        Self {
            gate,
            token_options: TokenOptions::default(),
            user_options: UserOptions::default(),
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let required = TokenGuard::new(state.gate.clone(), state.token_options.clone());
    let optional = TokenGuard::new(
        state.gate.clone(),
        TokenOptions {
            required: false,
            ..state.token_options.clone()
        },
    );
    let user_lookup = UserGuard::new(state.gate.clone(), state.user_options);

    // Routes that need a token.
    let authenticated = Router::new()
        .route("/me", get(users::me))
        .route("/authorize", post(authorize::authorize))
        .layer(from_fn_with_state(required, token::authenticate));

    // User lookup; a token is only needed for `me`.
    let lookup = Router::new()
        .route("/users/{user}", get(users::get_user))
        .route_layer(from_fn_with_state(user_lookup, user::resolve_user))
        .layer(from_fn_with_state(optional, token::authenticate));

    Router::new()
        .merge(authenticated)
        .merge(lookup)
        .with_state(state)
}
