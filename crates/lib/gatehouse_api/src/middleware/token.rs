//! Bearer token middleware.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, header::AUTHORIZATION, header::VARY},
    middleware::Next,
    response::{IntoResponse, Response},
};
use gatehouse_core::gate::{Gate, RequestContext, TokenOptions, bearer_credential};
use tracing::debug;

use crate::error::AppError;

/// State of one [`authenticate`] layer: the gate and what the guarded routes
/// require of the token.
#[derive(Clone)]
pub struct TokenGuard {
    pub gate: Arc<Gate>,
    pub options: TokenOptions,
}

impl TokenGuard {
    pub fn new(gate: Arc<Gate>, options: TokenOptions) -> Self {
        Self { gate, options }
    }
}

/// Axum middleware: authenticates `Authorization: Bearer <credential>` and
/// stores the resulting [`RequestContext`] in request extensions.
///
/// Other schemes are ignored, as if no credential had been sent. Every
/// response varies on `Authorization`.
pub async fn authenticate(
    State(guard): State<TokenGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    let credential = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_credential)
        .map(str::to_owned);

    let mut ctx = request
        .extensions_mut()
        .remove::<RequestContext>()
        .unwrap_or_default();

    let result = guard
        .gate
        .authenticate(&mut ctx, credential.as_deref(), &guard.options)
        .await;

    let mut response = match result {
        Ok(_) => {
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => {
            debug!(error = %e, "token authentication failed");
            AppError::from_token_error(e).into_response()
        }
    };
    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    response
}
