//! `{user}` path parameter middleware.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use gatehouse_core::gate::{Gate, RequestContext, UserOptions};

use crate::error::AppError;

/// Path parameter holding a user id or `me`.
pub const USER_PARAM: &str = "user";

/// State of one [`resolve_user`] layer.
#[derive(Clone)]
pub struct UserGuard {
    pub gate: Arc<Gate>,
    pub options: UserOptions,
}

impl UserGuard {
    pub fn new(gate: Arc<Gate>, options: UserOptions) -> Self {
        Self { gate, options }
    }
}

/// Axum middleware: resolves the `{user}` path parameter into
/// [`RequestContext::user`]. Must be installed with `route_layer` so the
/// path is already matched; routes without the parameter pass through.
pub async fn resolve_user(
    State(guard): State<UserGuard>,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(id) = params.get(USER_PARAM).filter(|id| !id.is_empty()) {
        let mut ctx = request
            .extensions_mut()
            .remove::<RequestContext>()
            .unwrap_or_default();
        guard.gate.get_user(&mut ctx, id, guard.options).await?;
        request.extensions_mut().insert(ctx);
    }
    Ok(next.run(request).await)
}
