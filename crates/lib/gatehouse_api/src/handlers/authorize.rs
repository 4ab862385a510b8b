//! Access decision endpoint.

use axum::extract::State;
use axum::{Extension, Json};
use gatehouse_core::gate::RequestContext;
use gatehouse_core::models::auth::Params;
use gatehouse_core::models::resource::Resource;
use serde::Serialize;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};

/// Granted decision.
#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub params: Params,
}

/// `POST /authorize` — evaluate the authenticated token's scopes for the
/// resource in the body.
pub async fn authorize(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(resource): Json<Resource>,
) -> AppResult<Json<AuthorizeResponse>> {
    let token = ctx
        .token
        .as_ref()
        .ok_or_else(|| AppError::Unauthorized("Token not found".into()))?;
    let params = state.gate.authorize(token, &resource)?;
    info!(
        token_id = %token.id,
        application_id = %resource.application_id,
        action = %resource.action,
        resource_type = %resource.resource_type,
        "access granted"
    );
    Ok(Json(AuthorizeResponse { params }))
}
