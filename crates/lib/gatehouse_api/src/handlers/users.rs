//! User lookup endpoints.

use axum::{Extension, Json};
use gatehouse_core::gate::RequestContext;
use gatehouse_core::models::auth::User;

use crate::error::{AppError, AppResult};

/// `GET /me` — the authenticated token's user.
pub async fn me(Extension(ctx): Extension<RequestContext>) -> AppResult<Json<User>> {
    ctx.token_user()
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::Unauthorized("Token not found".into()))
}

/// `GET /users/{user}` — the user resolved by the user middleware.
pub async fn get_user(Extension(ctx): Extension<RequestContext>) -> AppResult<Json<User>> {
    ctx.user
        .map(|user| Json(User::clone(&user)))
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}
