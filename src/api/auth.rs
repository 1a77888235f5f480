//! Authentication endpoints

use axum::{extract::State, Json};

use crate::{error::AppResult, models::Actor, AppState};

use super::Caller;

/// Get the current actor with roles and grade
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current actor", body = Actor),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 503, description = "Maintenance mode", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(State(state): State<AppState>, caller: Caller) -> AppResult<Json<Actor>> {
    let actor = state.services.actors.me(&caller.ctx()).await?;
    Ok(Json(actor))
}
