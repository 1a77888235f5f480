//! Role and grade assignment endpoints (Admin only)

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{
        actor::{UpdateGrade, UpdateRoles},
        Actor,
    },
    AppState,
};

use super::Caller;

/// Replace an actor's roles
#[utoipa::path(
    put,
    path = "/actors/{id}/roles",
    tag = "actors",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Actor ID")
    ),
    request_body = UpdateRoles,
    responses(
        (status = 200, description = "Roles updated", body = Actor),
        (status = 400, description = "Invalid role list", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse),
        (status = 404, description = "Actor not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_roles(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
    Json(data): Json<UpdateRoles>,
) -> AppResult<Json<Actor>> {
    let actor = state
        .services
        .actors
        .assign_roles(&caller.ctx(), id, data)
        .await?;
    Ok(Json(actor))
}

/// Assign or clear an actor's grade
#[utoipa::path(
    put,
    path = "/actors/{id}/grade",
    tag = "actors",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Actor ID")
    ),
    request_body = UpdateGrade,
    responses(
        (status = 200, description = "Grade updated", body = Actor),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse),
        (status = 404, description = "Actor or grade not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_grade(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
    Json(data): Json<UpdateGrade>,
) -> AppResult<Json<Actor>> {
    let actor = state
        .services
        .actors
        .assign_grade(&caller.ctx(), id, data)
        .await?;
    Ok(Json(actor))
}
