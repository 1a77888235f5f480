//! Maintenance mode endpoints

use axum::{extract::State, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{error::AppResult, models::MaintenanceState, AppState};

use super::Caller;

/// Maintenance toggle request
#[derive(Deserialize, ToSchema)]
pub struct UpdateMaintenance {
    pub enabled: bool,
}

/// Get maintenance state (bypass roles only)
#[utoipa::path(
    get,
    path = "/maintenance",
    tag = "maintenance",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Maintenance state", body = MaintenanceState),
        (status = 403, description = "Not a bypass role", body = crate::error::ErrorResponse),
        (status = 503, description = "Maintenance mode", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_maintenance(
    State(state): State<AppState>,
    caller: Caller,
) -> AppResult<Json<MaintenanceState>> {
    let status = state.services.settings.maintenance_status(&caller.ctx()).await?;
    Ok(Json(status))
}

/// Turn maintenance mode on or off (Admin only)
#[utoipa::path(
    put,
    path = "/maintenance",
    tag = "maintenance",
    security(("bearer_auth" = [])),
    request_body = UpdateMaintenance,
    responses(
        (status = 200, description = "Maintenance state updated", body = MaintenanceState),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse),
        (status = 503, description = "Maintenance mode", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_maintenance(
    State(state): State<AppState>,
    caller: Caller,
    Json(data): Json<UpdateMaintenance>,
) -> AppResult<Json<MaintenanceState>> {
    let updated = state
        .services
        .settings
        .set_maintenance(&caller.ctx(), data.enabled)
        .await?;
    Ok(Json(updated))
}
