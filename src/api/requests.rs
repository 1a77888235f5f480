//! Resource request endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        request::{CreateRequest, RequestQuery, UpdateRequest},
        IssueItems, LoanMovement, ProvisioningReport, RecordDecision, RequestDetails,
        ResourceRequest, ReturnItems,
    },
    AppState,
};

use super::Caller;

/// List requests (all for support roles, own otherwise)
#[utoipa::path(
    get,
    path = "/requests",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(RequestQuery),
    responses(
        (status = 200, description = "Requests visible to the caller", body = Vec<ResourceRequest>),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 503, description = "Maintenance mode", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_requests(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<RequestQuery>,
) -> AppResult<Json<Vec<ResourceRequest>>> {
    let requests = state
        .services
        .requests
        .list_requests(&caller.ctx(), query)
        .await?;
    Ok(Json(requests))
}

/// Create a draft request
#[utoipa::path(
    post,
    path = "/requests",
    tag = "requests",
    security(("bearer_auth" = [])),
    request_body = CreateRequest,
    responses(
        (status = 201, description = "Draft created", body = ResourceRequest),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    caller: Caller,
    Json(data): Json<CreateRequest>,
) -> AppResult<(StatusCode, Json<ResourceRequest>)> {
    let request = state
        .services
        .requests
        .create_request(&caller.ctx(), data)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Get a request with its hand-over records
#[utoipa::path(
    get,
    path = "/requests/{id}",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Request details", body = RequestDetails),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Request not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<Json<RequestDetails>> {
    let details = state.services.requests.get_request(&caller.ctx(), id).await?;
    Ok(Json(details))
}

/// Update a draft
#[utoipa::path(
    put,
    path = "/requests/{id}",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID")
    ),
    request_body = UpdateRequest,
    responses(
        (status = 200, description = "Draft updated", body = ResourceRequest),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Request not found", body = crate::error::ErrorResponse),
        (status = 422, description = "Not a draft", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
    Json(data): Json<UpdateRequest>,
) -> AppResult<Json<ResourceRequest>> {
    let request = state
        .services
        .requests
        .update_request(&caller.ctx(), id, data)
        .await?;
    Ok(Json(request))
}

/// Delete a draft
#[utoipa::path(
    delete,
    path = "/requests/{id}",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID")
    ),
    responses(
        (status = 204, description = "Draft deleted"),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 404, description = "Request not found", body = crate::error::ErrorResponse),
        (status = 422, description = "Not a draft", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.requests.delete_request(&caller.ctx(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Submit a draft for endorsement
#[utoipa::path(
    post,
    path = "/requests/{id}/submit",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Request submitted", body = ResourceRequest),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 422, description = "Request incomplete or not a draft", body = crate::error::ErrorResponse)
    )
)]
pub async fn submit_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<Json<ResourceRequest>> {
    let request = state.services.requests.submit(&caller.ctx(), id).await?;
    Ok(Json(request))
}

/// Endorse a request at the support stage
#[utoipa::path(
    post,
    path = "/requests/{id}/endorse",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Request forwarded to approval", body = ResourceRequest),
        (status = 403, description = "Grade or role requirement not met", body = crate::error::ErrorResponse),
        (status = 422, description = "Not pending support", body = crate::error::ErrorResponse)
    )
)]
pub async fn endorse_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<Json<ResourceRequest>> {
    let request = state.services.requests.endorse(&caller.ctx(), id).await?;
    Ok(Json(request))
}

/// Approve or reject a request
#[utoipa::path(
    post,
    path = "/requests/{id}/decision",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID")
    ),
    request_body = RecordDecision,
    responses(
        (status = 200, description = "Decision recorded", body = ResourceRequest),
        (status = 403, description = "Grade too low or missing", body = crate::error::ErrorResponse),
        (status = 409, description = "Already decided", body = crate::error::ErrorResponse),
        (status = 422, description = "Not awaiting a decision", body = crate::error::ErrorResponse)
    )
)]
pub async fn decide_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
    Json(payload): Json<RecordDecision>,
) -> AppResult<Json<ResourceRequest>> {
    let request = state
        .services
        .requests
        .record_decision(&caller.ctx(), id, payload)
        .await?;
    Ok(Json(request))
}

/// Cancel a request before it is decided
#[utoipa::path(
    post,
    path = "/requests/{id}/cancel",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Request cancelled", body = ResourceRequest),
        (status = 403, description = "Not the owner", body = crate::error::ErrorResponse),
        (status = 422, description = "Already decided or closed", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<Json<ResourceRequest>> {
    let request = state.services.requests.cancel(&caller.ctx(), id).await?;
    Ok(Json(request))
}

/// Restore a rejected or cancelled request to draft (Admin only)
#[utoipa::path(
    post,
    path = "/requests/{id}/restore",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Request restored", body = ResourceRequest),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse),
        (status = 422, description = "Not rejected or cancelled", body = crate::error::ErrorResponse)
    )
)]
pub async fn restore_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<Json<ResourceRequest>> {
    let request = state.services.requests.restore(&caller.ctx(), id).await?;
    Ok(Json(request))
}

/// Hand over units of an approved loan request
#[utoipa::path(
    post,
    path = "/requests/{id}/issue",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID")
    ),
    request_body = IssueItems,
    responses(
        (status = 201, description = "Units handed over", body = LoanMovement),
        (status = 403, description = "Not an issuer", body = crate::error::ErrorResponse),
        (status = 422, description = "Not approved or more than requested", body = crate::error::ErrorResponse)
    )
)]
pub async fn issue_items(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
    Json(payload): Json<IssueItems>,
) -> AppResult<(StatusCode, Json<LoanMovement>)> {
    let movement = state
        .services
        .requests
        .issue_items(&caller.ctx(), id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// Take back units of one hand-over
#[utoipa::path(
    post,
    path = "/requests/{id}/transactions/{transaction_id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID"),
        ("transaction_id" = i32, Path, description = "Loan transaction ID")
    ),
    request_body = ReturnItems,
    responses(
        (status = 200, description = "Units returned", body = LoanMovement),
        (status = 400, description = "Asset tag not outstanding", body = crate::error::ErrorResponse),
        (status = 403, description = "Not an issuer", body = crate::error::ErrorResponse),
        (status = 404, description = "Transaction not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_items(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, transaction_id)): Path<(i32, i32)>,
    Json(payload): Json<ReturnItems>,
) -> AppResult<Json<LoanMovement>> {
    let movement = state
        .services
        .requests
        .return_items(&caller.ctx(), id, transaction_id, payload)
        .await?;
    Ok(Json(movement))
}

/// Report the provisioning outcome of an approved email request
#[utoipa::path(
    post,
    path = "/requests/{id}/provisioning",
    tag = "provisioning",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID")
    ),
    request_body = ProvisioningReport,
    responses(
        (status = 200, description = "Outcome recorded", body = ResourceRequest),
        (status = 403, description = "Not a provisioner", body = crate::error::ErrorResponse),
        (status = 422, description = "Not awaiting provisioning", body = crate::error::ErrorResponse)
    )
)]
pub async fn report_provisioning(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
    Json(report): Json<ProvisioningReport>,
) -> AppResult<Json<ResourceRequest>> {
    let request = state
        .services
        .requests
        .report_provisioning(&caller.ctx(), id, report)
        .await?;
    Ok(Json(request))
}

/// Retry a failed provisioning hand-off
#[utoipa::path(
    post,
    path = "/requests/{id}/provisioning/retry",
    tag = "provisioning",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Handed off again", body = ResourceRequest),
        (status = 403, description = "Not a provisioner", body = crate::error::ErrorResponse),
        (status = 422, description = "Provisioning has not failed", body = crate::error::ErrorResponse)
    )
)]
pub async fn retry_provisioning(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<Json<ResourceRequest>> {
    let request = state
        .services
        .requests
        .retry_provisioning(&caller.ctx(), id)
        .await?;
    Ok(Json(request))
}
