//! Error types for HR Desk server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::workflow::WorkflowError;

/// Numeric error codes carried in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthenticated = 2,
    NotAuthorized = 3,
    DbFailure = 4,
    NotFound = 5,
    BadValue = 6,
    InvalidTransition = 7,
    AlreadyDecided = 8,
    MaintenanceBlocked = 9,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// The workflow refusal behind this error, if any
    pub fn workflow(&self) -> Option<&WorkflowError> {
        match self {
            AppError::Workflow(e) => Some(e),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    /// Machine-readable error kind
    pub error: String,
    /// Machine-readable detail (e.g. the guard that refused a transition)
    pub reason: Option<String>,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, reason) = match &self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthenticated, None),
            AppError::Workflow(e) => {
                let (status, code) = match e {
                    WorkflowError::NotAuthenticated => {
                        (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthenticated)
                    }
                    WorkflowError::NoGradeAssigned
                    | WorkflowError::InsufficientGrade
                    | WorkflowError::RoleMismatch
                    | WorkflowError::NotOwner => (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized),
                    WorkflowError::InvalidTransition { .. } => {
                        (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::InvalidTransition)
                    }
                    WorkflowError::AlreadyDecided => (StatusCode::CONFLICT, ErrorCode::AlreadyDecided),
                    WorkflowError::MaintenanceBlocked => {
                        (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::MaintenanceBlocked)
                    }
                };
                (status, code, Some(e.reason().to_string()))
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NotFound, None),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue, None),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DbFailure, None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure, None)
            }
        };

        let message = match &self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let error = match &self {
            AppError::Workflow(e) => e.kind().to_string(),
            _ => format!("{:?}", code),
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error,
            reason,
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
