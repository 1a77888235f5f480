//! Typed outcomes of the workflow core

use thiserror::Error;

use crate::models::RequestStatus;

use super::policy::DenyReason;

/// Expected, recoverable refusals reported to the caller.
///
/// The transport layer decides status codes and messages; the core only
/// supplies the kind and a machine-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("No grade assigned to actor")]
    NoGradeAssigned,

    #[error("Grade level too low for this action")]
    InsufficientGrade,

    #[error("None of the actor's roles is permitted for this action")]
    RoleMismatch,

    #[error("Only the owner may perform this action")]
    NotOwner,

    #[error("Cannot {attempted} from status {from}: {reason}")]
    InvalidTransition {
        from: RequestStatus,
        attempted: &'static str,
        reason: &'static str,
    },

    #[error("Request has already been decided")]
    AlreadyDecided,

    #[error("System is under maintenance")]
    MaintenanceBlocked,
}

impl WorkflowError {
    /// Machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::NotAuthenticated => "not_authenticated",
            WorkflowError::NoGradeAssigned => "no_grade_assigned",
            WorkflowError::InsufficientGrade => "insufficient_grade",
            WorkflowError::RoleMismatch => "role_mismatch",
            WorkflowError::NotOwner => "not_owner",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
            WorkflowError::AlreadyDecided => "already_decided",
            WorkflowError::MaintenanceBlocked => "maintenance_blocked",
        }
    }

    /// Machine-readable detail, when the kind alone is not enough
    pub fn reason(&self) -> &'static str {
        match self {
            WorkflowError::InvalidTransition { reason, .. } => reason,
            other => other.kind(),
        }
    }

    /// Denials produced by the access policy evaluator
    pub fn is_access_denial(&self) -> bool {
        matches!(
            self,
            WorkflowError::NoGradeAssigned
                | WorkflowError::InsufficientGrade
                | WorkflowError::RoleMismatch
                | WorkflowError::NotOwner
        )
    }
}

impl From<DenyReason> for WorkflowError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::NoGradeAssigned => WorkflowError::NoGradeAssigned,
            DenyReason::InsufficientGrade => WorkflowError::InsufficientGrade,
            DenyReason::RoleMismatch => WorkflowError::RoleMismatch,
            DenyReason::NotOwner => WorkflowError::NotOwner,
        }
    }
}
