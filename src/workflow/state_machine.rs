//! Resource request lifecycle.
//!
//! Loan path:
//!
//! ```text
//! draft -> pending_support -> pending_approval -> approved -> partially_issued -> issued
//!                                              \-> rejected        issued/partially_* -> partially_returned | overdue | returned
//! ```
//!
//! A loan only reaches `returned` once every requested unit has been handed
//! over and brought back. Units still to be issued may go out from
//! `partially_returned`.
//!
//! Email path:
//!
//! ```text
//! draft -> pending_support -> pending_approval -> approved -> completed
//!                                                         \-> provision_failed -(retry)-> approved
//! ```
//!
//! `draft`, `pending_support` and `pending_approval` may be cancelled.
//! `rejected` and `cancelled` reopen to `draft` only through an admin restore.
//!
//! The machine computes the next status; it never writes anything.

use std::collections::BTreeMap;

use crate::models::{Decision, LineItem, RequestKind, RequestStatus, ResourceRequest};

use super::error::WorkflowError;

/// Event applied to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Submit,
    Endorse,
    Decide(Decision),
    /// Cumulative number of units handed over, this hand-over included
    Issue { issued_total: i64 },
    /// `all_returned`: no unit is out; `fully_issued`: every requested unit was handed over
    Return {
        all_returned: bool,
        fully_issued: bool,
        is_overdue: bool,
    },
    MarkOverdue { is_overdue: bool },
    Cancel,
    Restore,
    ProvisionSucceeded,
    ProvisionFailed,
    RetryProvisioning,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Submit => "submit",
            Transition::Endorse => "endorse",
            Transition::Decide(Decision::Approve) => "approve",
            Transition::Decide(Decision::Reject) => "reject",
            Transition::Issue { .. } => "issue",
            Transition::Return { .. } => "return",
            Transition::MarkOverdue { .. } => "mark_overdue",
            Transition::Cancel => "cancel",
            Transition::Restore => "restore",
            Transition::ProvisionSucceeded => "complete_provisioning",
            Transition::ProvisionFailed => "fail_provisioning",
            Transition::RetryProvisioning => "retry_provisioning",
        }
    }
}

/// Work the caller must perform after persisting the new status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Hand the approved email application to the provisioning collaborator
    RequestProvisioning,
}

/// Result of a valid transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub effect: Option<Effect>,
}

/// Compute the status reached by applying `transition` to `request`
pub fn apply(request: &ResourceRequest, transition: Transition) -> Result<Outcome, WorkflowError> {
    use RequestStatus::*;

    let from = request.status;
    let invalid = |reason: &'static str| WorkflowError::InvalidTransition {
        from,
        attempted: transition.name(),
        reason,
    };
    let require_kind = |kind: RequestKind| {
        if request.kind == kind {
            Ok(())
        } else {
            Err(invalid("wrong_request_kind"))
        }
    };

    let to = match (transition, from) {
        (Transition::Submit, Draft) => {
            check_submittable(request).map_err(|reason| invalid(reason))?;
            PendingSupport
        }
        (Transition::Endorse, PendingSupport) => PendingApproval,
        (Transition::Decide(Decision::Approve), PendingApproval) => Approved,
        (Transition::Decide(Decision::Reject), PendingApproval) => Rejected,

        (Transition::Issue { issued_total }, Approved | PartiallyIssued | PartiallyReturned) => {
            require_kind(RequestKind::Loan)?;
            let requested = request.requested_quantity();
            if issued_total <= 0 {
                return Err(invalid("nothing_issued"));
            }
            if issued_total > requested {
                return Err(invalid("exceeds_requested_quantity"));
            }
            if from == PartiallyReturned {
                PartiallyReturned
            } else if issued_total < requested {
                PartiallyIssued
            } else {
                Issued
            }
        }
        (
            Transition::Return {
                all_returned,
                fully_issued,
                is_overdue,
            },
            Issued | PartiallyIssued | PartiallyReturned | Overdue,
        ) => {
            require_kind(RequestKind::Loan)?;
            if all_returned && fully_issued {
                Returned
            } else if is_overdue {
                Overdue
            } else {
                PartiallyReturned
            }
        }
        (Transition::MarkOverdue { is_overdue }, Issued | PartiallyIssued | PartiallyReturned) => {
            require_kind(RequestKind::Loan)?;
            if !is_overdue {
                return Err(invalid("not_overdue"));
            }
            Overdue
        }

        (Transition::Cancel, Draft | PendingSupport | PendingApproval) => Cancelled,
        (Transition::Restore, Rejected | Cancelled) => Draft,

        (Transition::ProvisionSucceeded, Approved) => {
            require_kind(RequestKind::EmailAccount)?;
            Completed
        }
        (Transition::ProvisionFailed, Approved) => {
            require_kind(RequestKind::EmailAccount)?;
            ProvisionFailed
        }
        (Transition::RetryProvisioning, ProvisionFailed) => {
            require_kind(RequestKind::EmailAccount)?;
            Approved
        }

        (_, status) if status.is_terminal() => return Err(invalid("terminal_state")),
        _ => return Err(invalid("not_allowed_from_status")),
    };

    let effect = (to == Approved && request.kind == RequestKind::EmailAccount)
        .then_some(Effect::RequestProvisioning);

    Ok(Outcome { from, to, effect })
}

/// Issue guard: every unit handed over so far, plus the new ones, must fill
/// a requested equipment line of the same type
pub fn check_issue_lines<'a>(
    request: &ResourceRequest,
    issued_types: impl IntoIterator<Item = &'a str>,
) -> Result<(), WorkflowError> {
    let mut open: BTreeMap<String, i64> = BTreeMap::new();
    for item in &request.items {
        if let LineItem::Equipment {
            equipment_type,
            quantity,
            ..
        } = item
        {
            *open.entry(equipment_key(equipment_type)).or_default() += i64::from(*quantity);
        }
    }

    for equipment_type in issued_types {
        match open.get_mut(&equipment_key(equipment_type)) {
            Some(left) if *left > 0 => *left -= 1,
            _ => {
                return Err(WorkflowError::InvalidTransition {
                    from: request.status,
                    attempted: "issue",
                    reason: "equipment_type_not_requested",
                })
            }
        }
    }
    Ok(())
}

fn equipment_key(equipment_type: &str) -> String {
    equipment_type.trim().to_lowercase()
}

/// Submission guard: required fields present and at least one complete line item
fn check_submittable(request: &ResourceRequest) -> Result<(), &'static str> {
    if request
        .purpose
        .as_deref()
        .map(|p| p.trim().is_empty())
        .unwrap_or(true)
    {
        return Err("missing_purpose");
    }
    if request.items.is_empty() {
        return Err("no_line_items");
    }
    if request.items.iter().any(|item| item.kind() != request.kind) {
        return Err("line_item_kind_mismatch");
    }
    if !request.items.iter().all(|item| item.is_complete()) {
        return Err("incomplete_line_item");
    }
    if request.kind == RequestKind::Loan && request.due_date.is_none() {
        return Err("missing_due_date");
    }
    Ok(())
}
