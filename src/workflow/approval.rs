//! Approval decisions on requests waiting at `pending_approval`

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::{Actor, ApprovalEntry, Decision, RequestStatus, ResourceRequest};

use super::{
    error::WorkflowError,
    policy::{AccessPolicy, Action, PolicyDecision, ResourceContext},
    state_machine::{self, Outcome, Transition},
};

/// A decision accepted by the orchestrator, ready to be persisted with a
/// conditional status update.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRecord {
    pub entry: ApprovalEntry,
    pub outcome: Outcome,
}

impl DecisionRecord {
    /// The request as it looks once the decision is applied
    pub fn applied_to(&self, request: &ResourceRequest) -> ResourceRequest {
        let mut updated = request.clone();
        updated.trail.push(self.entry.clone());
        updated.status = self.outcome.to;
        updated.updated_at = Some(self.entry.decided_at);
        updated.updated_by = Some(self.entry.approver_id);
        updated
    }
}

/// Decides who may approve and what a decision does to the request
#[derive(Clone)]
pub struct ApprovalWorkflow {
    policy: Arc<dyn AccessPolicy>,
    min_approver_grade_level: i32,
}

impl ApprovalWorkflow {
    pub fn new(policy: Arc<dyn AccessPolicy>, min_approver_grade_level: i32) -> Self {
        Self {
            policy,
            min_approver_grade_level,
        }
    }

    pub fn min_approver_grade_level(&self) -> i32 {
        self.min_approver_grade_level
    }

    fn approver_context(&self) -> ResourceContext {
        ResourceContext::new().grade_gated(self.min_approver_grade_level)
    }

    fn check_approver(&self, actor: &Actor) -> Result<(), WorkflowError> {
        match self
            .policy
            .evaluate(actor, Action::Approve, &self.approver_context())
        {
            PolicyDecision::Allow => Ok(()),
            PolicyDecision::Deny(reason) => Err(reason.into()),
        }
    }

    /// Whether `actor` qualifies as an approver for `request`
    pub fn can_approve(&self, actor: &Actor, _request: &ResourceRequest) -> bool {
        self.check_approver(actor).is_ok()
    }

    /// Validate a decision and build the trail entry and status change.
    ///
    /// A request already moved past `pending_approval` by a decision reports
    /// `AlreadyDecided` regardless of who asks; the trail is not touched.
    pub fn record_decision(
        &self,
        actor: &Actor,
        request: &ResourceRequest,
        decision: Decision,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DecisionRecord, WorkflowError> {
        if request.status.is_decided() {
            return Err(WorkflowError::AlreadyDecided);
        }
        if request.status != RequestStatus::PendingApproval {
            return Err(WorkflowError::InvalidTransition {
                from: request.status,
                attempted: Transition::Decide(decision).name(),
                reason: "not_awaiting_decision",
            });
        }

        self.check_approver(actor)?;

        let outcome = state_machine::apply(request, Transition::Decide(decision))?;
        let entry = ApprovalEntry {
            approver_id: actor.id,
            decision,
            decided_at: now,
            comment: comment.filter(|c| !c.trim().is_empty()),
        };

        Ok(DecisionRecord { entry, outcome })
    }
}
