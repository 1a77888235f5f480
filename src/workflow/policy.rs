//! Access policy evaluation.
//!
//! `evaluate` is a pure decision over pre-loaded data. Rules are checked in
//! order and the first match wins:
//!
//! 1. actor holds `Admin` → allow
//! 2. grade-gated and actor has no grade → `no_grade_assigned`
//! 3. grade-gated and grade level below the requirement → `insufficient_grade`
//! 4. role requirement and no required role held → `role_mismatch`
//! 5. ownership-scoped, actor is not the owner and holds no overriding role → `not_owner`
//! 6. allow
//!
//! A role requirement is satisfied by any single matching role; a grade
//! requirement and a role requirement must both hold.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Actor, RoleSet};

/// Closed set of actions subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    ViewAny,
    Create,
    Update,
    Delete,
    Approve,
    Issue,
    Return,
    BypassMaintenance,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ViewAny => "view_any",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Approve => "approve",
            Action::Issue => "issue",
            Action::Return => "return",
            Action::BypassMaintenance => "bypass_maintenance",
        }
    }

    /// Actions whose permission can depend on owning the resource.
    /// Approving, issuing and returning are never granted by ownership.
    pub fn is_ownership_scoped(&self) -> bool {
        matches!(
            self,
            Action::ViewAny | Action::Create | Action::Update | Action::Delete
        )
    }
}

/// What the evaluator needs to know about the target resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceContext {
    /// Owner of the resource, when the action is limited to its owner
    pub owner_id: Option<i32>,
    /// Minimum grade level, when the action is grade-gated
    pub required_level: Option<i32>,
    /// Roles of which at least one must be held; empty means no requirement
    pub required_roles: RoleSet,
    /// Roles that lift the ownership restriction
    pub overriding_roles: RoleSet,
}

impl ResourceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owned_by(mut self, owner_id: i32) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn grade_gated(mut self, required_level: i32) -> Self {
        self.required_level = Some(required_level);
        self
    }

    pub fn requiring(mut self, roles: RoleSet) -> Self {
        self.required_roles = roles;
        self
    }

    pub fn overridden_by(mut self, roles: RoleSet) -> Self {
        self.overriding_roles = roles;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NoGradeAssigned,
    InsufficientGrade,
    RoleMismatch,
    NotOwner,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NoGradeAssigned => "no_grade_assigned",
            DenyReason::InsufficientGrade => "insufficient_grade",
            DenyReason::RoleMismatch => "role_mismatch",
            DenyReason::NotOwner => "not_owner",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny(DenyReason),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }
}

/// Decide whether `actor` may perform `action` on the described resource
pub fn evaluate(actor: &Actor, action: Action, context: &ResourceContext) -> PolicyDecision {
    if actor.is_admin() {
        return PolicyDecision::Allow;
    }

    if let Some(required_level) = context.required_level {
        match &actor.grade {
            None => return PolicyDecision::Deny(DenyReason::NoGradeAssigned),
            Some(grade) if !grade.meets(required_level) => {
                return PolicyDecision::Deny(DenyReason::InsufficientGrade)
            }
            Some(_) => {}
        }
    }

    if !context.required_roles.is_empty() && !actor.roles.intersects(&context.required_roles) {
        return PolicyDecision::Deny(DenyReason::RoleMismatch);
    }

    if action.is_ownership_scoped() {
        if let Some(owner_id) = context.owner_id {
            if owner_id != actor.id && !actor.roles.intersects(&context.overriding_roles) {
                return PolicyDecision::Deny(DenyReason::NotOwner);
            }
        }
    }

    PolicyDecision::Allow
}

/// Seam for substituting the evaluator (spies in tests, alternative rule sets)
#[cfg_attr(test, mockall::automock)]
pub trait AccessPolicy: Send + Sync {
    fn evaluate(&self, actor: &Actor, action: Action, context: &ResourceContext) -> PolicyDecision;
}

/// Role and grade based policy
#[derive(Debug, Clone, Copy, Default)]
pub struct RbacPolicy;

impl AccessPolicy for RbacPolicy {
    fn evaluate(&self, actor: &Actor, action: Action, context: &ResourceContext) -> PolicyDecision {
        evaluate(actor, action, context)
    }
}
