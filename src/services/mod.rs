//! Business logic services
//!
//! Every operation runs the same sequence: maintenance gate, authentication,
//! load, access policy, state machine, conditional write, audit event.

pub mod actors;
pub mod email;
pub mod provisioning;
pub mod requests;
pub mod settings;

use std::sync::Arc;

use crate::{
    config::{MaintenanceConfig, WorkflowConfig},
    models::{Actor, MaintenanceState, RoleSet, ADMIN_ROLE},
    repository::{ActorStore, RequestStore, SettingsStore},
    workflow::{
        maintenance, AccessPolicy, Action, AuditEvent, AuditSink, PolicyDecision, ResourceContext,
        WorkflowError,
    },
};

use provisioning::Provisioner;

/// Per-invocation context handed to every service operation
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    /// Resolved caller, `None` when no valid credentials were presented
    pub actor: Option<&'a Actor>,
    /// Maintenance state read for this invocation
    pub maintenance: &'a MaintenanceState,
    /// Route label used in audit events, e.g. "POST /requests/{id}/submit"
    pub route: &'a str,
}

impl<'a> CallContext<'a> {
    pub fn new(actor: Option<&'a Actor>, maintenance: &'a MaintenanceState, route: &'a str) -> Self {
        Self {
            actor,
            maintenance,
            route,
        }
    }
}

/// External collaborators the services are built on
#[derive(Clone)]
pub struct Collaborators {
    pub actors: Arc<dyn ActorStore>,
    pub requests: Arc<dyn RequestStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub provisioner: Arc<dyn Provisioner>,
    pub audit: Arc<dyn AuditSink>,
    pub policy: Arc<dyn AccessPolicy>,
}

/// Maintenance gate, authentication and policy checks shared by all services
#[derive(Clone)]
pub struct Guard {
    policy: Arc<dyn AccessPolicy>,
    audit: Arc<dyn AuditSink>,
}

impl Guard {
    pub fn new(policy: Arc<dyn AccessPolicy>, audit: Arc<dyn AuditSink>) -> Self {
        Self { policy, audit }
    }

    /// Maintenance gate first, then require an authenticated actor
    pub fn admit<'a>(&self, ctx: &CallContext<'a>) -> Result<&'a Actor, WorkflowError> {
        if let Some(event) = maintenance::denial(ctx.actor, ctx.maintenance, ctx.route) {
            self.audit.record(&event);
            return Err(WorkflowError::MaintenanceBlocked);
        }
        ctx.actor.ok_or(WorkflowError::NotAuthenticated)
    }

    /// Policy check; denials are audited
    pub fn authorize(
        &self,
        actor: &Actor,
        action: Action,
        context: &ResourceContext,
        route: &str,
        request_id: Option<i32>,
    ) -> Result<(), WorkflowError> {
        match self.policy.evaluate(actor, action, context) {
            PolicyDecision::Allow => Ok(()),
            PolicyDecision::Deny(reason) => {
                self.audit.record(&AuditEvent::AccessDenied {
                    actor_id: actor.id,
                    action,
                    reason: reason.as_str(),
                    route: route.to_string(),
                    request_id,
                });
                Err(reason.into())
            }
        }
    }

    /// Policy check used for scoping; not audited
    pub fn permits(&self, actor: &Actor, action: Action, context: &ResourceContext) -> bool {
        self.policy.evaluate(actor, action, context).is_allowed()
    }

    pub fn record(&self, event: AuditEvent) {
        self.audit.record(&event);
    }
}

/// Roles required by admin-only operations
pub fn admin_roles() -> RoleSet {
    RoleSet::from_iter([ADMIN_ROLE])
}

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub actors: actors::ActorsService,
    pub requests: requests::RequestsService,
    pub settings: settings::SettingsService,
}

impl Services {
    /// Create all services on top of the given collaborators
    pub fn new(
        collaborators: Collaborators,
        workflow_config: WorkflowConfig,
        maintenance_config: MaintenanceConfig,
    ) -> Self {
        let guard = Guard::new(collaborators.policy.clone(), collaborators.audit.clone());

        Self {
            actors: actors::ActorsService::new(collaborators.actors.clone(), guard.clone()),
            requests: requests::RequestsService::new(
                collaborators.requests.clone(),
                collaborators.provisioner.clone(),
                collaborators.policy.clone(),
                guard.clone(),
                workflow_config,
            ),
            settings: settings::SettingsService::new(
                collaborators.settings,
                guard,
                maintenance_config,
            ),
        }
    }
}
