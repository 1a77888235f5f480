//! Audit event payloads and sinks

use std::sync::Mutex;

use serde::Serialize;

use crate::models::{Decision, RequestStatus};

use super::policy::Action;

/// Structured audit event produced by the workflow.
///
/// The core builds these; a sink decides where they go.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    MaintenanceDenied {
        /// Actor id, or "unauthenticated"
        actor: String,
        route: String,
    },
    AccessDenied {
        actor_id: i32,
        action: Action,
        reason: &'static str,
        route: String,
        request_id: Option<i32>,
    },
    RequestCreated {
        request_id: i32,
        actor_id: i32,
    },
    Transitioned {
        request_id: i32,
        actor_id: i32,
        transition: &'static str,
        from: RequestStatus,
        to: RequestStatus,
    },
    DecisionRecorded {
        request_id: i32,
        approver_id: i32,
        decision: Decision,
    },
    DecisionRejected {
        request_id: i32,
        approver_id: i32,
        reason: &'static str,
    },
    Restored {
        request_id: i32,
        admin_id: i32,
        from: RequestStatus,
    },
    ProvisioningHandoffFailed {
        request_id: i32,
        error: String,
    },
    RolesChanged {
        actor_id: i32,
        admin_id: i32,
        roles: Vec<String>,
    },
    GradeChanged {
        actor_id: i32,
        admin_id: i32,
        grade_id: Option<i32>,
    },
    MaintenanceToggled {
        admin_id: i32,
        enabled: bool,
    },
}

impl AuditEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuditEvent::MaintenanceDenied { .. } => "maintenance_denied",
            AuditEvent::AccessDenied { .. } => "access_denied",
            AuditEvent::RequestCreated { .. } => "request_created",
            AuditEvent::Transitioned { .. } => "transitioned",
            AuditEvent::DecisionRecorded { .. } => "decision_recorded",
            AuditEvent::DecisionRejected { .. } => "decision_rejected",
            AuditEvent::Restored { .. } => "restored",
            AuditEvent::ProvisioningHandoffFailed { .. } => "provisioning_handoff_failed",
            AuditEvent::RolesChanged { .. } => "roles_changed",
            AuditEvent::GradeChanged { .. } => "grade_changed",
            AuditEvent::MaintenanceToggled { .. } => "maintenance_toggled",
        }
    }

    /// Denials are reported at warning level
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AuditEvent::MaintenanceDenied { .. }
                | AuditEvent::AccessDenied { .. }
                | AuditEvent::DecisionRejected { .. }
                | AuditEvent::ProvisioningHandoffFailed { .. }
        )
    }
}

/// Receiver of audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Emits audit events as `tracing` events on the `audit` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let payload = serde_json::to_string(event).unwrap_or_else(|_| format!("{:?}", event));
        if event.is_denial() {
            tracing::warn!(target: "audit", event = event.name(), %payload);
        } else {
            tracing::info!(target: "audit", event = event.name(), %payload);
        }
    }
}

/// Keeps events in memory, for tests and local inspection
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
