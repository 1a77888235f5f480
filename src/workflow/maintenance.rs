//! Maintenance gate, evaluated before any other check

use crate::models::{Actor, MaintenanceState};

use super::{audit::AuditEvent, policy::ResourceContext};

/// Whether the maintenance gate stops this actor.
///
/// Only authenticated actors holding one of the bypass roles get through
/// while maintenance is on.
pub fn is_blocked(actor: Option<&Actor>, state: &MaintenanceState) -> bool {
    if !state.enabled {
        return false;
    }
    match actor {
        Some(actor) => !actor.roles.intersects(&state.bypass_roles),
        None => true,
    }
}

/// Denial event for a blocked call, or `None` when the call may proceed
pub fn denial(actor: Option<&Actor>, state: &MaintenanceState, route: &str) -> Option<AuditEvent> {
    is_blocked(actor, state).then(|| AuditEvent::MaintenanceDenied {
        actor: actor
            .map(|a| a.id.to_string())
            .unwrap_or_else(|| "unauthenticated".to_string()),
        route: route.to_string(),
    })
}

/// Context for the `BypassMaintenance` action
pub fn bypass_context(state: &MaintenanceState) -> ResourceContext {
    ResourceContext::new().requiring(state.bypass_roles.clone())
}
