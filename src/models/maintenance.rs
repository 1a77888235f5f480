//! Maintenance mode state

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::actor::RoleSet;

/// Process-wide maintenance flag with the roles allowed through while it is on.
///
/// Built fresh for every invocation from the settings store and configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MaintenanceState {
    pub enabled: bool,
    #[schema(value_type = Vec<String>)]
    pub bypass_roles: RoleSet,
}

impl MaintenanceState {
    pub fn off() -> Self {
        Self::default()
    }

    pub fn on(bypass_roles: RoleSet) -> Self {
        Self {
            enabled: true,
            bypass_roles,
        }
    }
}
