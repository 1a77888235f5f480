//! Settings service: maintenance mode

use std::sync::Arc;

use crate::{
    config::MaintenanceConfig,
    error::AppResult,
    models::MaintenanceState,
    repository::SettingsStore,
    workflow::{maintenance, Action, AuditEvent, ResourceContext},
};

use super::{admin_roles, CallContext, Guard};

#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
    guard: Guard,
    config: MaintenanceConfig,
}

impl SettingsService {
    pub fn new(store: Arc<dyn SettingsStore>, guard: Guard, config: MaintenanceConfig) -> Self {
        Self {
            store,
            guard,
            config,
        }
    }

    /// Current maintenance state, read fresh from the store
    pub async fn maintenance_state(&self) -> AppResult<MaintenanceState> {
        let enabled = self.store.maintenance_enabled().await?;
        Ok(MaintenanceState {
            enabled,
            bypass_roles: self.config.bypass_roles(),
        })
    }

    /// Maintenance state as seen by a bypass-role holder
    pub async fn maintenance_status(&self, ctx: &CallContext<'_>) -> AppResult<MaintenanceState> {
        let actor = self.guard.admit(ctx)?;
        self.guard.authorize(
            actor,
            Action::BypassMaintenance,
            &maintenance::bypass_context(ctx.maintenance),
            ctx.route,
            None,
        )?;
        Ok(ctx.maintenance.clone())
    }

    /// Turn maintenance mode on or off (Admin only)
    pub async fn set_maintenance(
        &self,
        ctx: &CallContext<'_>,
        enabled: bool,
    ) -> AppResult<MaintenanceState> {
        let admin = self.guard.admit(ctx)?;
        self.guard.authorize(
            admin,
            Action::Update,
            &ResourceContext::new().requiring(admin_roles()),
            ctx.route,
            None,
        )?;

        self.store.set_maintenance_enabled(enabled, admin.id).await?;

        tracing::warn!(admin_id = admin.id, enabled, "Maintenance mode changed");
        self.guard.record(AuditEvent::MaintenanceToggled {
            admin_id: admin.id,
            enabled,
        });

        Ok(MaintenanceState {
            enabled,
            bypass_roles: self.config.bypass_roles(),
        })
    }
}
