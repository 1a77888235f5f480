//! Actor resolution and admin-only role / grade assignment

use std::sync::Arc;

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        actor::{UpdateGrade, UpdateRoles},
        Actor, RoleSet,
    },
    repository::ActorStore,
    workflow::{Action, AuditEvent, ResourceContext},
};

use super::{admin_roles, CallContext, Guard};

#[derive(Clone)]
pub struct ActorsService {
    store: Arc<dyn ActorStore>,
    guard: Guard,
}

impl ActorsService {
    pub fn new(store: Arc<dyn ActorStore>, guard: Guard) -> Self {
        Self { store, guard }
    }

    /// Active actor behind a verified token
    pub async fn resolve(&self, actor_id: i32) -> AppResult<Option<Actor>> {
        Ok(self
            .store
            .get_actor(actor_id)
            .await?
            .filter(Actor::is_active))
    }

    /// The calling actor
    pub async fn me(&self, ctx: &CallContext<'_>) -> AppResult<Actor> {
        let actor = self.guard.admit(ctx)?;
        Ok(actor.clone())
    }

    /// Replace an actor's role set (Admin only)
    pub async fn assign_roles(
        &self,
        ctx: &CallContext<'_>,
        actor_id: i32,
        data: UpdateRoles,
    ) -> AppResult<Actor> {
        let admin = self.guard.admit(ctx)?;
        data.validate()?;
        self.guard.authorize(
            admin,
            Action::Update,
            &ResourceContext::new().requiring(admin_roles()),
            ctx.route,
            None,
        )?;

        let roles = RoleSet::from(data.roles.as_slice());
        let actor = self.store.set_roles(actor_id, &roles, admin.id).await?;

        tracing::info!(actor_id, admin_id = admin.id, "Roles changed");
        self.guard.record(AuditEvent::RolesChanged {
            actor_id,
            admin_id: admin.id,
            roles: roles.iter().map(str::to_string).collect(),
        });
        Ok(actor)
    }

    /// Assign or clear an actor's grade (Admin only)
    pub async fn assign_grade(
        &self,
        ctx: &CallContext<'_>,
        actor_id: i32,
        data: UpdateGrade,
    ) -> AppResult<Actor> {
        let admin = self.guard.admit(ctx)?;
        self.guard.authorize(
            admin,
            Action::Update,
            &ResourceContext::new().requiring(admin_roles()),
            ctx.route,
            None,
        )?;

        if let Some(grade_id) = data.grade_id {
            if self.store.get_grade(grade_id).await?.is_none() {
                return Err(AppError::NotFound(format!("Grade {} not found", grade_id)));
            }
        }

        let actor = self.store.set_grade(actor_id, data.grade_id, admin.id).await?;

        tracing::info!(actor_id, admin_id = admin.id, grade_id = ?data.grade_id, "Grade changed");
        self.guard.record(AuditEvent::GradeChanged {
            actor_id,
            admin_id: admin.id,
            grade_id: data.grade_id,
        });
        Ok(actor)
    }
}
