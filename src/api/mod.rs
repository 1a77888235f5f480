//! API handlers for HR Desk REST endpoints

pub mod actors;
pub mod auth;
pub mod health;
pub mod maintenance;
pub mod openapi;
pub mod requests;

use axum::{
    async_trait,
    extract::{FromRequestParts, MatchedPath},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::{
    error::AppError,
    models::{Actor, ActorClaims, MaintenanceState},
    services::CallContext,
    AppState,
};

/// Caller of an endpoint: the resolved actor (if any) plus the maintenance
/// state read for this request.
///
/// Missing or invalid credentials do not reject here; the service layer runs
/// the maintenance gate first and reports `not_authenticated` afterwards.
pub struct Caller {
    pub actor: Option<Actor>,
    pub maintenance: MaintenanceState,
    pub route: String,
}

impl Caller {
    pub fn ctx(&self) -> CallContext<'_> {
        CallContext::new(self.actor.as_ref(), &self.maintenance, &self.route)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let route = match parts.extensions.get::<MatchedPath>() {
            Some(path) => format!("{} {}", parts.method, path.as_str()),
            None => format!("{} {}", parts.method, parts.uri.path()),
        };

        let claims = bearer_token(parts).and_then(|token| {
            ActorClaims::from_token(token, &state.config.auth.jwt_secret)
                .map_err(|e| tracing::debug!("Rejected bearer token: {}", e))
                .ok()
        });

        let actor = match claims {
            Some(claims) => state.services.actors.resolve(claims.actor_id).await?,
            None => None,
        };

        let maintenance = state.services.settings.maintenance_state().await?;

        Ok(Caller {
            actor,
            maintenance,
            route,
        })
    }
}
