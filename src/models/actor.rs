//! Actor (authenticated principal) model and related types

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Role holding a global override on every permission.
pub const ADMIN_ROLE: &str = "Admin";

/// Set of role names held by an actor.
///
/// Role names are compared exactly ("HR" and "hr" are distinct roles).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<String>);

impl RoleSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    /// True when at least one role is held by both sets.
    pub fn intersects(&self, other: &RoleSet) -> bool {
        self.0.intersection(&other.0).next().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.contains(ADMIN_ROLE)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, role: impl Into<String>) -> bool {
        self.0.insert(role.into())
    }

    /// Union of two role sets.
    pub fn union(&self, other: &RoleSet) -> RoleSet {
        RoleSet(self.0.union(&other.0).cloned().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for RoleSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        RoleSet(iter.into_iter().map(Into::into).collect())
    }
}

impl From<&[String]> for RoleSet {
    fn from(roles: &[String]) -> Self {
        roles.iter().cloned().collect()
    }
}

/// Seniority rank. Higher level means more senior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Grade {
    pub id: i32,
    /// Short code, e.g. "G5"
    pub code: String,
    pub level: i32,
}

impl Grade {
    /// Whether this grade satisfies a minimum level requirement
    pub fn meets(&self, required_level: i32) -> bool {
        self.level >= required_level
    }
}

/// Authenticated principal as seen by the workflow core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Actor {
    pub id: i32,
    pub login: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    #[schema(value_type = Vec<String>)]
    pub roles: RoleSet,
    pub grade: Option<Grade>,
    /// Set when the account was retired; retired actors stay referenced by history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Actor {
    pub fn new(id: i32, login: impl Into<String>) -> Self {
        Self {
            id,
            login: login.into(),
            display_name: None,
            email: None,
            roles: RoleSet::new(),
            grade: None,
            deleted_at: None,
        }
    }

    pub fn with_roles<S: Into<String>>(mut self, roles: impl IntoIterator<Item = S>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn with_grade(mut self, grade: Grade) -> Self {
        self.grade = Some(grade);
        self
    }

    pub fn is_admin(&self) -> bool {
        self.roles.is_admin()
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Replace an actor's role set (admin only)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateRoles {
    #[validate(length(min = 1, message = "At least one role is required"))]
    pub roles: Vec<String>,
}

/// Assign or clear an actor's grade (admin only)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateGrade {
    /// Grade id, or null to clear
    pub grade_id: Option<i32>,
}

/// JWT claims issued by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorClaims {
    pub sub: String,
    pub actor_id: i32,
    pub exp: i64,
    pub iat: i64,
}

impl ActorClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}
