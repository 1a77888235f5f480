//! Repository layer for database operations.
//!
//! The services talk to persistence through the store traits below. Every
//! write takes the acting actor's id explicitly and stamps it on the record.

pub mod actors;
pub mod memory;
pub mod requests;
pub mod settings;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        request::{CreateRequest, RequestQuery},
        Actor, ApprovalEntry, Grade, IssuedItem, LoanTransaction, RequestStatus, ResourceRequest,
        RoleSet,
    },
};

pub use memory::MemoryStore;

/// Conditional status update: applied only while the stored status still equals `expected`
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub request_id: i32,
    pub expected: RequestStatus,
    pub next: RequestStatus,
    pub stamped_by: i32,
    pub at: DateTime<Utc>,
    /// Appended to the approval trail in the same write
    pub trail_entry: Option<ApprovalEntry>,
    /// Record `stamped_by` as the support-stage endorser
    pub endorsement: bool,
}

impl StatusChange {
    pub fn new(request_id: i32, expected: RequestStatus, next: RequestStatus, stamped_by: i32) -> Self {
        Self {
            request_id,
            expected,
            next,
            stamped_by,
            at: Utc::now(),
            trail_entry: None,
            endorsement: false,
        }
    }

    pub fn with_trail_entry(mut self, entry: ApprovalEntry) -> Self {
        self.at = entry.decided_at;
        self.trail_entry = Some(entry);
        self
    }

    pub fn as_endorsement(mut self) -> Self {
        self.endorsement = true;
        self
    }

    /// Mirror the write onto an already loaded request
    pub fn apply_to(&self, request: &mut ResourceRequest) {
        request.status = self.next;
        request.updated_at = Some(self.at);
        request.updated_by = Some(self.stamped_by);
        if self.endorsement {
            request.endorsed_by = Some(self.stamped_by);
            request.endorsed_at = Some(self.at);
        }
        if let Some(entry) = &self.trail_entry {
            request.trail.push(entry.clone());
        }
    }
}

/// Identity and role store
#[async_trait]
pub trait ActorStore: Send + Sync {
    async fn get_actor(&self, id: i32) -> AppResult<Option<Actor>>;
    async fn get_grade(&self, id: i32) -> AppResult<Option<Grade>>;
    async fn set_roles(&self, actor_id: i32, roles: &RoleSet, stamped_by: i32) -> AppResult<Actor>;
    async fn set_grade(&self, actor_id: i32, grade_id: Option<i32>, stamped_by: i32) -> AppResult<Actor>;
}

/// Resource requests, approval trail and loan transactions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert_request(&self, data: CreateRequest, requester_id: i32) -> AppResult<ResourceRequest>;
    /// Request with its trail; soft-deleted requests are returned too
    async fn get_request(&self, id: i32) -> AppResult<Option<ResourceRequest>>;
    async fn list_requests(&self, query: &RequestQuery) -> AppResult<Vec<ResourceRequest>>;
    /// Save draft fields; false when the request is no longer a draft
    async fn update_draft(&self, request: &ResourceRequest, stamped_by: i32) -> AppResult<bool>;
    /// Soft delete; false when the request is no longer a draft
    async fn soft_delete(&self, id: i32, stamped_by: i32) -> AppResult<bool>;
    /// Compare-and-swap on status; false when another write got there first
    async fn change_status(&self, change: &StatusChange) -> AppResult<bool>;
    async fn list_transactions(&self, request_id: i32) -> AppResult<Vec<LoanTransaction>>;
    /// Status change plus a new hand-over record. `None` when the status
    /// check fails or another hand-over was recorded since `known_transactions`
    /// were read.
    async fn record_issuance(
        &self,
        change: &StatusChange,
        known_transactions: usize,
        items: Vec<IssuedItem>,
        due_date: Option<DateTime<Utc>>,
    ) -> AppResult<Option<LoanTransaction>>;
    /// Status change plus the updated hand-over record. The record's
    /// `updated_at` must still match the stored one, and once it is saved
    /// the request must have exactly `outstanding_after` units still out
    /// across all of its hand-overs. The check runs under the request lock.
    async fn record_return(
        &self,
        change: &StatusChange,
        transaction: &LoanTransaction,
        outstanding_after: usize,
    ) -> AppResult<bool>;
}

/// System-wide settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn maintenance_enabled(&self) -> AppResult<bool>;
    async fn set_maintenance_enabled(&self, enabled: bool, stamped_by: i32) -> AppResult<()>;
}

/// PostgreSQL-backed repository holding the connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}
