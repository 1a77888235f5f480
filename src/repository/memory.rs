//! In-memory store used by tests and local runs without a database.
//!
//! All state sits behind one async mutex, so each trait call is atomic and
//! the status compare-and-swap behaves like the PostgreSQL implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{ActorStore, RequestStore, SettingsStore, StatusChange};
use crate::{
    error::{AppError, AppResult},
    models::{
        request::{CreateRequest, RequestQuery},
        Actor, Grade, IssuedItem, LoanTransaction, RequestStatus, ResourceRequest, RoleSet,
        TransactionStatus,
    },
};

#[derive(Default)]
struct MemoryState {
    actors: HashMap<i32, Actor>,
    grades: HashMap<i32, Grade>,
    requests: HashMap<i32, ResourceRequest>,
    transactions: HashMap<i32, LoanTransaction>,
    next_request_id: i32,
    next_transaction_id: i32,
    maintenance: bool,
}

impl MemoryState {
    /// Apply a status change if the stored status still matches
    fn apply_status_change(&mut self, change: &StatusChange) -> bool {
        let Some(request) = self.requests.get_mut(&change.request_id) else {
            return false;
        };
        if request.status != change.expected || request.is_deleted() {
            return false;
        }

        change.apply_to(request);
        true
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_grade(&self, grade: Grade) {
        self.state.lock().await.grades.insert(grade.id, grade);
    }

    /// Register an actor; its grade is registered too
    pub async fn add_actor(&self, actor: Actor) {
        let mut state = self.state.lock().await;
        if let Some(grade) = &actor.grade {
            state.grades.insert(grade.id, grade.clone());
        }
        state.actors.insert(actor.id, actor);
    }
}

#[async_trait]
impl ActorStore for MemoryStore {
    async fn get_actor(&self, id: i32) -> AppResult<Option<Actor>> {
        Ok(self.state.lock().await.actors.get(&id).cloned())
    }

    async fn get_grade(&self, id: i32) -> AppResult<Option<Grade>> {
        Ok(self.state.lock().await.grades.get(&id).cloned())
    }

    async fn set_roles(&self, actor_id: i32, roles: &RoleSet, _stamped_by: i32) -> AppResult<Actor> {
        let mut state = self.state.lock().await;
        let actor = state
            .actors
            .get_mut(&actor_id)
            .filter(|a| a.is_active())
            .ok_or_else(|| AppError::NotFound(format!("Actor {} not found", actor_id)))?;
        actor.roles = roles.clone();
        Ok(actor.clone())
    }

    async fn set_grade(&self, actor_id: i32, grade_id: Option<i32>, _stamped_by: i32) -> AppResult<Actor> {
        let mut state = self.state.lock().await;
        let grade = match grade_id {
            Some(id) => Some(
                state
                    .grades
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| AppError::NotFound(format!("Grade {} not found", id)))?,
            ),
            None => None,
        };
        let actor = state
            .actors
            .get_mut(&actor_id)
            .filter(|a| a.is_active())
            .ok_or_else(|| AppError::NotFound(format!("Actor {} not found", actor_id)))?;
        actor.grade = grade;
        Ok(actor.clone())
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn insert_request(&self, data: CreateRequest, requester_id: i32) -> AppResult<ResourceRequest> {
        let mut state = self.state.lock().await;
        state.next_request_id += 1;
        let request = ResourceRequest::draft(state.next_request_id, requester_id, data, Utc::now());
        state.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn get_request(&self, id: i32) -> AppResult<Option<ResourceRequest>> {
        Ok(self.state.lock().await.requests.get(&id).cloned())
    }

    async fn list_requests(&self, query: &RequestQuery) -> AppResult<Vec<ResourceRequest>> {
        let state = self.state.lock().await;
        let mut requests: Vec<ResourceRequest> = state
            .requests
            .values()
            .filter(|r| !r.is_deleted())
            .filter(|r| query.status.map_or(true, |s| r.status == s))
            .filter(|r| query.kind.map_or(true, |k| r.kind == k))
            .filter(|r| query.requester_id.map_or(true, |id| r.requester_id == id))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(requests)
    }

    async fn update_draft(&self, request: &ResourceRequest, stamped_by: i32) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.requests.get_mut(&request.id) {
            Some(stored) if stored.status == RequestStatus::Draft && !stored.is_deleted() => {
                stored.purpose = request.purpose.clone();
                stored.location = request.location.clone();
                stored.due_date = request.due_date;
                stored.items = request.items.clone();
                stored.updated_at = Some(Utc::now());
                stored.updated_by = Some(stamped_by);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn soft_delete(&self, id: i32, stamped_by: i32) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.requests.get_mut(&id) {
            Some(stored) if stored.status == RequestStatus::Draft && !stored.is_deleted() => {
                stored.deleted_at = Some(Utc::now());
                stored.deleted_by = Some(stamped_by);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn change_status(&self, change: &StatusChange) -> AppResult<bool> {
        Ok(self.state.lock().await.apply_status_change(change))
    }

    async fn list_transactions(&self, request_id: i32) -> AppResult<Vec<LoanTransaction>> {
        let state = self.state.lock().await;
        let mut transactions: Vec<LoanTransaction> = state
            .transactions
            .values()
            .filter(|t| t.request_id == request_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.id.cmp(&b.id)));
        Ok(transactions)
    }

    async fn record_issuance(
        &self,
        change: &StatusChange,
        known_transactions: usize,
        items: Vec<IssuedItem>,
        due_date: Option<DateTime<Utc>>,
    ) -> AppResult<Option<LoanTransaction>> {
        let mut state = self.state.lock().await;
        let existing = state
            .transactions
            .values()
            .filter(|t| t.request_id == change.request_id)
            .count();
        if existing != known_transactions || !state.apply_status_change(change) {
            return Ok(None);
        }

        state.next_transaction_id += 1;
        let transaction = LoanTransaction {
            id: state.next_transaction_id,
            request_id: change.request_id,
            items,
            status: TransactionStatus::Issued,
            issued_by: change.stamped_by,
            issued_at: change.at,
            due_date,
            updated_at: None,
            updated_by: None,
        };
        state.transactions.insert(transaction.id, transaction.clone());
        Ok(Some(transaction))
    }

    async fn record_return(
        &self,
        change: &StatusChange,
        transaction: &LoanTransaction,
        outstanding_after: usize,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let unchanged = state
            .transactions
            .get(&transaction.id)
            .map(|stored| {
                stored.request_id == transaction.request_id
                    && stored.updated_at == transaction.updated_at
            })
            .unwrap_or(false);
        if !unchanged {
            return Ok(false);
        }

        let outstanding: usize = state
            .transactions
            .values()
            .filter(|t| t.request_id == change.request_id)
            .map(|t| {
                if t.id == transaction.id {
                    transaction.outstanding()
                } else {
                    t.outstanding()
                }
            })
            .sum();
        if outstanding != outstanding_after || !state.apply_status_change(change) {
            return Ok(false);
        }

        let mut saved = transaction.clone();
        saved.updated_at = Some(change.at);
        saved.updated_by = Some(change.stamped_by);
        state.transactions.insert(saved.id, saved);
        Ok(true)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn maintenance_enabled(&self) -> AppResult<bool> {
        Ok(self.state.lock().await.maintenance)
    }

    async fn set_maintenance_enabled(&self, enabled: bool, _stamped_by: i32) -> AppResult<()> {
        self.state.lock().await.maintenance = enabled;
        Ok(())
    }
}
