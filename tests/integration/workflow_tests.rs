//! Workflow scenarios run against the in-memory store

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Barrier;

use hrdesk_server::{
    config::{MaintenanceConfig, WorkflowConfig},
    error::{AppError, AppResult},
    models::{
        actor::{UpdateGrade, UpdateRoles},
        request::{CreateRequest, RequestQuery, UpdateRequest},
        request::MAX_LINE_QUANTITY,
        Actor, Decision, Grade, IssueItem, IssueItems, IssuedItem, LineItem, LoanMovement,
        LoanTransaction, MaintenanceState, ProvisioningReport, RecordDecision, RequestKind,
        RequestStatus, ResourceRequest, ReturnItems, TransactionStatus,
    },
    repository::{MemoryStore, RequestStore, SettingsStore, StatusChange},
    services::{provisioning::Provisioner, CallContext, Collaborators, Services},
    workflow::{AuditEvent, MemoryAuditSink, RbacPolicy, WorkflowError},
};

/// Provisioner whose hand-off can be made to fail
#[derive(Default)]
struct FlakyProvisioner {
    failing: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl Provisioner for FlakyProvisioner {
    async fn request_provisioning(&self, _request: &ResourceRequest) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(AppError::Internal("SMTP relay unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Request store whose next two hand-over reads wait for each other, so two
/// callers act on the same snapshot before either one writes
struct LockstepStore {
    inner: Arc<MemoryStore>,
    barrier: Barrier,
    armed: AtomicUsize,
}

impl LockstepStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            barrier: Barrier::new(2),
            armed: AtomicUsize::new(0),
        }
    }

    fn arm(&self) {
        self.armed.store(2, Ordering::SeqCst);
    }
}

#[async_trait]
impl RequestStore for LockstepStore {
    async fn insert_request(&self, data: CreateRequest, requester_id: i32) -> AppResult<ResourceRequest> {
        self.inner.insert_request(data, requester_id).await
    }

    async fn get_request(&self, id: i32) -> AppResult<Option<ResourceRequest>> {
        self.inner.get_request(id).await
    }

    async fn list_requests(&self, query: &RequestQuery) -> AppResult<Vec<ResourceRequest>> {
        self.inner.list_requests(query).await
    }

    async fn update_draft(&self, request: &ResourceRequest, stamped_by: i32) -> AppResult<bool> {
        self.inner.update_draft(request, stamped_by).await
    }

    async fn soft_delete(&self, id: i32, stamped_by: i32) -> AppResult<bool> {
        self.inner.soft_delete(id, stamped_by).await
    }

    async fn change_status(&self, change: &StatusChange) -> AppResult<bool> {
        self.inner.change_status(change).await
    }

    async fn list_transactions(&self, request_id: i32) -> AppResult<Vec<LoanTransaction>> {
        let transactions = self.inner.list_transactions(request_id).await?;
        if self
            .armed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            self.barrier.wait().await;
        }
        Ok(transactions)
    }

    async fn record_issuance(
        &self,
        change: &StatusChange,
        known_transactions: usize,
        items: Vec<IssuedItem>,
        due_date: Option<DateTime<Utc>>,
    ) -> AppResult<Option<LoanTransaction>> {
        self.inner
            .record_issuance(change, known_transactions, items, due_date)
            .await
    }

    async fn record_return(
        &self,
        change: &StatusChange,
        transaction: &LoanTransaction,
        outstanding_after: usize,
    ) -> AppResult<bool> {
        self.inner
            .record_return(change, transaction, outstanding_after)
            .await
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    audit: Arc<MemoryAuditSink>,
    provisioner: Arc<FlakyProvisioner>,
    services: Services,
    maintenance: MaintenanceState,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_requests(store.clone(), store)
    }

    fn with_requests(store: Arc<MemoryStore>, requests: Arc<dyn RequestStore>) -> Self {
        let audit = Arc::new(MemoryAuditSink::new());
        let provisioner = Arc::new(FlakyProvisioner::default());

        let services = Services::new(
            Collaborators {
                actors: store.clone(),
                requests,
                settings: store.clone(),
                provisioner: provisioner.clone(),
                audit: audit.clone(),
                policy: Arc::new(RbacPolicy),
            },
            WorkflowConfig::default(),
            MaintenanceConfig::default(),
        );

        Self {
            store,
            audit,
            provisioner,
            services,
            maintenance: MaintenanceState::off(),
        }
    }

    fn ctx<'a>(&'a self, actor: &'a Actor) -> CallContext<'a> {
        CallContext::new(Some(actor), &self.maintenance, "test")
    }

    async fn status_of(&self, id: i32) -> RequestStatus {
        self.store.get_request(id).await.unwrap().unwrap().status
    }

    /// Loan request walked up to `pending_approval`
    async fn pending_loan(&self, quantity: i32) -> i32 {
        let id = self
            .services
            .requests
            .create_request(&self.ctx(&requester()), loan_draft(quantity))
            .await
            .unwrap()
            .id;
        self.services.requests.submit(&self.ctx(&requester()), id).await.unwrap();
        self.services.requests.endorse(&self.ctx(&endorser()), id).await.unwrap();
        id
    }

    /// Loan request approved by a qualified approver
    async fn approved_loan(&self, quantity: i32, due_in_days: i64) -> i32 {
        let mut data = loan_draft(quantity);
        data.due_date = Some(Utc::now() + Duration::days(due_in_days));
        let id = self
            .services
            .requests
            .create_request(&self.ctx(&requester()), data)
            .await
            .unwrap()
            .id;
        self.services.requests.submit(&self.ctx(&requester()), id).await.unwrap();
        self.services.requests.endorse(&self.ctx(&endorser()), id).await.unwrap();
        self.services
            .requests
            .record_decision(&self.ctx(&approver()), id, decision(Decision::Approve))
            .await
            .unwrap();
        id
    }
}

fn grade(level: i32) -> Grade {
    Grade {
        id: level,
        code: format!("G{}", level),
        level,
    }
}

/// Actor A: plain user without grade
fn requester() -> Actor {
    Actor::new(1, "alice").with_roles(["User"])
}

/// Actor B: HR, grade 3
fn endorser() -> Actor {
    Actor::new(2, "bob").with_roles(["HR"]).with_grade(grade(3))
}

/// Actor C: grade 5
fn approver() -> Actor {
    Actor::new(3, "carol").with_roles(["Manager"]).with_grade(grade(5))
}

/// Actor D / E: grade 4
fn junior_manager(id: i32) -> Actor {
    Actor::new(id, format!("manager{}", id))
        .with_roles(["Manager"])
        .with_grade(grade(4))
}

fn issuer() -> Actor {
    Actor::new(6, "bpm").with_roles(["BPM"])
}

fn provisioner_actor() -> Actor {
    Actor::new(7, "it").with_roles(["IT"])
}

fn admin() -> Actor {
    Actor::new(9, "admin").with_roles(["Admin"])
}

fn loan_draft(quantity: i32) -> CreateRequest {
    CreateRequest {
        kind: RequestKind::Loan,
        purpose: Some("Field training".to_string()),
        location: Some("Building B".to_string()),
        due_date: Some(Utc::now() + Duration::days(14)),
        items: vec![LineItem::Equipment {
            equipment_type: "laptop".to_string(),
            quantity,
            notes: None,
        }],
    }
}

fn email_draft() -> CreateRequest {
    CreateRequest {
        kind: RequestKind::EmailAccount,
        purpose: Some("New hire".to_string()),
        location: None,
        due_date: None,
        items: vec![LineItem::EmailAccount {
            proposed_address: "d.jones@example.org".to_string(),
            display_name: "D. Jones".to_string(),
            group_email: Some("staff@example.org".to_string()),
        }],
    }
}

fn decision(decision: Decision) -> RecordDecision {
    RecordDecision {
        decision,
        comment: None,
    }
}

fn issue(tags: &[&str]) -> IssueItems {
    IssueItems {
        items: tags
            .iter()
            .map(|tag| IssueItem {
                asset_tag: tag.to_string(),
                equipment_type: "laptop".to_string(),
            })
            .collect(),
    }
}

fn give_back(tags: &[&str]) -> ReturnItems {
    ReturnItems {
        asset_tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn reason(err: &AppError) -> Option<&'static str> {
    err.workflow().map(WorkflowError::reason)
}

fn spawn_issue(
    services: &Services,
    id: i32,
    tag: &'static str,
) -> tokio::task::JoinHandle<AppResult<LoanMovement>> {
    let services = services.clone();
    tokio::spawn(async move {
        let maintenance = MaintenanceState::off();
        let actor = issuer();
        let ctx = CallContext::new(Some(&actor), &maintenance, "test");
        services.requests.issue_items(&ctx, id, issue(&[tag])).await
    })
}

fn spawn_return(
    services: &Services,
    id: i32,
    transaction_id: i32,
    tag: &'static str,
) -> tokio::task::JoinHandle<AppResult<LoanMovement>> {
    let services = services.clone();
    tokio::spawn(async move {
        let maintenance = MaintenanceState::off();
        let actor = issuer();
        let ctx = CallContext::new(Some(&actor), &maintenance, "test");
        services
            .requests
            .return_items(&ctx, id, transaction_id, give_back(&[tag]))
            .await
    })
}

#[tokio::test]
async fn test_end_to_end_loan_approval() {
    let h = Harness::new();
    let a = requester();

    let draft = h
        .services
        .requests
        .create_request(&h.ctx(&a), loan_draft(1))
        .await
        .unwrap();
    assert_eq!(draft.status, RequestStatus::Draft);

    let submitted = h.services.requests.submit(&h.ctx(&a), draft.id).await.unwrap();
    assert_eq!(submitted.status, RequestStatus::PendingSupport);

    let endorsed = h
        .services
        .requests
        .endorse(&h.ctx(&endorser()), draft.id)
        .await
        .unwrap();
    assert_eq!(endorsed.status, RequestStatus::PendingApproval);
    assert_eq!(endorsed.endorsed_by, Some(2));

    let approved = h
        .services
        .requests
        .record_decision(&h.ctx(&approver()), draft.id, decision(Decision::Approve))
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(approved.trail.len(), 1);
    assert_eq!(approved.trail[0].approver_id, 3);
    assert_eq!(approved.trail[0].decision, Decision::Approve);

    let err = h
        .services
        .requests
        .record_decision(&h.ctx(&junior_manager(4)), draft.id, decision(Decision::Approve))
        .await
        .unwrap_err();
    assert_eq!(err.workflow(), Some(&WorkflowError::AlreadyDecided));

    let stored = h.store.get_request(draft.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Approved);
    assert_eq!(stored.trail.len(), 1);
}

#[tokio::test]
async fn test_low_grade_approver_refused() {
    let h = Harness::new();
    let id = h.pending_loan(1).await;

    let err = h
        .services
        .requests
        .record_decision(&h.ctx(&junior_manager(5)), id, decision(Decision::Approve))
        .await
        .unwrap_err();

    assert_eq!(err.workflow(), Some(&WorkflowError::InsufficientGrade));
    assert_eq!(h.status_of(id).await, RequestStatus::PendingApproval);
    assert!(h
        .audit
        .events()
        .iter()
        .any(|e| matches!(e, AuditEvent::DecisionRejected { reason: "insufficient_grade", .. })));
}

#[tokio::test]
async fn test_ungraded_actor_cannot_decide() {
    let h = Harness::new();
    let id = h.pending_loan(1).await;

    let err = h
        .services
        .requests
        .record_decision(&h.ctx(&requester()), id, decision(Decision::Reject))
        .await
        .unwrap_err();
    assert_eq!(err.workflow(), Some(&WorkflowError::NoGradeAssigned));
}

#[tokio::test]
async fn test_second_decision_leaves_trail_untouched() {
    let h = Harness::new();
    let id = h.pending_loan(1).await;

    h.services
        .requests
        .record_decision(
            &h.ctx(&approver()),
            id,
            RecordDecision {
                decision: Decision::Reject,
                comment: Some("Budget frozen".to_string()),
            },
        )
        .await
        .unwrap();
    let before = h.store.get_request(id).await.unwrap().unwrap();

    let err = h
        .services
        .requests
        .record_decision(&h.ctx(&approver()), id, decision(Decision::Approve))
        .await
        .unwrap_err();
    assert_eq!(err.workflow(), Some(&WorkflowError::AlreadyDecided));

    let after = h.store.get_request(id).await.unwrap().unwrap();
    assert_eq!(before, after);
    assert_eq!(after.status, RequestStatus::Rejected);
    assert_eq!(after.trail[0].comment.as_deref(), Some("Budget frozen"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_decisions_single_winner() {
    let h = Harness::new();
    let id = h.pending_loan(1).await;

    let approve = {
        let services = h.services.clone();
        tokio::spawn(async move {
            let maintenance = MaintenanceState::off();
            let actor = approver();
            let ctx = CallContext::new(Some(&actor), &maintenance, "test");
            services
                .requests
                .record_decision(&ctx, id, decision(Decision::Approve))
                .await
        })
    };
    let reject = {
        let services = h.services.clone();
        tokio::spawn(async move {
            let maintenance = MaintenanceState::off();
            let actor = Actor::new(8, "dave").with_grade(grade(7));
            let ctx = CallContext::new(Some(&actor), &maintenance, "test");
            services
                .requests
                .record_decision(&ctx, id, decision(Decision::Reject))
                .await
        })
    };

    let (approve, reject) = (approve.await.unwrap(), reject.await.unwrap());
    assert!(approve.is_ok() != reject.is_ok());

    let loser = if approve.is_ok() { reject } else { approve };
    assert_eq!(
        loser.unwrap_err().workflow(),
        Some(&WorkflowError::AlreadyDecided)
    );

    let stored = h.store.get_request(id).await.unwrap().unwrap();
    assert_eq!(stored.trail.len(), 1);
    let expected = match stored.trail[0].decision {
        Decision::Approve => RequestStatus::Approved,
        Decision::Reject => RequestStatus::Rejected,
    };
    assert_eq!(stored.status, expected);
}

#[tokio::test]
async fn test_maintenance_blocks_all_but_bypass_roles() {
    let h = Harness::new();
    let hr = endorser();

    h.services
        .settings
        .set_maintenance(&h.ctx(&admin()), true)
        .await
        .unwrap();
    let maintenance = h.services.settings.maintenance_state().await.unwrap();
    assert!(maintenance.enabled);

    let ctx = CallContext::new(Some(&hr), &maintenance, "GET /requests");
    let err = h
        .services
        .requests
        .list_requests(&ctx, RequestQuery::default())
        .await
        .unwrap_err();
    assert_eq!(err.workflow(), Some(&WorkflowError::MaintenanceBlocked));

    let anonymous = CallContext::new(None, &maintenance, "GET /auth/me");
    let err = h.services.actors.me(&anonymous).await.unwrap_err();
    assert_eq!(err.workflow(), Some(&WorkflowError::MaintenanceBlocked));

    let admin = admin();
    let ctx = CallContext::new(Some(&admin), &maintenance, "GET /maintenance");
    let status = h.services.settings.maintenance_status(&ctx).await.unwrap();
    assert!(status.enabled);

    let denials: Vec<AuditEvent> = h
        .audit
        .events()
        .into_iter()
        .filter(|e| matches!(e, AuditEvent::MaintenanceDenied { .. }))
        .collect();
    assert_eq!(
        denials,
        vec![
            AuditEvent::MaintenanceDenied {
                actor: "2".to_string(),
                route: "GET /requests".to_string(),
            },
            AuditEvent::MaintenanceDenied {
                actor: "unauthenticated".to_string(),
                route: "GET /auth/me".to_string(),
            },
        ]
    );

    h.services
        .settings
        .set_maintenance(&CallContext::new(Some(&admin), &maintenance, "PUT /maintenance"), false)
        .await
        .unwrap();
    assert!(!h.store.maintenance_enabled().await.unwrap());
}

#[tokio::test]
async fn test_maintenance_toggle_requires_admin() {
    let h = Harness::new();
    let err = h
        .services
        .settings
        .set_maintenance(&h.ctx(&endorser()), true)
        .await
        .unwrap_err();
    assert_eq!(err.workflow(), Some(&WorkflowError::RoleMismatch));
    assert!(!h.store.maintenance_enabled().await.unwrap());
}

#[tokio::test]
async fn test_email_provisioning_failure_and_retry() {
    let h = Harness::new();
    let a = requester();
    h.provisioner.failing.store(true, Ordering::SeqCst);

    let id = h
        .services
        .requests
        .create_request(&h.ctx(&a), email_draft())
        .await
        .unwrap()
        .id;
    h.services.requests.submit(&h.ctx(&a), id).await.unwrap();
    h.services.requests.endorse(&h.ctx(&endorser()), id).await.unwrap();

    let decided = h
        .services
        .requests
        .record_decision(&h.ctx(&approver()), id, decision(Decision::Approve))
        .await
        .unwrap();
    assert_eq!(decided.status, RequestStatus::ProvisionFailed);
    assert_eq!(decided.trail.len(), 1);
    assert_eq!(h.status_of(id).await, RequestStatus::ProvisionFailed);
    assert!(h
        .audit
        .events()
        .iter()
        .any(|e| matches!(e, AuditEvent::ProvisioningHandoffFailed { request_id, .. } if *request_id == id)));

    let err = h
        .services
        .requests
        .retry_provisioning(&h.ctx(&issuer()), id)
        .await
        .unwrap_err();
    assert_eq!(err.workflow(), Some(&WorkflowError::RoleMismatch));

    h.provisioner.failing.store(false, Ordering::SeqCst);
    let retried = h
        .services
        .requests
        .retry_provisioning(&h.ctx(&provisioner_actor()), id)
        .await
        .unwrap();
    assert_eq!(retried.status, RequestStatus::Approved);
    assert_eq!(h.provisioner.calls.load(Ordering::SeqCst), 2);

    let done = h
        .services
        .requests
        .report_provisioning(
            &h.ctx(&provisioner_actor()),
            id,
            ProvisioningReport {
                succeeded: true,
                detail: Some("Mailbox created".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(done.status, RequestStatus::Completed);

    let err = h
        .services
        .requests
        .cancel(&h.ctx(&a), id)
        .await
        .unwrap_err();
    assert_eq!(reason(&err), Some("terminal_state"));
}

#[tokio::test]
async fn test_email_request_cannot_be_issued() {
    let h = Harness::new();
    let a = requester();
    let id = h
        .services
        .requests
        .create_request(&h.ctx(&a), email_draft())
        .await
        .unwrap()
        .id;
    h.services.requests.submit(&h.ctx(&a), id).await.unwrap();
    h.services.requests.endorse(&h.ctx(&endorser()), id).await.unwrap();
    h.services
        .requests
        .record_decision(&h.ctx(&approver()), id, decision(Decision::Approve))
        .await
        .unwrap();

    let err = h
        .services
        .requests
        .issue_items(&h.ctx(&issuer()), id, issue(&["LT-1"]))
        .await
        .unwrap_err();
    assert_eq!(reason(&err), Some("wrong_request_kind"));
}

#[tokio::test]
async fn test_partial_then_full_issuance_and_return() {
    let h = Harness::new();
    let bpm = issuer();
    let id = h.approved_loan(2, 14).await;

    let first = h
        .services
        .requests
        .issue_items(&h.ctx(&bpm), id, issue(&["LT-1"]))
        .await
        .unwrap();
    assert_eq!(first.request.status, RequestStatus::PartiallyIssued);
    assert_eq!(first.transaction.status, TransactionStatus::Issued);

    let second = h
        .services
        .requests
        .issue_items(&h.ctx(&bpm), id, issue(&["LT-2"]))
        .await
        .unwrap();
    assert_eq!(second.request.status, RequestStatus::Issued);

    let err = h
        .services
        .requests
        .issue_items(&h.ctx(&bpm), id, issue(&["LT-3"]))
        .await
        .unwrap_err();
    assert_eq!(reason(&err), Some("not_allowed_from_status"));

    let returned = h
        .services
        .requests
        .return_items(&h.ctx(&bpm), id, first.transaction.id, give_back(&["LT-1"]))
        .await
        .unwrap();
    assert_eq!(returned.request.status, RequestStatus::PartiallyReturned);
    assert_eq!(returned.transaction.status, TransactionStatus::Returned);

    let err = h
        .services
        .requests
        .return_items(&h.ctx(&bpm), id, first.transaction.id, give_back(&["LT-1"]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let done = h
        .services
        .requests
        .return_items(&h.ctx(&bpm), id, second.transaction.id, give_back(&["LT-2"]))
        .await
        .unwrap();
    assert_eq!(done.request.status, RequestStatus::Returned);

    let details = h
        .services
        .requests
        .get_request(&h.ctx(&requester()), id)
        .await
        .unwrap();
    assert_eq!(details.transactions.len(), 2);
    assert!(details.transactions.iter().all(|t| t.outstanding() == 0));
}

#[tokio::test]
async fn test_over_issuance_refused() {
    let h = Harness::new();
    let id = h.approved_loan(1, 14).await;

    let err = h
        .services
        .requests
        .issue_items(&h.ctx(&issuer()), id, issue(&["LT-1", "LT-2"]))
        .await
        .unwrap_err();
    assert_eq!(reason(&err), Some("exceeds_requested_quantity"));
    assert_eq!(h.status_of(id).await, RequestStatus::Approved);
}

#[tokio::test]
async fn test_partial_return_past_due_is_overdue() {
    let h = Harness::new();
    let bpm = issuer();
    let id = h.approved_loan(2, -1).await;

    let issued = h
        .services
        .requests
        .issue_items(&h.ctx(&bpm), id, issue(&["LT-1", "LT-2"]))
        .await
        .unwrap();
    assert_eq!(issued.request.status, RequestStatus::Issued);

    let details = h
        .services
        .requests
        .get_request(&h.ctx(&requester()), id)
        .await
        .unwrap();
    assert_eq!(details.request.status, RequestStatus::Overdue);
    assert_eq!(details.transactions[0].status, TransactionStatus::Overdue);
    assert_eq!(h.status_of(id).await, RequestStatus::Issued);

    let partial = h
        .services
        .requests
        .return_items(&h.ctx(&bpm), id, issued.transaction.id, give_back(&["LT-1"]))
        .await
        .unwrap();
    assert_eq!(partial.request.status, RequestStatus::Overdue);
    assert_eq!(h.status_of(id).await, RequestStatus::Overdue);

    let done = h
        .services
        .requests
        .return_items(&h.ctx(&bpm), id, issued.transaction.id, give_back(&["LT-2"]))
        .await
        .unwrap();
    assert_eq!(done.request.status, RequestStatus::Returned);
}

#[tokio::test]
async fn test_issue_requires_issuer_role() {
    let h = Harness::new();
    let id = h.approved_loan(1, 14).await;

    let err = h
        .services
        .requests
        .issue_items(&h.ctx(&endorser()), id, issue(&["LT-1"]))
        .await
        .unwrap_err();
    assert_eq!(err.workflow(), Some(&WorkflowError::RoleMismatch));
    assert!(h.audit.events().iter().any(|e| matches!(
        e,
        AuditEvent::AccessDenied { actor_id: 2, reason: "role_mismatch", .. }
    )));
}

#[tokio::test]
async fn test_restore_is_admin_only() {
    let h = Harness::new();
    let a = requester();
    let id = h
        .services
        .requests
        .create_request(&h.ctx(&a), loan_draft(1))
        .await
        .unwrap()
        .id;
    h.services.requests.submit(&h.ctx(&a), id).await.unwrap();
    let cancelled = h.services.requests.cancel(&h.ctx(&a), id).await.unwrap();
    assert_eq!(cancelled.status, RequestStatus::Cancelled);

    let err = h.services.requests.restore(&h.ctx(&a), id).await.unwrap_err();
    assert_eq!(err.workflow(), Some(&WorkflowError::RoleMismatch));

    let restored = h.services.requests.restore(&h.ctx(&admin()), id).await.unwrap();
    assert_eq!(restored.status, RequestStatus::Draft);
    assert!(h.audit.events().iter().any(|e| matches!(
        e,
        AuditEvent::Restored { admin_id: 9, from: RequestStatus::Cancelled, .. }
    )));

    let err = h.services.requests.restore(&h.ctx(&admin()), id).await.unwrap_err();
    assert_eq!(reason(&err), Some("not_allowed_from_status"));
}

#[tokio::test]
async fn test_drafts_are_owner_only() {
    let h = Harness::new();
    let a = requester();
    let stranger = Actor::new(12, "frank").with_roles(["User"]);

    let id = h
        .services
        .requests
        .create_request(&h.ctx(&a), loan_draft(1))
        .await
        .unwrap()
        .id;

    let edit = UpdateRequest {
        purpose: Some("Conference".to_string()),
        ..Default::default()
    };

    let err = h
        .services
        .requests
        .update_request(&h.ctx(&stranger), id, edit.clone())
        .await
        .unwrap_err();
    assert_eq!(err.workflow(), Some(&WorkflowError::NotOwner));

    let err = h
        .services
        .requests
        .delete_request(&h.ctx(&stranger), id)
        .await
        .unwrap_err();
    assert_eq!(err.workflow(), Some(&WorkflowError::NotOwner));

    let err = h
        .services
        .requests
        .get_request(&h.ctx(&stranger), id)
        .await
        .unwrap_err();
    assert_eq!(err.workflow(), Some(&WorkflowError::NotOwner));

    let updated = h
        .services
        .requests
        .update_request(&h.ctx(&a), id, edit.clone())
        .await
        .unwrap();
    assert_eq!(updated.purpose.as_deref(), Some("Conference"));
    assert_eq!(updated.updated_by, Some(1));

    h.services.requests.submit(&h.ctx(&a), id).await.unwrap();
    let err = h
        .services
        .requests
        .update_request(&h.ctx(&a), id, edit)
        .await
        .unwrap_err();
    assert_eq!(reason(&err), Some("not_a_draft"));

    let second = h
        .services
        .requests
        .create_request(&h.ctx(&a), loan_draft(1))
        .await
        .unwrap()
        .id;
    h.services.requests.delete_request(&h.ctx(&a), second).await.unwrap();
    let err = h
        .services
        .requests
        .get_request(&h.ctx(&a), second)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_incomplete_draft_cannot_be_submitted() {
    let h = Harness::new();
    let a = requester();
    let mut data = loan_draft(1);
    data.items.clear();

    let id = h
        .services
        .requests
        .create_request(&h.ctx(&a), data)
        .await
        .unwrap()
        .id;
    let err = h.services.requests.submit(&h.ctx(&a), id).await.unwrap_err();
    assert_eq!(reason(&err), Some("no_line_items"));
    assert_eq!(h.status_of(id).await, RequestStatus::Draft);
}

#[tokio::test]
async fn test_list_scoped_to_own_requests() {
    let h = Harness::new();
    let a = requester();
    let stranger = Actor::new(12, "frank").with_roles(["User"]);

    h.services
        .requests
        .create_request(&h.ctx(&a), loan_draft(1))
        .await
        .unwrap();
    h.services
        .requests
        .create_request(&h.ctx(&stranger), loan_draft(1))
        .await
        .unwrap();

    let own = h
        .services
        .requests
        .list_requests(&h.ctx(&a), RequestQuery::default())
        .await
        .unwrap();
    assert_eq!(own.len(), 1);
    assert!(own.iter().all(|r| r.requester_id == 1));

    let everything = h
        .services
        .requests
        .list_requests(&h.ctx(&endorser()), RequestQuery::default())
        .await
        .unwrap();
    assert_eq!(everything.len(), 2);
}

#[tokio::test]
async fn test_role_and_grade_assignment_is_admin_only() {
    let h = Harness::new();
    h.store.add_actor(requester()).await;
    h.store.add_grade(grade(5)).await;

    let roles = UpdateRoles {
        roles: vec!["HR".to_string(), "User".to_string()],
    };
    let err = h
        .services
        .actors
        .assign_roles(&h.ctx(&endorser()), 1, roles)
        .await
        .unwrap_err();
    assert_eq!(err.workflow(), Some(&WorkflowError::RoleMismatch));

    let updated = h
        .services
        .actors
        .assign_roles(
            &h.ctx(&admin()),
            1,
            UpdateRoles {
                roles: vec!["HR".to_string(), "User".to_string()],
            },
        )
        .await
        .unwrap();
    assert!(updated.roles.contains("HR"));

    let graded = h
        .services
        .actors
        .assign_grade(&h.ctx(&admin()), 1, UpdateGrade { grade_id: Some(5) })
        .await
        .unwrap();
    assert_eq!(graded.grade.map(|g| g.level), Some(5));

    let err = h
        .services
        .actors
        .assign_grade(&h.ctx(&admin()), 1, UpdateGrade { grade_id: Some(42) })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let resolved = h.services.actors.resolve(1).await.unwrap().unwrap();
    assert!(resolved.roles.contains("HR"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_returns_never_strand_the_request() {
    let store = Arc::new(MemoryStore::new());
    let lockstep = Arc::new(LockstepStore::new(store.clone()));
    let h = Harness::with_requests(store, lockstep.clone());
    let bpm = issuer();
    let id = h.approved_loan(3, 14).await;

    let first = h
        .services
        .requests
        .issue_items(&h.ctx(&bpm), id, issue(&["LT-1", "LT-2"]))
        .await
        .unwrap();
    let second = h
        .services
        .requests
        .issue_items(&h.ctx(&bpm), id, issue(&["LT-3"]))
        .await
        .unwrap();
    assert_eq!(second.request.status, RequestStatus::Issued);

    h.services
        .requests
        .return_items(&h.ctx(&bpm), id, first.transaction.id, give_back(&["LT-1"]))
        .await
        .unwrap();

    lockstep.arm();
    let a = spawn_return(&h.services, id, first.transaction.id, "LT-2");
    let b = spawn_return(&h.services, id, second.transaction.id, "LT-3");
    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a.is_ok() != b.is_ok());

    let (loser, transaction_id, tag) = match (a, b) {
        (Ok(_), Err(e)) => (e, second.transaction.id, "LT-3"),
        (Err(e), Ok(_)) => (e, first.transaction.id, "LT-2"),
        _ => unreachable!(),
    };
    assert_eq!(reason(&loser), Some("concurrent_update"));

    let outstanding: usize = h
        .store
        .list_transactions(id)
        .await
        .unwrap()
        .iter()
        .map(LoanTransaction::outstanding)
        .sum();
    assert_eq!(outstanding, 1);
    assert_eq!(h.status_of(id).await, RequestStatus::PartiallyReturned);

    let done = h
        .services
        .requests
        .return_items(&h.ctx(&bpm), id, transaction_id, give_back(&[tag]))
        .await
        .unwrap();
    assert_eq!(done.request.status, RequestStatus::Returned);
    assert_eq!(h.status_of(id).await, RequestStatus::Returned);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_issues_single_winner() {
    let store = Arc::new(MemoryStore::new());
    let lockstep = Arc::new(LockstepStore::new(store.clone()));
    let h = Harness::with_requests(store, lockstep.clone());
    let id = h.approved_loan(2, 14).await;

    lockstep.arm();
    let a = spawn_issue(&h.services, id, "LT-1");
    let b = spawn_issue(&h.services, id, "LT-2");
    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a.is_ok() != b.is_ok());

    let loser = if a.is_ok() { b } else { a };
    assert_eq!(reason(&loser.unwrap_err()), Some("concurrent_update"));

    let transactions = h.store.list_transactions(id).await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].items.len(), 1);
    assert_eq!(h.status_of(id).await, RequestStatus::PartiallyIssued);
}

#[tokio::test]
async fn test_out_of_range_quantities_refused() {
    let h = Harness::new();
    let a = requester();

    for quantity in [MAX_LINE_QUANTITY + 1, i32::MAX, -1] {
        let err = h
            .services
            .requests
            .create_request(&h.ctx(&a), loan_draft(quantity))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "quantity {}", quantity);
    }

    let id = h
        .services
        .requests
        .create_request(&h.ctx(&a), loan_draft(1))
        .await
        .unwrap()
        .id;
    let err = h
        .services
        .requests
        .update_request(
            &h.ctx(&a),
            id,
            UpdateRequest {
                items: Some(vec![LineItem::Equipment {
                    equipment_type: "laptop".to_string(),
                    quantity: i32::MAX,
                    notes: None,
                }]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_issued_units_must_match_requested_type() {
    let h = Harness::new();
    let id = h.approved_loan(2, 14).await;

    let projectors = IssueItems {
        items: ["PJ-1", "PJ-2"]
            .iter()
            .map(|tag| IssueItem {
                asset_tag: tag.to_string(),
                equipment_type: "projector".to_string(),
            })
            .collect(),
    };
    let err = h
        .services
        .requests
        .issue_items(&h.ctx(&issuer()), id, projectors)
        .await
        .unwrap_err();
    assert_eq!(reason(&err), Some("equipment_type_not_requested"));
    assert_eq!(h.status_of(id).await, RequestStatus::Approved);
    assert!(h.store.list_transactions(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_partially_issued_loan_returned_early_can_finish_issuance() {
    let h = Harness::new();
    let bpm = issuer();
    let id = h.approved_loan(3, 14).await;

    let first = h
        .services
        .requests
        .issue_items(&h.ctx(&bpm), id, issue(&["LT-1"]))
        .await
        .unwrap();
    let back = h
        .services
        .requests
        .return_items(&h.ctx(&bpm), id, first.transaction.id, give_back(&["LT-1"]))
        .await
        .unwrap();
    assert_eq!(back.request.status, RequestStatus::PartiallyReturned);

    let rest = h
        .services
        .requests
        .issue_items(&h.ctx(&bpm), id, issue(&["LT-2", "LT-3"]))
        .await
        .unwrap();
    assert_eq!(rest.request.status, RequestStatus::PartiallyReturned);

    let done = h
        .services
        .requests
        .return_items(&h.ctx(&bpm), id, rest.transaction.id, give_back(&["LT-2", "LT-3"]))
        .await
        .unwrap();
    assert_eq!(done.request.status, RequestStatus::Returned);

    let err = h
        .services
        .requests
        .return_items(&h.ctx(&bpm), id, rest.transaction.id, give_back(&["LT-2"]))
        .await
        .unwrap_err();
    assert_eq!(reason(&err), Some("no_items_out"));
}
