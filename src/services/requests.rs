//! Resource request service: drafts, approval and the loan / provisioning lifecycle

use std::sync::Arc;

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::{
    config::WorkflowConfig,
    error::{AppError, AppResult},
    models::{
        request::{CreateRequest, RequestQuery, UpdateRequest},
        Actor, IssueItems, IssuedItem, LoanMovement, LoanTransaction, ProvisioningReport,
        RecordDecision, RequestDetails, RequestKind, RequestStatus, ResourceRequest, ReturnItems,
        RoleSet,
    },
    repository::{RequestStore, StatusChange},
    workflow::{
        state_machine, AccessPolicy, Action, ApprovalWorkflow, AuditEvent, Effect, Outcome,
        ResourceContext, Transition, WorkflowError,
    },
};

use super::{admin_roles, provisioning::Provisioner, CallContext, Guard};

#[derive(Clone)]
pub struct RequestsService {
    store: Arc<dyn RequestStore>,
    provisioner: Arc<dyn Provisioner>,
    workflow: ApprovalWorkflow,
    guard: Guard,
    config: WorkflowConfig,
}

impl RequestsService {
    pub fn new(
        store: Arc<dyn RequestStore>,
        provisioner: Arc<dyn Provisioner>,
        policy: Arc<dyn AccessPolicy>,
        guard: Guard,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            provisioner,
            workflow: ApprovalWorkflow::new(policy, config.min_approver_grade_level),
            guard,
            config,
        }
    }

    /// Roles that may look at requests they do not own
    fn viewer_roles(&self) -> RoleSet {
        self.config
            .support_roles()
            .union(&self.config.issuer_roles())
            .union(&self.config.provisioner_roles())
    }

    /// Live (not soft-deleted) request
    async fn load(&self, id: i32) -> AppResult<ResourceRequest> {
        self.store
            .get_request(id)
            .await?
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("Request {} not found", id)))
    }

    fn authorize(
        &self,
        ctx: &CallContext<'_>,
        actor: &Actor,
        action: Action,
        context: &ResourceContext,
        request_id: i32,
    ) -> Result<(), WorkflowError> {
        self.guard
            .authorize(actor, action, context, ctx.route, Some(request_id))
    }

    /// Run the state machine and persist the new status with a conditional write
    async fn advance(
        &self,
        actor: &Actor,
        mut request: ResourceRequest,
        transition: Transition,
    ) -> AppResult<(ResourceRequest, Outcome)> {
        let outcome = state_machine::apply(&request, transition)?;

        let mut change = StatusChange::new(request.id, outcome.from, outcome.to, actor.id);
        if transition == Transition::Endorse {
            change = change.as_endorsement();
        }

        if !self.store.change_status(&change).await? {
            return Err(concurrent_update(outcome.from, transition).into());
        }

        change.apply_to(&mut request);
        self.transitioned(actor, &request, transition, &outcome);
        Ok((request, outcome))
    }

    fn transitioned(
        &self,
        actor: &Actor,
        request: &ResourceRequest,
        transition: Transition,
        outcome: &Outcome,
    ) {
        tracing::info!(
            request_id = request.id,
            actor_id = actor.id,
            from = %outcome.from,
            to = %outcome.to,
            "Request {}",
            transition.name()
        );
        self.guard.record(AuditEvent::Transitioned {
            request_id: request.id,
            actor_id: actor.id,
            transition: transition.name(),
            from: outcome.from,
            to: outcome.to,
        });
    }

    /// Carry out the effect a transition asked for
    async fn follow_up(
        &self,
        actor: &Actor,
        request: ResourceRequest,
        outcome: &Outcome,
    ) -> AppResult<ResourceRequest> {
        match outcome.effect {
            Some(Effect::RequestProvisioning) => self.hand_off(actor, request).await,
            None => Ok(request),
        }
    }

    /// Hand an approved email application to provisioning; a failed
    /// hand-off moves it to `provision_failed`
    async fn hand_off(&self, actor: &Actor, request: ResourceRequest) -> AppResult<ResourceRequest> {
        match self.provisioner.request_provisioning(&request).await {
            Ok(()) => Ok(request),
            Err(e) => {
                tracing::warn!(request_id = request.id, "Provisioning hand-off failed: {}", e);
                self.guard.record(AuditEvent::ProvisioningHandoffFailed {
                    request_id: request.id,
                    error: e.to_string(),
                });
                let (request, _) = self.advance(actor, request, Transition::ProvisionFailed).await?;
                Ok(request)
            }
        }
    }

    /// Create a draft owned by the caller
    pub async fn create_request(
        &self,
        ctx: &CallContext<'_>,
        data: CreateRequest,
    ) -> AppResult<ResourceRequest> {
        let actor = self.guard.admit(ctx)?;
        data.validate()?;

        self.guard.authorize(
            actor,
            Action::Create,
            &ResourceContext::new().owned_by(actor.id),
            ctx.route,
            None,
        )?;

        let request = self.store.insert_request(data, actor.id).await?;

        tracing::info!(request_id = request.id, kind = %request.kind, "Request created");
        self.guard.record(AuditEvent::RequestCreated {
            request_id: request.id,
            actor_id: actor.id,
        });
        Ok(request)
    }

    /// Request with its hand-over records; overdue status is computed on read
    pub async fn get_request(&self, ctx: &CallContext<'_>, id: i32) -> AppResult<RequestDetails> {
        let actor = self.guard.admit(ctx)?;
        let request = self.load(id).await?;

        self.authorize(
            ctx,
            actor,
            Action::ViewAny,
            &ResourceContext::new()
                .owned_by(request.requester_id)
                .overridden_by(self.viewer_roles()),
            id,
        )?;

        let mut transactions = match request.kind {
            RequestKind::Loan => self.store.list_transactions(id).await?,
            RequestKind::EmailAccount => Vec::new(),
        };
        let request = with_overdue(request, &mut transactions, Utc::now());

        Ok(RequestDetails {
            request,
            transactions,
        })
    }

    /// Every request for support roles; only their own for everybody else
    pub async fn list_requests(
        &self,
        ctx: &CallContext<'_>,
        mut query: RequestQuery,
    ) -> AppResult<Vec<ResourceRequest>> {
        let actor = self.guard.admit(ctx)?;

        let sees_all = self.guard.permits(
            actor,
            Action::ViewAny,
            &ResourceContext::new().requiring(self.config.support_roles()),
        );
        if !sees_all {
            query.requester_id = Some(actor.id);
        }

        self.store.list_requests(&query).await
    }

    /// Edit a draft (owner only)
    pub async fn update_request(
        &self,
        ctx: &CallContext<'_>,
        id: i32,
        data: UpdateRequest,
    ) -> AppResult<ResourceRequest> {
        let actor = self.guard.admit(ctx)?;
        data.validate()?;
        let mut request = self.load(id).await?;

        self.authorize(
            ctx,
            actor,
            Action::Update,
            &ResourceContext::new().owned_by(request.requester_id),
            id,
        )?;
        require_draft(&request, "update")?;

        data.apply_to(&mut request);
        if !self.store.update_draft(&request, actor.id).await? {
            return Err(WorkflowError::InvalidTransition {
                from: request.status,
                attempted: "update",
                reason: "concurrent_update",
            }
            .into());
        }

        request.updated_at = Some(Utc::now());
        request.updated_by = Some(actor.id);
        Ok(request)
    }

    /// Soft-delete a draft (owner only)
    pub async fn delete_request(&self, ctx: &CallContext<'_>, id: i32) -> AppResult<()> {
        let actor = self.guard.admit(ctx)?;
        let request = self.load(id).await?;

        self.authorize(
            ctx,
            actor,
            Action::Delete,
            &ResourceContext::new().owned_by(request.requester_id),
            id,
        )?;
        require_draft(&request, "delete")?;

        if !self.store.soft_delete(id, actor.id).await? {
            return Err(WorkflowError::InvalidTransition {
                from: request.status,
                attempted: "delete",
                reason: "concurrent_update",
            }
            .into());
        }

        tracing::info!(request_id = id, actor_id = actor.id, "Draft deleted");
        Ok(())
    }

    /// Send a draft to the support stage
    pub async fn submit(&self, ctx: &CallContext<'_>, id: i32) -> AppResult<ResourceRequest> {
        let actor = self.guard.admit(ctx)?;
        let request = self.load(id).await?;

        self.authorize(
            ctx,
            actor,
            Action::Update,
            &ResourceContext::new().owned_by(request.requester_id),
            id,
        )?;

        let (request, _) = self.advance(actor, request, Transition::Submit).await?;
        Ok(request)
    }

    /// Support-stage endorsement, forwarding the request to an approver
    pub async fn endorse(&self, ctx: &CallContext<'_>, id: i32) -> AppResult<ResourceRequest> {
        let actor = self.guard.admit(ctx)?;
        let request = self.load(id).await?;

        self.authorize(
            ctx,
            actor,
            Action::Approve,
            &ResourceContext::new()
                .grade_gated(self.config.min_endorser_grade_level)
                .requiring(self.config.support_roles()),
            id,
        )?;

        let (request, _) = self.advance(actor, request, Transition::Endorse).await?;
        Ok(request)
    }

    /// Approve or reject a request waiting at `pending_approval`.
    ///
    /// The trail entry and the status change are written together and only
    /// if the status is still `pending_approval`; the loser of a race gets
    /// `AlreadyDecided`.
    pub async fn record_decision(
        &self,
        ctx: &CallContext<'_>,
        id: i32,
        payload: RecordDecision,
    ) -> AppResult<ResourceRequest> {
        let actor = self.guard.admit(ctx)?;
        payload.validate()?;
        let request = self.load(id).await?;

        let record = self
            .workflow
            .record_decision(actor, &request, payload.decision, payload.comment, Utc::now())
            .map_err(|e| self.decision_refused(actor, id, e))?;

        let change = StatusChange::new(id, record.outcome.from, record.outcome.to, actor.id)
            .with_trail_entry(record.entry.clone());
        if !self.store.change_status(&change).await? {
            return Err(self.decision_refused(actor, id, WorkflowError::AlreadyDecided).into());
        }

        tracing::info!(
            request_id = id,
            approver_id = actor.id,
            decision = %payload.decision,
            "Decision recorded"
        );
        self.guard.record(AuditEvent::DecisionRecorded {
            request_id: id,
            approver_id: actor.id,
            decision: payload.decision,
        });

        let decided = record.applied_to(&request);
        self.follow_up(actor, decided, &record.outcome).await
    }

    fn decision_refused(&self, actor: &Actor, request_id: i32, error: WorkflowError) -> WorkflowError {
        self.guard.record(AuditEvent::DecisionRejected {
            request_id,
            approver_id: actor.id,
            reason: error.reason(),
        });
        error
    }

    /// Withdraw a request before it is decided (owner or Admin)
    pub async fn cancel(&self, ctx: &CallContext<'_>, id: i32) -> AppResult<ResourceRequest> {
        let actor = self.guard.admit(ctx)?;
        let request = self.load(id).await?;

        self.authorize(
            ctx,
            actor,
            Action::Update,
            &ResourceContext::new().owned_by(request.requester_id),
            id,
        )?;

        let (request, _) = self.advance(actor, request, Transition::Cancel).await?;
        Ok(request)
    }

    /// Bring a rejected or cancelled request back to draft (Admin only)
    pub async fn restore(&self, ctx: &CallContext<'_>, id: i32) -> AppResult<ResourceRequest> {
        let actor = self.guard.admit(ctx)?;
        let request = self.load(id).await?;

        self.authorize(
            ctx,
            actor,
            Action::Update,
            &ResourceContext::new().requiring(admin_roles()),
            id,
        )?;

        let (request, outcome) = self.advance(actor, request, Transition::Restore).await?;
        tracing::warn!(request_id = id, admin_id = actor.id, from = %outcome.from, "Request restored");
        self.guard.record(AuditEvent::Restored {
            request_id: id,
            admin_id: actor.id,
            from: outcome.from,
        });
        Ok(request)
    }

    /// Hand over units of an approved loan request
    pub async fn issue_items(
        &self,
        ctx: &CallContext<'_>,
        id: i32,
        payload: IssueItems,
    ) -> AppResult<LoanMovement> {
        let actor = self.guard.admit(ctx)?;
        payload.validate()?;
        let request = self.load(id).await?;

        self.authorize(
            ctx,
            actor,
            Action::Issue,
            &ResourceContext::new().requiring(self.config.issuer_roles()),
            id,
        )?;

        let transactions = self.store.list_transactions(id).await?;
        let issued_total = i64::try_from(issued_units(&transactions) + payload.items.len())
            .map_err(|_| AppError::Validation("Too many units in one hand-over".to_string()))?;

        let transition = Transition::Issue { issued_total };
        let outcome = state_machine::apply(&request, transition)?;
        state_machine::check_issue_lines(
            &request,
            transactions
                .iter()
                .flat_map(|t| t.items.iter().map(|i| i.equipment_type.as_str()))
                .chain(payload.items.iter().map(|i| i.equipment_type.as_str())),
        )?;
        let change = StatusChange::new(id, outcome.from, outcome.to, actor.id);

        let items = payload
            .items
            .into_iter()
            .map(|item| IssuedItem {
                asset_tag: item.asset_tag,
                equipment_type: item.equipment_type,
                returned_at: None,
            })
            .collect();

        let transaction = self
            .store
            .record_issuance(&change, transactions.len(), items, request.due_date)
            .await?
            .ok_or_else(|| AppError::from(concurrent_update(outcome.from, transition)))?;

        let mut request = request;
        change.apply_to(&mut request);
        self.transitioned(actor, &request, transition, &outcome);

        Ok(LoanMovement {
            request,
            transaction,
        })
    }

    /// Take back units of one hand-over
    pub async fn return_items(
        &self,
        ctx: &CallContext<'_>,
        id: i32,
        transaction_id: i32,
        payload: ReturnItems,
    ) -> AppResult<LoanMovement> {
        let actor = self.guard.admit(ctx)?;
        payload.validate()?;
        let request = self.load(id).await?;

        self.authorize(
            ctx,
            actor,
            Action::Return,
            &ResourceContext::new().requiring(self.config.issuer_roles()),
            id,
        )?;

        if !request.status.has_items_out() {
            return Err(WorkflowError::InvalidTransition {
                from: request.status,
                attempted: "return",
                reason: "no_items_out",
            }
            .into());
        }

        let mut transactions = self.store.list_transactions(id).await?;
        let now = Utc::now();

        let transaction = transactions
            .iter_mut()
            .find(|t| t.id == transaction_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Transaction {} not found on request {}",
                    transaction_id, id
                ))
            })?;

        let rejected = transaction.return_items(&payload.asset_tags, now);
        if !rejected.is_empty() {
            return Err(AppError::Validation(format!(
                "Asset tags not outstanding on transaction {}: {}",
                transaction_id,
                rejected.join(", ")
            )));
        }
        let mut transaction = transaction.clone();

        let outstanding: usize = transactions.iter().map(LoanTransaction::outstanding).sum();
        let issued = i64::try_from(issued_units(&transactions)).unwrap_or(i64::MAX);
        let transition = Transition::Return {
            all_returned: outstanding == 0,
            fully_issued: issued >= request.requested_quantity(),
            is_overdue: transactions.iter().any(|t| t.is_overdue(now)),
        };
        let outcome = state_machine::apply(&request, transition)?;
        let change = StatusChange::new(id, outcome.from, outcome.to, actor.id);

        if !self
            .store
            .record_return(&change, &transaction, outstanding)
            .await?
        {
            return Err(concurrent_update(outcome.from, transition).into());
        }

        transaction.updated_at = Some(change.at);
        transaction.updated_by = Some(actor.id);
        let mut request = request;
        change.apply_to(&mut request);
        self.transitioned(actor, &request, transition, &outcome);

        Ok(LoanMovement {
            request,
            transaction,
        })
    }

    /// Outcome reported by the provisioning team for an approved email request
    pub async fn report_provisioning(
        &self,
        ctx: &CallContext<'_>,
        id: i32,
        report: ProvisioningReport,
    ) -> AppResult<ResourceRequest> {
        let actor = self.guard.admit(ctx)?;
        report.validate()?;
        let request = self.load(id).await?;

        self.authorize(
            ctx,
            actor,
            Action::Issue,
            &ResourceContext::new().requiring(self.config.provisioner_roles()),
            id,
        )?;

        let transition = if report.succeeded {
            Transition::ProvisionSucceeded
        } else {
            Transition::ProvisionFailed
        };
        let (request, _) = self.advance(actor, request, transition).await?;

        if let Some(detail) = report.detail.as_deref() {
            tracing::info!(request_id = id, succeeded = report.succeeded, "Provisioning report: {}", detail);
        }
        Ok(request)
    }

    /// Send a failed email request back to `approved` and hand it off again
    pub async fn retry_provisioning(
        &self,
        ctx: &CallContext<'_>,
        id: i32,
    ) -> AppResult<ResourceRequest> {
        let actor = self.guard.admit(ctx)?;
        let request = self.load(id).await?;

        self.authorize(
            ctx,
            actor,
            Action::Issue,
            &ResourceContext::new().requiring(self.config.provisioner_roles()),
            id,
        )?;

        let (request, outcome) = self
            .advance(actor, request, Transition::RetryProvisioning)
            .await?;
        self.follow_up(actor, request, &outcome).await
    }
}

fn require_draft(request: &ResourceRequest, attempted: &'static str) -> Result<(), WorkflowError> {
    if request.status == RequestStatus::Draft {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition {
            from: request.status,
            attempted,
            reason: "not_a_draft",
        })
    }
}

fn issued_units(transactions: &[LoanTransaction]) -> usize {
    transactions.iter().map(|t| t.items.len()).sum()
}

fn concurrent_update(from: RequestStatus, transition: Transition) -> WorkflowError {
    WorkflowError::InvalidTransition {
        from,
        attempted: transition.name(),
        reason: "concurrent_update",
    }
}

/// Overlay the overdue status computed from the hand-over due dates
fn with_overdue(
    mut request: ResourceRequest,
    transactions: &mut [LoanTransaction],
    now: DateTime<Utc>,
) -> ResourceRequest {
    for transaction in transactions.iter_mut() {
        transaction.status = transaction.computed_status(now);
    }

    let is_overdue = transactions.iter().any(|t| t.is_overdue(now));
    if let Ok(outcome) = state_machine::apply(&request, Transition::MarkOverdue { is_overdue }) {
        request.status = outcome.to;
    }
    request
}
