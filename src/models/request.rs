//! Resource request (loan application / email application) model

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError, ValidationErrors};

use super::loan::LoanTransaction;

/// Which kind of resource a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Loan,
    EmailAccount,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Loan => "loan",
            RequestKind::EmailAccount => "email_account",
        }
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loan" => Ok(RequestKind::Loan),
            "email_account" => Ok(RequestKind::EmailAccount),
            _ => Err(format!("Invalid request kind: {}", s)),
        }
    }
}

text_column!(RequestKind);

/// Lifecycle status of a resource request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    PendingSupport,
    PendingApproval,
    Approved,
    PartiallyIssued,
    Issued,
    PartiallyReturned,
    Returned,
    Overdue,
    Rejected,
    Cancelled,
    Completed,
    ProvisionFailed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Draft => "draft",
            RequestStatus::PendingSupport => "pending_support",
            RequestStatus::PendingApproval => "pending_approval",
            RequestStatus::Approved => "approved",
            RequestStatus::PartiallyIssued => "partially_issued",
            RequestStatus::Issued => "issued",
            RequestStatus::PartiallyReturned => "partially_returned",
            RequestStatus::Returned => "returned",
            RequestStatus::Overdue => "overdue",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Completed => "completed",
            RequestStatus::ProvisionFailed => "provision_failed",
        }
    }

    /// Statuses that never move again except through an admin restore
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Rejected
                | RequestStatus::Cancelled
                | RequestStatus::Completed
                | RequestStatus::Returned
        )
    }

    /// Whether an approver decision has already moved the request past `pending_approval`
    pub fn is_decided(&self) -> bool {
        !matches!(
            self,
            RequestStatus::Draft
                | RequestStatus::PendingSupport
                | RequestStatus::PendingApproval
                | RequestStatus::Cancelled
        )
    }

    /// Issuance has started and items may be out
    pub fn has_items_out(&self) -> bool {
        matches!(
            self,
            RequestStatus::PartiallyIssued
                | RequestStatus::Issued
                | RequestStatus::PartiallyReturned
                | RequestStatus::Overdue
        )
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(RequestStatus::Draft),
            "pending_support" => Ok(RequestStatus::PendingSupport),
            "pending_approval" => Ok(RequestStatus::PendingApproval),
            "approved" => Ok(RequestStatus::Approved),
            "partially_issued" => Ok(RequestStatus::PartiallyIssued),
            "issued" => Ok(RequestStatus::Issued),
            "partially_returned" => Ok(RequestStatus::PartiallyReturned),
            "returned" => Ok(RequestStatus::Returned),
            "overdue" => Ok(RequestStatus::Overdue),
            "rejected" => Ok(RequestStatus::Rejected),
            "cancelled" => Ok(RequestStatus::Cancelled),
            "completed" => Ok(RequestStatus::Completed),
            "provision_failed" => Ok(RequestStatus::ProvisionFailed),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

text_column!(RequestStatus);

/// Approver decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::Reject),
            _ => Err(format!("Invalid decision: {}", s)),
        }
    }
}

text_column!(Decision);

/// Largest quantity accepted on one equipment line
pub const MAX_LINE_QUANTITY: i32 = 1000;

/// One requested line (equipment for loans, mailbox for email applications)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineItem {
    Equipment {
        /// Equipment category, e.g. "laptop", "projector"
        equipment_type: String,
        quantity: i32,
        notes: Option<String>,
    },
    EmailAccount {
        proposed_address: String,
        display_name: String,
        /// Distribution list the mailbox should join
        group_email: Option<String>,
    },
}

impl LineItem {
    pub fn kind(&self) -> RequestKind {
        match self {
            LineItem::Equipment { .. } => RequestKind::Loan,
            LineItem::EmailAccount { .. } => RequestKind::EmailAccount,
        }
    }

    /// All fields needed for submission are filled in
    pub fn is_complete(&self) -> bool {
        match self {
            LineItem::Equipment {
                equipment_type,
                quantity,
                ..
            } => !equipment_type.trim().is_empty() && *quantity > 0,
            LineItem::EmailAccount {
                proposed_address,
                display_name,
                ..
            } => proposed_address.contains('@') && !display_name.trim().is_empty(),
        }
    }

    pub fn quantity(&self) -> i32 {
        match self {
            LineItem::Equipment { quantity, .. } => *quantity,
            LineItem::EmailAccount { .. } => 1,
        }
    }
}

// Zero is accepted on drafts; submission refuses incomplete lines.
impl Validate for LineItem {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let LineItem::Equipment { quantity, .. } = self {
            if !(0..=MAX_LINE_QUANTITY).contains(quantity) {
                let mut error = ValidationError::new("range").with_message(Cow::Owned(format!(
                    "Quantity must be between 0 and {}",
                    MAX_LINE_QUANTITY
                )));
                error.add_param(Cow::from("value"), quantity);
                errors.add("quantity", error);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// One entry of the append-only approval trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApprovalEntry {
    pub approver_id: i32,
    pub decision: Decision,
    pub decided_at: DateTime<Utc>,
    pub comment: Option<String>,
}

/// Resource request with its line items and approval trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResourceRequest {
    pub id: i32,
    pub kind: RequestKind,
    pub requester_id: i32,
    pub purpose: Option<String>,
    pub location: Option<String>,
    /// Return date for loans
    pub due_date: Option<DateTime<Utc>>,
    pub items: Vec<LineItem>,
    pub status: RequestStatus,
    pub endorsed_by: Option<i32>,
    pub endorsed_at: Option<DateTime<Utc>>,
    pub trail: Vec<ApprovalEntry>,
    pub created_at: DateTime<Utc>,
    pub created_by: i32,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<i32>,
}

impl ResourceRequest {
    /// Build a fresh draft owned by `requester_id`
    pub fn draft(id: i32, requester_id: i32, data: CreateRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: data.kind,
            requester_id,
            purpose: data.purpose,
            location: data.location,
            due_date: data.due_date,
            items: data.items,
            status: RequestStatus::Draft,
            endorsed_by: None,
            endorsed_at: None,
            trail: Vec::new(),
            created_at: now,
            created_by: requester_id,
            updated_at: None,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        }
    }

    /// Total number of units asked for
    pub fn requested_quantity(&self) -> i64 {
        self.items.iter().map(|item| i64::from(item.quantity())).sum()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Create request payload
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateRequest {
    pub kind: RequestKind,
    #[validate(length(max = 1000, message = "Purpose must be at most 1000 characters"))]
    pub purpose: Option<String>,
    #[validate(length(max = 255, message = "Location must be at most 255 characters"))]
    pub location: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<LineItem>,
}

/// Update draft payload
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateRequest {
    #[validate(length(max = 1000, message = "Purpose must be at most 1000 characters"))]
    pub purpose: Option<String>,
    #[validate(length(max = 255, message = "Location must be at most 255 characters"))]
    pub location: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    #[validate(nested)]
    pub items: Option<Vec<LineItem>>,
}

impl UpdateRequest {
    /// Apply the provided fields onto a draft
    pub fn apply_to(self, request: &mut ResourceRequest) {
        if let Some(purpose) = self.purpose {
            request.purpose = Some(purpose);
        }
        if let Some(location) = self.location {
            request.location = Some(location);
        }
        if let Some(due_date) = self.due_date {
            request.due_date = Some(due_date);
        }
        if let Some(items) = self.items {
            request.items = items;
        }
    }
}

/// Request as returned to callers, with its hand-over records
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RequestDetails {
    pub request: ResourceRequest,
    pub transactions: Vec<LoanTransaction>,
}

/// Approver decision payload
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RecordDecision {
    pub decision: Decision,
    #[validate(length(max = 1000, message = "Comment must be at most 1000 characters"))]
    pub comment: Option<String>,
}

/// Outcome reported back by the provisioning team
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ProvisioningReport {
    pub succeeded: bool,
    #[validate(length(max = 1000, message = "Detail must be at most 1000 characters"))]
    pub detail: Option<String>,
}

/// Request list filters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct RequestQuery {
    pub status: Option<RequestStatus>,
    pub kind: Option<RequestKind>,
    /// Restrict to one requester; ignored for callers who may only see their own requests
    pub requester_id: Option<i32>,
}
