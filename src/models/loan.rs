//! Loan transaction (physical hand-over and return of equipment)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::request::ResourceRequest;

/// Status of one hand-over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Issued,
    PartiallyReturned,
    Returned,
    Overdue,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Issued => "issued",
            TransactionStatus::PartiallyReturned => "partially_returned",
            TransactionStatus::Returned => "returned",
            TransactionStatus::Overdue => "overdue",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued" => Ok(TransactionStatus::Issued),
            "partially_returned" => Ok(TransactionStatus::PartiallyReturned),
            "returned" => Ok(TransactionStatus::Returned),
            "overdue" => Ok(TransactionStatus::Overdue),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

text_column!(TransactionStatus);

/// One physical unit handed over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IssuedItem {
    /// Inventory tag of the unit
    pub asset_tag: String,
    pub equipment_type: String,
    pub returned_at: Option<DateTime<Utc>>,
}

/// Hand-over record tied to an approved loan request. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LoanTransaction {
    pub id: i32,
    /// Parent request (lookup only)
    pub request_id: i32,
    pub items: Vec<IssuedItem>,
    pub status: TransactionStatus,
    pub issued_by: i32,
    pub issued_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<i32>,
}

impl LoanTransaction {
    pub fn outstanding(&self) -> usize {
        self.items.iter().filter(|i| i.returned_at.is_none()).count()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.outstanding() > 0 && self.due_date.map(|d| d < now).unwrap_or(false)
    }

    /// Mark the given tags returned; unknown or already-returned tags are reported back
    pub fn return_items(&mut self, asset_tags: &[String], now: DateTime<Utc>) -> Vec<String> {
        let mut rejected = Vec::new();
        for tag in asset_tags {
            match self
                .items
                .iter_mut()
                .find(|i| &i.asset_tag == tag && i.returned_at.is_none())
            {
                Some(item) => item.returned_at = Some(now),
                None => rejected.push(tag.clone()),
            }
        }
        self.status = self.computed_status(now);
        rejected
    }

    /// Status derived from the items and the due date
    pub fn computed_status(&self, now: DateTime<Utc>) -> TransactionStatus {
        let outstanding = self.outstanding();
        if outstanding == 0 {
            TransactionStatus::Returned
        } else if self.is_overdue(now) {
            TransactionStatus::Overdue
        } else if outstanding < self.items.len() {
            TransactionStatus::PartiallyReturned
        } else {
            TransactionStatus::Issued
        }
    }
}

/// Unit handed over in an issue action
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct IssueItem {
    #[validate(length(min = 1, message = "Asset tag is required"))]
    pub asset_tag: String,
    #[validate(length(min = 1, message = "Equipment type is required"))]
    pub equipment_type: String,
}

/// Result of an issue or return: the request and the hand-over it touched
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LoanMovement {
    pub request: ResourceRequest,
    pub transaction: LoanTransaction,
}

/// Issue payload: units handed over in one go
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct IssueItems {
    #[validate(length(min = 1, message = "At least one unit must be issued"), nested)]
    pub items: Vec<IssueItem>,
}

/// Return payload: asset tags coming back on one hand-over
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ReturnItems {
    #[validate(length(min = 1, message = "At least one asset tag is required"))]
    pub asset_tags: Vec<String>,
}
