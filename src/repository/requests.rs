//! Resource request repository for database operations

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, types::Json, Postgres, QueryBuilder, Row, Transaction};

use super::{Repository, RequestStore, StatusChange};
use crate::{
    error::AppResult,
    models::{
        request::{CreateRequest, RequestQuery},
        ApprovalEntry, IssuedItem, LineItem, LoanTransaction, RequestStatus, ResourceRequest,
        TransactionStatus,
    },
};

const REQUEST_COLUMNS: &str = r#"
    id, kind, requester_id, purpose, location, due_date, items, status,
    endorsed_by, endorsed_at, created_at, created_by, updated_at, updated_by,
    deleted_at, deleted_by
"#;

fn request_from_row(row: &PgRow) -> ResourceRequest {
    let items: Json<Vec<LineItem>> = row.get("items");
    ResourceRequest {
        id: row.get("id"),
        kind: row.get("kind"),
        requester_id: row.get("requester_id"),
        purpose: row.get("purpose"),
        location: row.get("location"),
        due_date: row.get("due_date"),
        items: items.0,
        status: row.get("status"),
        endorsed_by: row.get("endorsed_by"),
        endorsed_at: row.get("endorsed_at"),
        trail: Vec::new(),
        created_at: row.get("created_at"),
        created_by: row.get("created_by"),
        updated_at: row.get("updated_at"),
        updated_by: row.get("updated_by"),
        deleted_at: row.get("deleted_at"),
        deleted_by: row.get("deleted_by"),
    }
}

fn entry_from_row(row: &PgRow) -> ApprovalEntry {
    ApprovalEntry {
        approver_id: row.get("approver_id"),
        decision: row.get("decision"),
        decided_at: row.get("decided_at"),
        comment: row.get("comment"),
    }
}

fn transaction_from_row(row: &PgRow) -> LoanTransaction {
    let items: Json<Vec<IssuedItem>> = row.get("items");
    LoanTransaction {
        id: row.get("id"),
        request_id: row.get("request_id"),
        items: items.0,
        status: row.get::<TransactionStatus, _>("status"),
        issued_by: row.get("issued_by"),
        issued_at: row.get("issued_at"),
        due_date: row.get("due_date"),
        updated_at: row.get("updated_at"),
        updated_by: row.get("updated_by"),
    }
}

impl Repository {
    /// Conditional status update inside an open transaction; also appends the trail entry
    async fn apply_status_change(
        tx: &mut Transaction<'_, Postgres>,
        change: &StatusChange,
    ) -> AppResult<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE resource_requests
            SET status = $3,
                updated_at = $4,
                updated_by = $5,
                endorsed_by = CASE WHEN $6 THEN $5 ELSE endorsed_by END,
                endorsed_at = CASE WHEN $6 THEN $4 ELSE endorsed_at END
            WHERE id = $1 AND status = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(change.request_id)
        .bind(change.expected)
        .bind(change.next)
        .bind(change.at)
        .bind(change.stamped_by)
        .bind(change.endorsement)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Ok(false);
        }

        if let Some(entry) = &change.trail_entry {
            sqlx::query(
                r#"
                INSERT INTO approval_trail (request_id, approver_id, decision, decided_at, comment)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(change.request_id)
            .bind(entry.approver_id)
            .bind(entry.decision)
            .bind(entry.decided_at)
            .bind(&entry.comment)
            .execute(&mut **tx)
            .await?;
        }

        Ok(true)
    }

    async fn load_trails(&self, ids: &[i32]) -> AppResult<HashMap<i32, Vec<ApprovalEntry>>> {
        let rows = sqlx::query(
            r#"
            SELECT request_id, approver_id, decision, decided_at, comment
            FROM approval_trail
            WHERE request_id = ANY($1)
            ORDER BY decided_at, id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut trails: HashMap<i32, Vec<ApprovalEntry>> = HashMap::new();
        for row in rows {
            trails
                .entry(row.get("request_id"))
                .or_default()
                .push(entry_from_row(&row));
        }
        Ok(trails)
    }
}

#[async_trait]
impl RequestStore for Repository {
    async fn insert_request(&self, data: CreateRequest, requester_id: i32) -> AppResult<ResourceRequest> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO resource_requests
                (kind, requester_id, purpose, location, due_date, items, status, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $2)
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        ))
        .bind(data.kind)
        .bind(requester_id)
        .bind(&data.purpose)
        .bind(&data.location)
        .bind(data.due_date)
        .bind(Json(&data.items))
        .bind(RequestStatus::Draft)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(request_from_row(&row))
    }

    async fn get_request(&self, id: i32) -> AppResult<Option<ResourceRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM resource_requests WHERE id = $1",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut request = request_from_row(&row);
        request.trail = self
            .load_trails(&[id])
            .await?
            .remove(&id)
            .unwrap_or_default();
        Ok(Some(request))
    }

    async fn list_requests(&self, query: &RequestQuery) -> AppResult<Vec<ResourceRequest>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM resource_requests WHERE deleted_at IS NULL",
            REQUEST_COLUMNS
        ));

        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(kind) = query.kind {
            builder.push(" AND kind = ").push_bind(kind);
        }
        if let Some(requester_id) = query.requester_id {
            builder.push(" AND requester_id = ").push_bind(requester_id);
        }
        builder.push(" ORDER BY created_at DESC, id DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut requests: Vec<ResourceRequest> = rows.iter().map(request_from_row).collect();

        let ids: Vec<i32> = requests.iter().map(|r| r.id).collect();
        let mut trails = self.load_trails(&ids).await?;
        for request in &mut requests {
            request.trail = trails.remove(&request.id).unwrap_or_default();
        }

        Ok(requests)
    }

    async fn update_draft(&self, request: &ResourceRequest, stamped_by: i32) -> AppResult<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE resource_requests
            SET purpose = $2, location = $3, due_date = $4, items = $5,
                updated_at = $6, updated_by = $7
            WHERE id = $1 AND status = $8 AND deleted_at IS NULL
            "#,
        )
        .bind(request.id)
        .bind(&request.purpose)
        .bind(&request.location)
        .bind(request.due_date)
        .bind(Json(&request.items))
        .bind(Utc::now())
        .bind(stamped_by)
        .bind(RequestStatus::Draft)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn soft_delete(&self, id: i32, stamped_by: i32) -> AppResult<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE resource_requests
            SET deleted_at = $2, deleted_by = $3
            WHERE id = $1 AND status = $4 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .bind(stamped_by)
        .bind(RequestStatus::Draft)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn change_status(&self, change: &StatusChange) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;
        if !Self::apply_status_change(&mut tx, change).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn list_transactions(&self, request_id: i32) -> AppResult<Vec<LoanTransaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, request_id, items, status, issued_by, issued_at, due_date, updated_at, updated_by
            FROM loan_transactions
            WHERE request_id = $1
            ORDER BY issued_at, id
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(transaction_from_row).collect())
    }

    async fn record_issuance(
        &self,
        change: &StatusChange,
        known_transactions: usize,
        items: Vec<IssuedItem>,
        due_date: Option<DateTime<Utc>>,
    ) -> AppResult<Option<LoanTransaction>> {
        let mut tx = self.pool.begin().await?;

        // The status update holds the request row lock until commit, so
        // concurrent hand-overs on the same request are serialized here.
        if !Self::apply_status_change(&mut tx, change).await? {
            tx.rollback().await?;
            return Ok(None);
        }

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loan_transactions WHERE request_id = $1")
                .bind(change.request_id)
                .fetch_one(&mut *tx)
                .await?;
        if existing as usize != known_transactions {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query(
            r#"
            INSERT INTO loan_transactions (request_id, items, status, issued_by, issued_at, due_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, request_id, items, status, issued_by, issued_at, due_date, updated_at, updated_by
            "#,
        )
        .bind(change.request_id)
        .bind(Json(&items))
        .bind(TransactionStatus::Issued)
        .bind(change.stamped_by)
        .bind(change.at)
        .bind(due_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(transaction_from_row(&row)))
    }

    async fn record_return(
        &self,
        change: &StatusChange,
        transaction: &LoanTransaction,
        outstanding_after: usize,
    ) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        // Holds the request row lock until commit; concurrent returns and
        // hand-overs on the same request queue up behind it.
        if !Self::apply_status_change(&mut tx, change).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        // `updated_at` still holds the value that was read, so a concurrent return loses here
        let updated = sqlx::query(
            r#"
            UPDATE loan_transactions
            SET items = $3, status = $4, updated_at = $5, updated_by = $6
            WHERE id = $1 AND request_id = $2 AND updated_at IS NOT DISTINCT FROM $7
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.request_id)
        .bind(Json(&transaction.items))
        .bind(transaction.status)
        .bind(change.at)
        .bind(change.stamped_by)
        .bind(transaction.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let rows = sqlx::query(
            r#"
            SELECT id, request_id, items, status, issued_by, issued_at, due_date, updated_at, updated_by
            FROM loan_transactions
            WHERE request_id = $1
            "#,
        )
        .bind(change.request_id)
        .fetch_all(&mut *tx)
        .await?;

        let outstanding: usize = rows
            .iter()
            .map(|row| transaction_from_row(row).outstanding())
            .sum();
        if outstanding != outstanding_after {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }
}
