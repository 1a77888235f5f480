//! Data models for HR Desk

/// Store a string-backed enum in a TEXT column through its `as_str`/`FromStr` pair.
macro_rules! text_column {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s: &str = sqlx::Decode::<sqlx::Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }
    };
}

pub mod actor;
pub mod loan;
pub mod maintenance;
pub mod request;

// Re-export commonly used types
pub use actor::{Actor, ActorClaims, Grade, RoleSet, ADMIN_ROLE};
pub use loan::{
    IssueItem, IssueItems, IssuedItem, LoanMovement, LoanTransaction, ReturnItems,
    TransactionStatus,
};
pub use maintenance::MaintenanceState;
pub use request::{
    ApprovalEntry, Decision, LineItem, ProvisioningReport, RecordDecision, RequestDetails,
    RequestKind, RequestStatus, ResourceRequest,
};
