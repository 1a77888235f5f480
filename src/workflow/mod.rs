//! Approval and resource-lifecycle core.
//!
//! Everything in this module is synchronous and free of I/O: callers load
//! actors and requests, call in, then persist what comes back.

pub mod approval;
pub mod audit;
pub mod error;
pub mod maintenance;
pub mod policy;
pub mod state_machine;

pub use approval::{ApprovalWorkflow, DecisionRecord};
pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use error::WorkflowError;
pub use policy::{AccessPolicy, Action, DenyReason, PolicyDecision, RbacPolicy, ResourceContext};
pub use state_machine::{Effect, Outcome, Transition};
