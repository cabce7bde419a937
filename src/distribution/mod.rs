//! Profit distribution core.
//!
//! This module provides:
//! - The ledger guard: at-most-once credit per (position, period)
//! - The distributor: credits due periods of every active position
//! - The lifecycle manager: completes positions whose term has elapsed
//! - Run reports and the ledger audit

pub mod audit;
pub mod distributor;
pub mod guard;
pub mod lifecycle;
pub mod report;

pub use audit::{audit_account, audit_position, AccountAudit, PositionAudit};
pub use distributor::ProfitDistributor;
pub use guard::{CreditOutcome, LedgerGuard, Reservation};
pub use lifecycle::{Completion, LifecycleManager};
pub use report::{
    CompletionReport, DistributionError, DistributionReport, ErrorKind, PositionOutcome,
    UnitFailure,
};
