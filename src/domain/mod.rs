//! Domain types for the profit distribution ledger.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Domain primitives: TimeMs, UserId, PositionId, PeriodIndex
//! - Positions, period credits and transaction log entries

pub mod credit;
pub mod decimal;
pub mod position;
pub mod primitives;
pub mod transaction;

pub use credit::PeriodCredit;
pub use decimal::{Decimal, MONEY_SCALE};
pub use position::{
    period_profit, ConfigurationError, NewPosition, PeriodUnit, Position, PositionRecord,
    PositionStatus,
};
pub use primitives::{PeriodIndex, PositionId, TimeMs, UserId};
pub use transaction::{TransactionEntry, TransactionKind, TRANSACTION_STATUS_COMPLETED};
