//! Period credit records: the distribution ledger.

use crate::domain::{Decimal, PeriodIndex, PositionId, TimeMs};
use serde::Serialize;

/// One credited period of one position. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodCredit {
    pub position_id: PositionId,
    pub period_index: PeriodIndex,
    pub amount: Decimal,
    /// Nominal boundary this period represents (`start + index × period`),
    /// not the wall-clock time the credit was written.
    pub period_time: TimeMs,
    pub created_at: TimeMs,
}
