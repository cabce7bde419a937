//! Append-only transaction log entries.

use crate::domain::{ConfigurationError, Decimal, PeriodIndex, PositionId, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What a balance mutation was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Investment,
    Profit,
    PrincipalReturn,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Investment => "investment",
            TransactionKind::Profit => "profit",
            TransactionKind::PrincipalReturn => "principal_return",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "investment" => Ok(TransactionKind::Investment),
            "profit" => Ok(TransactionKind::Profit),
            "principal_return" => Ok(TransactionKind::PrincipalReturn),
            other => Err(ConfigurationError::UnknownTransactionKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status recorded on every entry this crate writes.
pub const TRANSACTION_STATUS_COMPLETED: &str = "completed";

/// One logged balance mutation. `amount` is signed: debits are negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEntry {
    pub id: i64,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub position_id: Option<PositionId>,
    pub period_index: Option<PeriodIndex>,
    pub status: String,
    pub created_at: TimeMs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_storage_name() {
        for kind in [
            TransactionKind::Deposit,
            TransactionKind::Investment,
            TransactionKind::Profit,
            TransactionKind::PrincipalReturn,
        ] {
            assert_eq!(TransactionKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&TransactionKind::PrincipalReturn).unwrap();
        assert_eq!(json, "\"principal_return\"");
    }
}
