//! Ledger audit: cross-check a position's or an account's stored totals
//! against the credit records and the transaction log.

use crate::db::Repository;
use crate::domain::{Decimal, PeriodIndex, PositionId, PositionStatus, TransactionKind, UserId};
use serde::Serialize;
use std::str::FromStr;

use super::report::DistributionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionAudit {
    pub position_id: PositionId,
    pub user_id: UserId,
    pub status: PositionStatus,
    pub total_periods: i64,
    pub accumulated_profit: Decimal,
    /// Sum of the position's `profit` log entries.
    pub logged_profit: Decimal,
    /// Sum of the position's period credit amounts.
    pub credited_amount: Decimal,
    pub credited_periods: Vec<PeriodIndex>,
    /// Credited indices are exactly `1..=k` for some `k`.
    pub contiguous: bool,
    pub principal_returned: Decimal,
    pub consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAudit {
    pub user_id: UserId,
    pub balance: Decimal,
    /// Sum of every log entry of the user.
    pub logged_total: Decimal,
    pub consistent: bool,
}

/// Audit a single position. Returns None if it does not exist.
///
/// Works on the raw row so misconfigured positions can still be inspected.
///
/// # Errors
/// Returns an error if the position's status is unknown or a query fails.
pub async fn audit_position(
    repo: &Repository,
    id: PositionId,
) -> Result<Option<PositionAudit>, DistributionError> {
    let Some(record) = repo.get_position(id).await? else {
        return Ok(None);
    };
    let status = PositionStatus::from_str(&record.status)?;

    let credits = repo.list_period_credits(id).await?;
    let credited_amount: Decimal = credits.iter().map(|c| c.amount).sum();
    let credited_periods: Vec<PeriodIndex> = credits.iter().map(|c| c.period_index).collect();
    let contiguous = is_contiguous_prefix(&credited_periods);

    let accumulated_profit = Decimal::from_minor_units(record.accumulated_profit_minor);
    let logged_profit = repo
        .sum_position_transactions(id, TransactionKind::Profit)
        .await?;
    let principal_returned = repo
        .sum_position_transactions(id, TransactionKind::PrincipalReturn)
        .await?;

    let principal_ok = match status {
        PositionStatus::Completed => {
            principal_returned == Decimal::from_minor_units(record.principal_minor)
        }
        _ => principal_returned.is_zero(),
    };
    let consistent = accumulated_profit == logged_profit
        && logged_profit == credited_amount
        && contiguous
        && principal_ok;

    Ok(Some(PositionAudit {
        position_id: id,
        user_id: UserId::new(record.user_id),
        status,
        total_periods: record.total_periods,
        accumulated_profit,
        logged_profit,
        credited_amount,
        credited_periods,
        contiguous,
        principal_returned,
        consistent,
    }))
}

/// Audit a user's balance against the transaction log. Returns None if the
/// user has no balance aggregate.
///
/// # Errors
/// Returns an error if a query fails.
pub async fn audit_account(
    repo: &Repository,
    user: &UserId,
) -> Result<Option<AccountAudit>, DistributionError> {
    let Some(balance) = repo.get_balance(user).await? else {
        return Ok(None);
    };
    let logged_total = repo.sum_user_transactions(user).await?;

    Ok(Some(AccountAudit {
        user_id: user.clone(),
        balance,
        logged_total,
        consistent: balance == logged_total,
    }))
}

/// True if `indices` (ascending) is `1, 2, ..., k`.
fn is_contiguous_prefix(indices: &[PeriodIndex]) -> bool {
    indices.iter().zip(1..).all(|(index, expected)| *index == expected)
}
