//! Positions: a user's time-bounded stake earning a flat profit per period.

use crate::domain::{Decimal, PeriodIndex, PositionId, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Accrual period length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Hour,
    Day,
}

impl PeriodUnit {
    /// Length of one period in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        match self {
            PeriodUnit::Hour => HOUR_MS,
            PeriodUnit::Day => DAY_MS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodUnit::Hour => "hour",
            PeriodUnit::Day => "day",
        }
    }
}

impl FromStr for PeriodUnit {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(PeriodUnit::Hour),
            "day" => Ok(PeriodUnit::Day),
            other => Err(ConfigurationError::UnknownPeriodUnit(other.to_string())),
        }
    }
}

impl std::fmt::Display for PeriodUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position status. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Completed,
    Cancelled,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Active => "active",
            PositionStatus::Completed => "completed",
            PositionStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PositionStatus {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PositionStatus::Active),
            "completed" => Ok(PositionStatus::Completed),
            "cancelled" => Ok(PositionStatus::Cancelled),
            other => Err(ConfigurationError::UnknownStatus(other.to_string())),
        }
    }
}

/// A position row that makes it impossible to credit a correct amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("principal must be positive, got {0}")]
    NonPositivePrincipal(Decimal),
    #[error("period rate must be positive, got {0}")]
    NonPositiveRate(Decimal),
    #[error("period rate is not a decimal: {0}")]
    InvalidRate(String),
    #[error("total periods must be positive, got {0}")]
    NonPositiveTotalPeriods(i64),
    #[error("period duration must be positive, got {0}ms")]
    NonPositiveDuration(i64),
    #[error("unknown period unit: {0}")]
    UnknownPeriodUnit(String),
    #[error("unknown position status: {0}")]
    UnknownStatus(String),
    #[error("unknown transaction kind: {0}")]
    UnknownTransactionKind(String),
    #[error("profit per period rounds to zero (principal {principal}, rate {rate})")]
    ZeroCreditAmount { principal: Decimal, rate: Decimal },
    #[error("amount {0} is finer than the smallest currency unit")]
    ExcessPrecision(Decimal),
    #[error("amount overflows the ledger's integer range")]
    AmountOverflow,
}

/// A position row exactly as stored; nothing has been validated yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRecord {
    pub id: i64,
    pub user_id: String,
    pub plan_id: String,
    pub principal_minor: i64,
    pub period_rate: String,
    pub period_unit: String,
    pub total_periods: i64,
    pub start_ms: i64,
    pub status: String,
    pub accumulated_profit_minor: i64,
    pub end_ms: Option<i64>,
}

/// A validated position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: PositionId,
    pub user_id: UserId,
    pub plan_id: String,
    pub principal: Decimal,
    pub period_rate: Decimal,
    pub period_unit: PeriodUnit,
    pub total_periods: u32,
    pub start: TimeMs,
    pub status: PositionStatus,
    pub accumulated_profit: Decimal,
    pub end: Option<TimeMs>,
    /// Flat amount credited per period, already rounded to the currency unit.
    pub period_profit: Decimal,
    /// `principal × rate × total_periods`, rounded once. Accumulated profit never exceeds it.
    pub full_term_profit: Decimal,
}

impl Position {
    /// Amount credited for `period_index`.
    ///
    /// Every period pays [`Position::period_profit`] until the running total
    /// reaches [`Position::full_term_profit`]; the last period pays whatever
    /// remains, so a fully credited term sums to exactly the full-term amount.
    pub fn credit_amount(&self, period_index: PeriodIndex) -> Decimal {
        if period_index == 0 || period_index > self.total_periods {
            return Decimal::zero();
        }
        let paid_before = self
            .period_profit
            .checked_mul_count(i64::from(period_index - 1))
            .unwrap_or(self.full_term_profit);
        let remaining = if paid_before >= self.full_term_profit {
            Decimal::zero()
        } else {
            self.full_term_profit - paid_before
        };
        if period_index == self.total_periods {
            remaining
        } else {
            remaining.min(self.period_profit)
        }
    }

    /// True once the accumulated profit covers the whole term.
    pub fn is_fully_accrued(&self) -> bool {
        self.accumulated_profit >= self.full_term_profit
    }

    /// Nominal time at which the term ends.
    pub fn term_end(&self) -> TimeMs {
        let term_ms = self
            .period_unit
            .duration_ms()
            .saturating_mul(i64::from(self.total_periods));
        self.start.saturating_add_ms(term_ms)
    }
}

impl TryFrom<PositionRecord> for Position {
    type Error = ConfigurationError;

    fn try_from(record: PositionRecord) -> Result<Self, Self::Error> {
        let principal = Decimal::from_minor_units(record.principal_minor);
        let period_rate = Decimal::from_str(&record.period_rate)
            .map_err(|_| ConfigurationError::InvalidRate(record.period_rate.clone()))?;
        let period_unit = PeriodUnit::from_str(&record.period_unit)?;
        let status = PositionStatus::from_str(&record.status)?;
        let total_periods = u32::try_from(record.total_periods)
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigurationError::NonPositiveTotalPeriods(record.total_periods))?;

        let period_profit = period_profit(principal, period_rate)?;
        let full_term_profit = full_term_profit(principal, period_rate, total_periods)?;

        Ok(Position {
            id: PositionId::new(record.id),
            user_id: UserId::new(record.user_id),
            plan_id: record.plan_id,
            principal,
            period_rate,
            period_unit,
            total_periods,
            start: TimeMs::new(record.start_ms),
            status,
            accumulated_profit: Decimal::from_minor_units(record.accumulated_profit_minor),
            end: record.end_ms.map(TimeMs::new),
            period_profit,
            full_term_profit,
        })
    }
}

/// Flat, non-compounding profit for one period: `principal × rate`, rounded half-up once.
///
/// # Errors
/// Returns a [`ConfigurationError`] when either input is non-positive or the
/// rounded amount is zero.
pub fn period_profit(principal: Decimal, rate: Decimal) -> Result<Decimal, ConfigurationError> {
    if !principal.is_positive() {
        return Err(ConfigurationError::NonPositivePrincipal(principal));
    }
    if !rate.is_positive() {
        return Err(ConfigurationError::NonPositiveRate(rate));
    }
    let amount = principal
        .inner()
        .checked_mul(rate.inner())
        .map(Decimal::new)
        .ok_or(ConfigurationError::AmountOverflow)?
        .round_money();
    if !amount.is_positive() {
        return Err(ConfigurationError::ZeroCreditAmount { principal, rate });
    }
    Ok(amount)
}

/// Profit of the whole term: `principal × rate × total_periods`, rounded half-up once.
///
/// # Errors
/// Returns [`ConfigurationError::AmountOverflow`] if the product does not fit.
pub fn full_term_profit(
    principal: Decimal,
    rate: Decimal,
    total_periods: u32,
) -> Result<Decimal, ConfigurationError> {
    principal
        .inner()
        .checked_mul(rate.inner())
        .map(Decimal::new)
        .and_then(|per_period| per_period.checked_mul_count(i64::from(total_periods)))
        .map(|total| total.round_money())
        .ok_or(ConfigurationError::AmountOverflow)
}

/// Input to the position creation flow.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPosition {
    pub user_id: UserId,
    pub plan_id: String,
    pub principal: Decimal,
    pub period_rate: Decimal,
    pub period_unit: PeriodUnit,
    pub total_periods: u32,
    pub start: TimeMs,
}

impl NewPosition {
    /// Reject anything the distribution engine would refuse to credit.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.total_periods == 0 {
            return Err(ConfigurationError::NonPositiveTotalPeriods(0));
        }
        if self.principal.round_money() != self.principal {
            return Err(ConfigurationError::ExcessPrecision(self.principal));
        }
        period_profit(self.principal, self.period_rate)?;
        full_term_profit(self.principal, self.period_rate, self.total_periods)?
            .to_minor_units()
            .ok_or(ConfigurationError::AmountOverflow)?;
        Ok(())
    }
}
