//! Distribution ledger guard: at-most-once credit per `(position, period)`.
//!
//! A credit is one unit of work:
//! 1. insert the period credit record (`ON CONFLICT DO NOTHING`);
//! 2. if nothing was inserted the period is already credited, roll back;
//! 3. otherwise bump the position's accumulated profit and the owner's balance,
//!    append a `profit` log entry, and commit.
//!
//! Once a term's full-term amount has been paid out, later periods still get a
//! credit record (with amount zero) so coverage stays complete, but move no money.
//!
//! The insert is the first statement of the unit, so SQLite takes the write
//! lock before anything is read and overlapping runs serialize on it.

use crate::db::repo::NewTransaction;
use crate::db::Repository;
use crate::domain::{
    ConfigurationError, Decimal, PeriodCredit, PeriodIndex, Position, TimeMs, TransactionKind,
};
use crate::engine::PeriodSchedule;
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use tracing::debug;

use super::report::DistributionError;

/// Result of trying to reserve a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The credit record was inserted; the caller must finish the unit of work.
    Reserved,
    /// A credit record already exists. Nothing was written.
    AlreadyCredited,
}

/// Result of a full guarded credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    /// Committed, with the amount actually credited.
    Credited(Decimal),
    AlreadyCredited,
    /// The position left `active` before the unit ran; nothing was written.
    PositionInactive,
}

#[derive(Clone)]
pub struct LedgerGuard {
    repo: Arc<Repository>,
}

impl LedgerGuard {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Reserve `(position, period)` inside the caller's unit of work.
    ///
    /// # Errors
    /// Returns an error if the insert fails for a reason other than the
    /// uniqueness conflict.
    pub async fn reserve(
        conn: &mut SqliteConnection,
        credit: &PeriodCredit,
    ) -> Result<Reservation, sqlx::Error> {
        if Repository::insert_period_credit(conn, credit).await? {
            Ok(Reservation::Reserved)
        } else {
            Ok(Reservation::AlreadyCredited)
        }
    }

    /// Credit one period of `position` as a single all-or-nothing unit of work.
    ///
    /// # Errors
    /// Returns a [`DistributionError`] if the unit could not be committed; in
    /// that case nothing from this unit is visible.
    pub async fn credit_period(
        &self,
        position: &Position,
        schedule: &PeriodSchedule,
        period_index: PeriodIndex,
    ) -> Result<CreditOutcome, DistributionError> {
        let amount = position.credit_amount(period_index);
        let amount_minor = amount
            .to_minor_units()
            .ok_or(ConfigurationError::AmountOverflow)?;
        let credit = PeriodCredit {
            position_id: position.id,
            period_index,
            amount,
            period_time: schedule.period_time(period_index),
            created_at: TimeMs::now(),
        };

        let mut tx = self.repo.begin().await?;

        if Self::reserve(&mut *tx, &credit).await? == Reservation::AlreadyCredited {
            tx.rollback().await?;
            debug!(
                position_id = %position.id,
                period_index,
                "Period already credited"
            );
            return Ok(CreditOutcome::AlreadyCredited);
        }

        if !Repository::add_accumulated_profit(&mut *tx, position.id, amount_minor).await? {
            tx.rollback().await?;
            debug!(
                position_id = %position.id,
                period_index,
                "Position no longer active, credit abandoned"
            );
            return Ok(CreditOutcome::PositionInactive);
        }

        if amount_minor > 0 {
            Repository::adjust_balance(&mut *tx, position.user_id.as_str(), amount_minor).await?;
            Repository::append_transaction(
                &mut *tx,
                &NewTransaction {
                    user_id: position.user_id.as_str(),
                    kind: TransactionKind::Profit,
                    amount_minor,
                    position_id: Some(position.id),
                    period_index: Some(period_index),
                },
            )
            .await?;
        }

        tx.commit().await?;
        Ok(CreditOutcome::Credited(amount))
    }
}
