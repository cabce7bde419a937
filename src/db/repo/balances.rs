//! Balance aggregates and the append-only transaction log.
//!
//! Every balance mutation goes through [`Repository::adjust_balance`], an
//! atomic `total_balance = total_balance + ?` in SQL, and is paired with exactly
//! one [`Repository::append_transaction`] in the same unit of work.

use crate::domain::{
    Decimal, PeriodIndex, PositionId, TimeMs, TransactionEntry, TransactionKind, UserId,
    TRANSACTION_STATUS_COMPLETED,
};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

use super::{minor_units, now_ms, Repository};

/// A transaction log entry about to be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewTransaction<'a> {
    pub user_id: &'a str,
    pub kind: TransactionKind,
    /// Signed amount in minor units; debits are negative.
    pub amount_minor: i64,
    pub position_id: Option<PositionId>,
    pub period_index: Option<PeriodIndex>,
}

impl Repository {
    /// Provision a balance aggregate for a new user.
    ///
    /// A non-zero opening balance is logged as a `deposit` so the balance stays
    /// equal to the sum of its transactions. Provisioning an existing user is a no-op.
    ///
    /// Returns true if the account was created.
    ///
    /// # Errors
    /// Returns an error if the unit of work fails.
    pub async fn provision_account(
        &self,
        user: &UserId,
        opening_balance: Decimal,
    ) -> Result<bool, sqlx::Error> {
        let opening = minor_units(opening_balance)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO balances (user_id, total_balance, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(user.as_str())
        .bind(opening)
        .bind(now_ms())
        .execute(&mut *tx)
        .await?;

        let created = result.rows_affected() > 0;
        if created && opening != 0 {
            Self::append_transaction(
                &mut *tx,
                &NewTransaction {
                    user_id: user.as_str(),
                    kind: TransactionKind::Deposit,
                    amount_minor: opening,
                    position_id: None,
                    period_index: None,
                },
            )
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    /// Current total balance, or None if the user has no balance aggregate.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_balance(&self, user: &UserId) -> Result<Option<Decimal>, sqlx::Error> {
        let row = sqlx::query("SELECT total_balance FROM balances WHERE user_id = ?")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Decimal::from_minor_units(r.get::<i64, _>("total_balance"))))
    }

    /// Atomically add `delta_minor` (possibly negative) to a user's balance.
    ///
    /// # Errors
    /// Returns `RowNotFound` if the user has no balance aggregate, or the
    /// underlying error if the update fails.
    pub async fn adjust_balance(
        conn: &mut SqliteConnection,
        user: &str,
        delta_minor: i64,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            "UPDATE balances SET total_balance = total_balance + ? WHERE user_id = ?",
        )
        .bind(delta_minor)
        .bind(user)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    /// Append one entry to the transaction log, returning its id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn append_transaction(
        conn: &mut SqliteConnection,
        entry: &NewTransaction<'_>,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions (
                user_id, kind, amount, position_id, period_index, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.kind.as_str())
        .bind(entry.amount_minor)
        .bind(entry.position_id.map(|id| id.as_i64()))
        .bind(entry.period_index.map(i64::from))
        .bind(TRANSACTION_STATUS_COMPLETED)
        .bind(now_ms())
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All transaction log entries of a user, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_transactions(
        &self,
        user: &UserId,
    ) -> Result<Vec<TransactionEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, kind, amount, position_id, period_index, status, created_at
            FROM transactions
            WHERE user_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .iter()
            .filter_map(|row| {
                let id: i64 = row.get("id");
                let kind_str: String = row.get("kind");
                let kind = match TransactionKind::from_str(&kind_str) {
                    Ok(kind) => kind,
                    Err(e) => {
                        warn!(
                            transaction_id = id,
                            kind = %kind_str,
                            error = %e,
                            "Skipping transaction with unknown kind"
                        );
                        return None;
                    }
                };
                let period_index: Option<i64> = row.get("period_index");

                Some(TransactionEntry {
                    id,
                    user_id: UserId::new(row.get::<String, _>("user_id")),
                    kind,
                    amount: Decimal::from_minor_units(row.get("amount")),
                    position_id: row.get::<Option<i64>, _>("position_id").map(PositionId::new),
                    period_index: period_index.and_then(|i| PeriodIndex::try_from(i).ok()),
                    status: row.get("status"),
                    created_at: TimeMs::new(row.get("created_at")),
                })
            })
            .collect();

        Ok(entries)
    }

    /// Sum of a position's log entries of one kind.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn sum_position_transactions(
        &self,
        id: PositionId,
        kind: TransactionKind,
    ) -> Result<Decimal, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS total
            FROM transactions
            WHERE position_id = ? AND kind = ?
            "#,
        )
        .bind(id.as_i64())
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(Decimal::from_minor_units(row.get("total")))
    }

    /// Sum of every log entry of a user.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn sum_user_transactions(&self, user: &UserId) -> Result<Decimal, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0) AS total FROM transactions WHERE user_id = ?",
        )
        .bind(user.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(Decimal::from_minor_units(row.get("total")))
    }
}
