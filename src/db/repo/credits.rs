//! Period credit records.
//!
//! The `(position_id, period_index)` primary key is the only thing that stops a
//! period from being credited twice.

use crate::domain::{Decimal, PeriodCredit, PeriodIndex, PositionId, TimeMs};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use super::{minor_units, Repository};

impl Repository {
    /// Insert a period credit unless one already exists for `(position, period)`.
    ///
    /// Returns false if the period was already credited; nothing is written in that case.
    ///
    /// # Errors
    /// Returns an error if the insert fails for any reason other than the
    /// uniqueness conflict.
    pub async fn insert_period_credit(
        conn: &mut SqliteConnection,
        credit: &PeriodCredit,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO period_credits (position_id, period_index, amount, period_ms, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(position_id, period_index) DO NOTHING
            "#,
        )
        .bind(credit.position_id.as_i64())
        .bind(i64::from(credit.period_index))
        .bind(minor_units(credit.amount)?)
        .bind(credit.period_time.as_ms())
        .bind(credit.created_at.as_ms())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Credited period indices of a position, ascending.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn credited_period_indices(
        &self,
        id: PositionId,
    ) -> Result<Vec<PeriodIndex>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT period_index FROM period_credits WHERE position_id = ? ORDER BY period_index ASC",
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|row| PeriodIndex::try_from(row.get::<i64, _>("period_index")).ok())
            .collect())
    }

    /// Number of distinct periods in `1..=total_periods` credited to a position.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count_term_credits(
        conn: &mut SqliteConnection,
        id: PositionId,
        total_periods: PeriodIndex,
    ) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(DISTINCT period_index) AS credited
            FROM period_credits
            WHERE position_id = ? AND period_index BETWEEN 1 AND ?
            "#,
        )
        .bind(id.as_i64())
        .bind(i64::from(total_periods))
        .fetch_one(&mut *conn)
        .await?;

        Ok(row.get("credited"))
    }

    /// Every credit record of a position, ascending by period.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_period_credits(
        &self,
        id: PositionId,
    ) -> Result<Vec<PeriodCredit>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT position_id, period_index, amount, period_ms, created_at
            FROM period_credits
            WHERE position_id = ?
            ORDER BY period_index ASC
            "#,
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let period_index = PeriodIndex::try_from(row.get::<i64, _>("period_index")).ok()?;
                Some(PeriodCredit {
                    position_id: PositionId::new(row.get("position_id")),
                    period_index,
                    amount: Decimal::from_minor_units(row.get("amount")),
                    period_time: TimeMs::new(row.get("period_ms")),
                    created_at: TimeMs::new(row.get("created_at")),
                })
            })
            .collect())
    }
}
