//! Position reads, the position creation flow, and lifecycle updates.

use crate::domain::{
    NewPosition, PositionId, PositionRecord, PositionStatus, TimeMs, TransactionKind,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use thiserror::Error;

use super::{minor_units, now_ms, NewTransaction, Repository};

const POSITION_COLUMNS: &str = r#"
    id, user_id, plan_id, principal, period_rate, period_unit, total_periods,
    start_ms, status, accumulated_profit, end_ms
"#;

/// Why the creation flow refused to open a position.
#[derive(Debug, Error)]
pub enum OpenPositionError {
    #[error(transparent)]
    Invalid(#[from] crate::domain::ConfigurationError),
    #[error("account {0} does not exist")]
    UnknownAccount(String),
    #[error("insufficient balance for account {0}")]
    InsufficientBalance(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

fn record_from_row(row: &SqliteRow) -> PositionRecord {
    PositionRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        plan_id: row.get("plan_id"),
        principal_minor: row.get("principal"),
        period_rate: row.get("period_rate"),
        period_unit: row.get("period_unit"),
        total_periods: row.get("total_periods"),
        start_ms: row.get("start_ms"),
        status: row.get("status"),
        accumulated_profit_minor: row.get("accumulated_profit"),
        end_ms: row.get("end_ms"),
    }
}

impl Repository {
    /// All positions currently `active`, oldest first.
    ///
    /// Rows are returned unvalidated so a single malformed position can be
    /// reported without hiding the rest of the batch.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_active_positions(&self) -> Result<Vec<PositionRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM positions WHERE status = ? ORDER BY id ASC",
            POSITION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(PositionStatus::Active.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    /// Fetch a single position row.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_position(
        &self,
        id: PositionId,
    ) -> Result<Option<PositionRecord>, sqlx::Error> {
        let sql = format!("SELECT {} FROM positions WHERE id = ?", POSITION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(record_from_row))
    }

    /// Position creation flow: debit the owner's balance by the principal,
    /// insert an `active` position and log an `investment` transaction, atomically.
    ///
    /// # Errors
    /// Returns an error if the position is invalid, the account is missing or
    /// underfunded, or the unit of work fails.
    pub async fn open_position(
        &self,
        new_position: &NewPosition,
    ) -> Result<PositionId, OpenPositionError> {
        new_position.validate()?;
        let principal = minor_units(new_position.principal)?;
        let user = new_position.user_id.as_str();

        let mut tx = self.pool.begin().await?;

        let debited = sqlx::query(
            r#"
            UPDATE balances SET total_balance = total_balance - ?
            WHERE user_id = ? AND total_balance >= ?
            "#,
        )
        .bind(principal)
        .bind(user)
        .bind(principal)
        .execute(&mut *tx)
        .await?;

        if debited.rows_affected() == 0 {
            let exists: Option<(String,)> =
                sqlx::query_as("SELECT user_id FROM balances WHERE user_id = ?")
                    .bind(user)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match exists {
                Some(_) => OpenPositionError::InsufficientBalance(user.to_string()),
                None => OpenPositionError::UnknownAccount(user.to_string()),
            });
        }

        let created_at = now_ms();
        let result = sqlx::query(
            r#"
            INSERT INTO positions (
                user_id, plan_id, principal, period_rate, period_unit, total_periods,
                start_ms, status, accumulated_profit, end_ms, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, ?)
            "#,
        )
        .bind(user)
        .bind(&new_position.plan_id)
        .bind(principal)
        .bind(new_position.period_rate.to_canonical_string())
        .bind(new_position.period_unit.as_str())
        .bind(i64::from(new_position.total_periods))
        .bind(new_position.start.as_ms())
        .bind(PositionStatus::Active.as_str())
        .bind(created_at)
        .execute(&mut *tx)
        .await?;
        let position_id = PositionId::new(result.last_insert_rowid());

        Self::append_transaction(
            &mut *tx,
            &NewTransaction {
                user_id: user,
                kind: TransactionKind::Investment,
                amount_minor: -principal,
                position_id: Some(position_id),
                period_index: None,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            position_id = %position_id,
            user_id = %user,
            principal = %new_position.principal,
            "Opened position"
        );
        Ok(position_id)
    }

    /// Add `amount_minor` to an active position's accumulated profit.
    ///
    /// Returns false (and changes nothing) if the position is no longer active.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn add_accumulated_profit(
        conn: &mut SqliteConnection,
        id: PositionId,
        amount_minor: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE positions SET accumulated_profit = accumulated_profit + ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(amount_minor)
        .bind(id.as_i64())
        .bind(PositionStatus::Active.as_str())
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Transition `active → completed`, stamping the end time.
    ///
    /// Returns false if the position was not active; the status check and the
    /// write are a single statement, so two racing completions cannot both win.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn mark_completed(
        conn: &mut SqliteConnection,
        id: PositionId,
        end: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE positions SET status = ?, end_ms = ? WHERE id = ? AND status = ?",
        )
        .bind(PositionStatus::Completed.as_str())
        .bind(end.as_ms())
        .bind(id.as_i64())
        .bind(PositionStatus::Active.as_str())
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
