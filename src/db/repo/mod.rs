//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all ledger store operations.
//! Methods are organized across submodules by table:
//! - `positions.rs` - Position reads, the creation flow, and lifecycle updates
//! - `credits.rs` - Period credit inserts (the distribution guard's constraint) and coverage queries
//! - `balances.rs` - Balance aggregates and the append-only transaction log
//!
//! Methods taking a `&mut SqliteConnection` are building blocks for a caller-owned
//! unit of work; pass `&mut *tx` to run them inside a transaction.

mod balances;
mod credits;
mod positions;

pub use balances::NewTransaction;
pub use positions::OpenPositionError;

use crate::domain::{Decimal, TimeMs};
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::Transaction;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Borrow the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a new unit of work. Dropping it without `commit` rolls it back.
    ///
    /// # Errors
    /// Returns an error if no connection can be acquired.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }
}

/// Convert a money amount to the integer minor units stored in the ledger.
///
/// # Errors
/// Returns a decode error if the amount does not fit in an `i64`.
pub(crate) fn minor_units(amount: Decimal) -> Result<i64, sqlx::Error> {
    amount.to_minor_units().ok_or_else(|| {
        sqlx::Error::Decode(format!("amount {} overflows ledger minor units", amount).into())
    })
}

pub(crate) fn now_ms() -> i64 {
    TimeMs::now().as_ms()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Repository;
    use crate::db::migrations::init_db;
    use crate::domain::{Decimal, NewPosition, PeriodUnit, TimeMs, UserId};
    use tempfile::TempDir;

    pub async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    pub fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    pub fn hourly_position(user: &str, principal: &str, total_periods: u32) -> NewPosition {
        NewPosition {
            user_id: UserId::new(user),
            plan_id: "starter".to_string(),
            principal: d(principal),
            period_rate: d("0.001"),
            period_unit: PeriodUnit::Hour,
            total_periods,
            start: TimeMs::new(0),
        }
    }
}
