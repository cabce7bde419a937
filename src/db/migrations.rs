//! Ledger store initialization: connection pool, pragmas and schema.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// How long a unit of work waits for the SQLite write lock before failing.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Open (creating if needed) the ledger store at `db_path` and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    init_db_with_connections(db_path, DEFAULT_MAX_CONNECTIONS).await
}

/// Initialize the database with an explicit pool size.
///
/// Concurrent distribution runs each hold a connection per in-flight unit of
/// work, so the pool bounds how many units can wait on the SQLite write lock.
pub async fn init_db_with_connections(
    db_path: &str,
    max_connections: u32,
) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .after_connect(|conn, _meta| Box::pin(async move { configure_connection(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    apply_schema(&pool).await?;

    info!(db_path, max_connections, "Ledger store ready");
    Ok(pool)
}

/// Apply `schema.sql`. Every statement is `IF NOT EXISTS`, so this is safe on
/// every start.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let statements = include_str!("schema.sql")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let mut applied = 0usize;
    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
        applied += 1;
    }

    debug!(statements = applied, "Schema applied");
    Ok(())
}

/// Per-connection pragmas. Foreign keys and the busy timeout are connection
/// scoped in SQLite, so they must be set on every pooled connection.
async fn configure_connection(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    // journal_mode returns the mode actually in effect
    let journal_mode: String = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?
        .get(0);

    sqlx::query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;

    debug!(journal_mode = %journal_mode, "SQLite connection configured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn fresh_pool() -> (SqlitePool, TempDir, String) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("ledger")
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (pool, temp_dir, db_path)
    }

    #[tokio::test]
    async fn test_init_db_creates_file_and_parent_dir() {
        let (_pool, _temp, db_path) = fresh_pool().await;
        assert!(Path::new(&db_path).exists());
    }

    #[tokio::test]
    async fn test_schema_creates_ledger_tables() {
        let (pool, _temp, _) = fresh_pool().await;

        for table in ["balances", "positions", "period_credits", "transactions"] {
            let result: Option<(String,)> =
                sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                    .bind(table)
                    .fetch_optional(&pool)
                    .await
                    .unwrap();
            assert!(result.is_some(), "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_schema_is_reapplicable() {
        let (pool, _temp, _) = fresh_pool().await;
        apply_schema(&pool).await.expect("second apply failed");
    }

    #[tokio::test]
    async fn test_period_credit_primary_key_rejects_duplicates() {
        let (pool, _temp, _) = fresh_pool().await;

        sqlx::query("INSERT INTO balances (user_id, total_balance, created_at) VALUES ('u', 0, 0)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            r#"
            INSERT INTO positions (user_id, plan_id, principal, period_rate, period_unit,
                                   total_periods, start_ms, created_at)
            VALUES ('u', 'p', 100, '0.01', 'hour', 2, 0, 0)
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let insert = "INSERT INTO period_credits (position_id, period_index, amount, period_ms, created_at) VALUES (1, 1, 1, 0, 0)";
        sqlx::query(insert).execute(&pool).await.unwrap();
        let err = sqlx::query(insert).execute(&pool).await.unwrap_err();
        let is_unique = err
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false);
        assert!(is_unique, "expected unique violation, got {err}");
    }

    #[tokio::test]
    async fn test_connection_pragmas() {
        let (pool, _temp, _) = fresh_pool().await;

        let (foreign_keys,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(foreign_keys, 1);

        let (busy_timeout,): (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(busy_timeout, i64::from(BUSY_TIMEOUT_MS));

        // WAL is best-effort; some filesystems fall back.
        let (journal_mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(
            matches!(journal_mode.as_str(), "wal" | "delete"),
            "unexpected journal_mode: {}",
            journal_mode
        );
    }
}
