//! Ledger store on SQLite.
//!
//! This module provides:
//! - Pool setup, per-connection pragmas and the embedded schema
//! - The `Repository`: positions, period credits, balances and the transaction log

pub mod migrations;
pub mod repo;

pub use migrations::{init_db, init_db_with_connections};
pub use repo::Repository;
