//! Database module for SQLite persistence
//!
//! Owner-scoped storage for projects, timer sessions and device sync cursors.

mod cursors;
mod projects;
mod schema;
mod sessions;

pub use cursors::*;
pub use projects::*;
pub use schema::*;
pub use sessions::*;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Ownership and state of a stored record, looked up by id alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub owner_id: Uuid,
    pub origin_device: String,
    pub deleted: bool,
}

/// Create a new database connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    // Every connection to an in-memory database is a separate database
    let in_memory = database_url.contains(":memory:");
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections)
    };

    let pool = pool_options.connect_with(options).await?;

    initialize_schema(&pool).await?;

    Ok(pool)
}

/// Current server time at storage precision
pub fn server_now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

pub(crate) fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| AppError::internal(format!("Stored timestamp out of range: {}", micros)))
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| AppError::internal(format!("Stored id {:?} is invalid: {}", raw, e)))
}

/// Ids bound into one `IN (...)` list, well under SQLite's variable limit
pub(crate) const MAX_IDS_PER_STATEMENT: usize = 500;

/// Comma-separated `?` placeholders for an `IN (...)` clause
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    create_pool("sqlite::memory:", 1).await.unwrap()
}
