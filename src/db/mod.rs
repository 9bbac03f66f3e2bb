//! # Database Module
//!
//! This module organizes all database-related code into submodules:
//! - `models`: Data structures (User, PasskeyCredential)
//! - `users`: CRUD operations for users
//! - `credentials`: CRUD operations for passkey credentials
//!
//! The stores give single-row consistency only. Nothing here spans the
//! identity provider; the registration flow coordinates the two.

pub mod credentials;
pub mod models;
pub mod users;

use anyhow::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Connect to the database and run the embedded migrations
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let pool = SqlitePool::connect(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Private in-memory database with the schema applied
///
/// Every SQLite connection to `:memory:` opens its own database, so the pool
/// is pinned to one connection that never gets recycled.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}
