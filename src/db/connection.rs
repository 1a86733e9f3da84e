//! Database connection management using sqlx

use crate::error::{RagError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub type DbPool = PgPool;

/// Initialize a small connection pool and check it answers.
pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
        .map_err(|e| RagError::Database(format!("Failed to connect: {}", e)))?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| RagError::Database(format!("Connection check failed: {}", e)))?;

    Ok(pool)
}
