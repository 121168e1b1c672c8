//! SQLite pool construction. The orchestrator runs against a single local
//! database file; every connection gets the same pragmas so reservation
//! writes, session upserts, and audit inserts behave identically.

use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use casona_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Opens the pool described by the application config. Config validation
/// already guarantees a `sqlite:` URL.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// Lower-level entry for tests and tools that bypass the config layer.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // Reservations and turns reference customers; WAL lets a
                // turn read while the audit sink writes.
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}
