//! SQLite-backed key/value storage.
//!
//! This is the device's local persistence: a flat string-to-string map that
//! survives restarts, in the spirit of browser local storage. The report
//! queue lives under a single key as a JSON document (see [`crate::queue`]).
//!
//! Callers depend on the [`KeyValueStore`] trait rather than on SQLite, so the
//! queue and reconciler can be exercised against instrumented stores in tests.

use std::future::Future;

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Persistent string map used by the report queue.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get_item(&self, key: &str) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;

    /// Replace the value stored under `key`.
    fn set_item(&self, key: &str, value: &str) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Delete `key`. Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:resq-relay.db?mode=rwc" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS local_storage (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl KeyValueStore for Storage {
    async fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT value FROM local_storage WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("value")))
    }

    /// A single upsert statement, so readers never observe a partial write.
    async fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO local_storage (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            DELETE FROM local_storage WHERE key = ?
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
