use anyhow::Context;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};
use std::path::Path;

// Key-value table mirroring what the browser kept in local storage.
const MIGRATIONS_SQL: &str = "
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
";

#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    /// Opens (creating if needed) the SQLite file at `db_path` and runs migrations.
    pub async fn open(db_path: &Path) -> Result<Self, anyhow::Error> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create store directory")?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        log::info!("Connecting to local store: {}", db_url);

        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            log::info!("Local store not found, creating...");
            Sqlite::create_database(&db_url)
                .await
                .context("Failed to create local store")?;
        }

        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite local store")?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// A throwaway store living in memory. A single connection keeps every
    /// query on the same database.
    pub async fn in_memory() -> Result<Self, anyhow::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory local store")?;
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), anyhow::Error> {
        log::debug!("Running local store migrations...");
        sqlx::query(MIGRATIONS_SQL)
            .execute(pool)
            .await
            .context("Failed to run local store migrations")?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read '{}' from local store", key))?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        log::debug!("Writing '{}' to local store", key);
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write '{}' to local store", key))?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), anyhow::Error> {
        let result = sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to remove '{}' from local store", key))?;

        if result.rows_affected() == 0 {
            log::debug!("Local store had no '{}' to remove", key);
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn remove_all(&self, keys: &[&str]) -> Result<(), anyhow::Error> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}
