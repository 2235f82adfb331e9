//! Settings persistence using SQLite
//!
//! Documents are kept in a small key/value table so the stored JSON stays
//! exactly what the presentation layer reads and writes.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use super::{Settings, SettingsError, STORAGE_KEY};

/// Key/value document store for settings
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    /// Open (creating if needed) the settings database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self, sqlx::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create an in-memory store
    pub async fn new_in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Raw persisted document, if any
    pub async fn read_document(&self) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM documents WHERE key = ?")
            .bind(STORAGE_KEY)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    pub async fn write_document(&self, document: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO documents (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')
            "#,
        )
        .bind(STORAGE_KEY)
        .bind(document)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load settings once at startup
    ///
    /// Read failures and corrupt documents fall back to the defaults.
    pub async fn load(&self) -> Settings {
        match self.read_document().await {
            Ok(document) => Settings::load_or_default(document.as_deref()),
            Err(e) => {
                tracing::warn!("failed to read persisted settings: {}", e);
                Settings::default()
            }
        }
    }

    /// Close the pool; later reads and writes fail
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let document = serde_json::to_string(settings)?;
        self.write_document(&document).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Theme;

    #[tokio::test]
    async fn test_empty_store_loads_defaults() {
        let store = SettingsStore::new_in_memory().await.unwrap();
        assert_eq!(store.read_document().await.unwrap(), None);
        assert_eq!(store.load().await, Settings::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = SettingsStore::new_in_memory().await.unwrap();

        let mut settings = Settings::default();
        settings.theme = Theme::Emerald;
        settings.memory_nodes.push("Last discussed: rust...".into());
        store.save(&settings).await.unwrap();

        settings.voice_enabled = false;
        store.save(&settings).await.unwrap();

        assert_eq!(store.load().await, settings);
    }

    #[tokio::test]
    async fn test_corrupt_document_loads_defaults() {
        let store = SettingsStore::new_in_memory().await.unwrap();
        store.write_document("definitely not json").await.unwrap();
        assert_eq!(store.load().await, Settings::default());
    }
}
