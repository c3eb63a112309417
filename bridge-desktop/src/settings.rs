//! Settings Storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{SettingsStore, SettingsTransaction},
};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, warn};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        value_type TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

const UPSERT: &str = r#"
    INSERT INTO settings (key, value, value_type, updated_at)
    VALUES (?, ?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET
        value = excluded.value,
        value_type = excluded.value_type,
        updated_at = excluded.updated_at
"#;

/// Stored type tag, kept next to each value so reads can reject mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    String,
    Bool,
    I64,
}

impl ValueKind {
    fn as_str(self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Bool => "bool",
            ValueKind::I64 => "i64",
        }
    }
}

fn upsert<'q>(key: &'q str, value: String, kind: ValueKind) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    sqlx::query(UPSERT)
        .bind(key)
        .bind(value)
        .bind(kind.as_str())
        .bind(chrono::Utc::now().timestamp())
}

fn db_error(context: &str, err: sqlx::Error) -> BridgeError {
    BridgeError::DatabaseError(format!("{}: {}", context, err))
}

fn parse<T>(key: &str, raw: String, kind: ValueKind) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| {
        BridgeError::OperationFailed(format!(
            "Stored {} for '{}' is unreadable: {}",
            kind.as_str(),
            key,
            e
        ))
    })
}

/// SQLite-backed settings store implementation
///
/// Every value is stored as text with a type tag. Reading a key with the wrong
/// getter returns [`BridgeError::TypeMismatch`] rather than coercing.
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    /// Open (or create) the settings database at `db_path`.
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| db_error("Failed to open settings database", e))?;

        Self::init(pool).await.inspect(|_| {
            debug!(path = ?db_path, "Initialized settings store");
        })
    }

    /// Create an in-memory settings store.
    ///
    /// Pinned to a single connection: every SQLite `:memory:` connection is a
    /// separate database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| db_error("Failed to open in-memory settings database", e))?;

        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| db_error("Failed to create settings table", e))?;
        Ok(Self { pool })
    }

    async fn set_value(&self, key: &str, value: String, kind: ValueKind) -> Result<()> {
        upsert(key, value, kind)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to store setting", e))?;

        debug!(key = key, value_type = kind.as_str(), "Stored setting");
        Ok(())
    }

    async fn get_value(&self, key: &str, expected: ValueKind) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value, value_type FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to read setting", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let value: String = row.get(0);
        let value_type: String = row.get(1);

        if value_type != expected.as_str() {
            warn!(
                key = key,
                expected = expected.as_str(),
                actual = %value_type,
                "Setting type mismatch"
            );
            return Err(BridgeError::TypeMismatch {
                key: key.to_string(),
                expected: expected.as_str().to_string(),
                actual: value_type,
            });
        }

        Ok(Some(value))
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set_value(key, value.to_string(), ValueKind::String).await
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        self.get_value(key, ValueKind::String).await
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set_value(key, value.to_string(), ValueKind::Bool).await
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get_value(key, ValueKind::Bool)
            .await?
            .map(|raw| parse(key, raw, ValueKind::Bool))
            .transpose()
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set_value(key, value.to_string(), ValueKind::I64).await
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        self.get_value(key, ValueKind::I64)
            .await?
            .map(|raw| parse(key, raw, ValueKind::I64))
            .transpose()
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete setting", e))?;

        debug!(key = key, "Deleted setting");
        Ok(())
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to check key", e))?;

        Ok(row.is_some())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM settings WHERE instr(key, ?) = 1 ORDER BY key")
            .bind(prefix)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list keys", e))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn SettingsTransaction + Send>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        Ok(Box::new(SqliteSettingsTransaction { tx: Some(tx) }))
    }
}

struct SqliteSettingsTransaction {
    tx: Option<sqlx::Transaction<'static, Sqlite>>,
}

impl SqliteSettingsTransaction {
    fn open(&mut self) -> Result<&mut sqlx::Transaction<'static, Sqlite>> {
        self.tx.as_mut().ok_or_else(|| {
            BridgeError::OperationFailed("Transaction already finished".to_string())
        })
    }

    async fn write(&mut self, key: &str, value: String, kind: ValueKind) -> Result<()> {
        let tx = self.open()?;
        upsert(key, value, kind)
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to stage setting", e))?;
        Ok(())
    }
}

#[async_trait]
impl SettingsTransaction for SqliteSettingsTransaction {
    async fn set_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.write(key, value.to_string(), ValueKind::String).await
    }

    async fn set_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.write(key, value.to_string(), ValueKind::Bool).await
    }

    async fn set_i64(&mut self, key: &str, value: i64) -> Result<()> {
        self.write(key, value.to_string(), ValueKind::I64).await
    }

    async fn delete(&mut self, key: &str) -> Result<()> {
        let tx = self.open()?;
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to stage delete", e))?;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| {
            BridgeError::OperationFailed("Transaction already finished".to_string())
        })?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit settings", e))?;

        debug!("Committed settings transaction");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| {
            BridgeError::OperationFailed("Transaction already finished".to_string())
        })?;

        tx.rollback()
            .await
            .map_err(|e| db_error("Failed to roll back settings", e))?;

        debug!("Rolled back settings transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_string_round_trip_and_delete() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();

        store
            .set_string("library.source_preference_order", "local,subsonic")
            .await
            .unwrap();
        assert_eq!(
            store
                .get_string("library.source_preference_order")
                .await
                .unwrap(),
            Some("local,subsonic".to_string())
        );

        store.delete("library.source_preference_order").await.unwrap();
        assert!(!store.has_key("library.source_preference_order").await.unwrap());
    }

    #[tokio::test]
    async fn test_typed_values() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();

        store.set_bool("shuffle.active", true).await.unwrap();
        store.set_i64("shuffle.seed", i64::MIN + 7).await.unwrap();

        assert_eq!(store.get_bool("shuffle.active").await.unwrap(), Some(true));
        assert_eq!(
            store.get_i64("shuffle.seed").await.unwrap(),
            Some(i64::MIN + 7)
        );
        assert_eq!(store.get_i64("shuffle.cursor").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_reported() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();
        store.set_string("shuffle.seed", "not a number").await.unwrap();

        let err = store.get_i64("shuffle.seed").await.unwrap_err();
        assert!(matches!(err, BridgeError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_list_keys_by_prefix() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();
        store.set_i64("shuffle.cursor", 3).await.unwrap();
        store.set_i64("shuffle.seed", 9).await.unwrap();
        store.set_string("library.order", "local").await.unwrap();

        let keys = store.list_keys("shuffle.").await.unwrap();
        assert_eq!(keys, vec!["shuffle.cursor", "shuffle.seed"]);
        assert_eq!(store.list_keys("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();
        store.set_i64("shuffle.cursor", 1).await.unwrap();

        let mut tx = store.begin_transaction().await.unwrap();
        tx.set_i64("shuffle.cursor", 2).await.unwrap();
        tx.set_bool("shuffle.active", true).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.get_i64("shuffle.cursor").await.unwrap(), Some(1));
        assert!(!store.has_key("shuffle.active").await.unwrap());

        let mut tx = store.begin_transaction().await.unwrap();
        tx.set_i64("shuffle.cursor", 5).await.unwrap();
        tx.set_string("shuffle.history", "[]").await.unwrap();
        tx.delete("shuffle.active").await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_i64("shuffle.cursor").await.unwrap(), Some(5));
        assert_eq!(
            store.get_string("shuffle.history").await.unwrap(),
            Some("[]".to_string())
        );
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("settings-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("settings.db");

        {
            let store = SqliteSettingsStore::new(path.clone()).await.unwrap();
            store.set_i64("shuffle.seed", 42).await.unwrap();
        }

        let reopened = SqliteSettingsStore::new(path).await.unwrap();
        assert_eq!(reopened.get_i64("shuffle.seed").await.unwrap(), Some(42));

        std::fs::remove_dir_all(dir).ok();
    }
}
