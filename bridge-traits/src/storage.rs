//! Settings Storage Abstractions
//!
//! Key-value persistence used for small pieces of durable core state: the
//! configured source preference order and the shuffle session fields.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value settings storage trait
///
/// Abstracts platform-specific preferences storage:
/// - Desktop: SQLite file (`bridge-desktop::SqliteSettingsStore`)
/// - Mobile: UserDefaults / DataStore
/// - Tests: `bridge-desktop::MemorySettingsStore`
///
/// Getters return `Ok(None)` for missing keys and an error when the stored
/// value has a different type than requested.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_session(store: &dyn SettingsStore) -> Result<()> {
///     store.set_i64("shuffle.seed", 1_700_000_000_000).await?;
///     store.set_bool("shuffle.active", true).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool>;

    /// List all setting keys starting with `prefix`, sorted
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Begin a transaction for atomic multi-key updates
    ///
    /// Nothing is visible to readers until [`SettingsTransaction::commit`]
    /// succeeds. Dropping an uncommitted transaction discards its writes.
    async fn begin_transaction(&self) -> Result<Box<dyn SettingsTransaction + Send>>;
}

/// Transaction for atomic settings updates
#[async_trait]
pub trait SettingsTransaction: Send {
    async fn set_string(&mut self, key: &str, value: &str) -> Result<()>;

    async fn set_bool(&mut self, key: &str, value: bool) -> Result<()>;

    async fn set_i64(&mut self, key: &str, value: i64) -> Result<()>;

    async fn delete(&mut self, key: &str) -> Result<()>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}
