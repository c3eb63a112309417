//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - [`SqliteSettingsStore`] - durable `SettingsStore` backed by an SQLite file
//! - [`MemorySettingsStore`] - process-local `SettingsStore` for tests and
//!   ephemeral sessions
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::SqliteSettingsStore;
//! use bridge_traits::SettingsStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings: Arc<dyn SettingsStore> =
//!         Arc::new(SqliteSettingsStore::new("/var/lib/federation/settings.db".into()).await.unwrap());
//!     // Hand `settings` to the federation config builder.
//! }
//! ```

mod memory;
mod settings;

pub use memory::MemorySettingsStore;
pub use settings::SqliteSettingsStore;
