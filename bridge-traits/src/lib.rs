//! # Host Bridge Traits
//!
//! Capability traits the federation core needs from its host.
//!
//! ## Overview
//!
//! The core never touches disk or the wall clock directly. Hosts inject:
//!
//! - [`SettingsStore`](storage::SettingsStore) - Key-value persistence for the
//!   source preference order and the resumable shuffle session
//! - [`Clock`](time::Clock) - Time source for shuffle seeds and index timestamps
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! `bridge-desktop` ships SQLite and in-memory settings stores for desktop
//! hosts and tests.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it with enough context (key names,
//! expected types) to act on.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single instance can be shared
//! by the aggregation workers and the shuffle engine.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::storage::SettingsStore;
//! use bridge_traits::error::Result;
//!
//! async fn remember_order(store: &dyn SettingsStore) -> Result<()> {
//!     store
//!         .set_string("library.source_preference_order", "local,subsonic,jellyfin")
//!         .await
//! }
//! ```

pub mod error;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use storage::{SettingsStore, SettingsTransaction};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
