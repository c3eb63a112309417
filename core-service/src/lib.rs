//! Core service facade and bootstrap helpers.
//!
//! This crate wires a [`FederationConfig`](core_runtime::config::FederationConfig)
//! into the shared core: one aggregation coordinator, one shuffle engine, the
//! source registry and the search index, all reporting to a single event bus.
//! Desktop apps typically enable the `desktop-shims` feature, which supplies an
//! SQLite settings store when the host does not provide one.
//!
//! ```ignore
//! use core_runtime::config::FederationConfig;
//! use core_service::FederationService;
//!
//! let config = FederationConfig::builder()
//!     .settings_path("/var/lib/app/settings.db")
//!     .source_preference_list("local,jellyfin,subsonic")
//!     .build()?;
//! let service = FederationService::start(config).await?;
//! service.add_source(adapter);
//! let queue = service.start_shuffle(false).await?;
//! ```

pub mod error;
pub mod service;

pub use error::{CoreError, Result};
pub use service::FederationService;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{MemorySettingsStore, SqliteSettingsStore};
