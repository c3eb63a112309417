//! # Core Configuration Module
//!
//! Configuration for the federation core.
//!
//! ## Overview
//!
//! The configuration system uses a builder to construct a [`FederationConfig`]
//! holding the injected host capabilities and the tuning of every subsystem.
//! Validation is fail-fast: `build()` rejects unusable values with
//! [`Error::Config`] and missing capabilities with [`Error::CapabilityMissing`].
//!
//! ## Required Dependencies
//!
//! - `SettingsStore` - persisted shuffle session and source preference order
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `Clock` - shuffle seeds and search index timestamps (default: system time)
//!
//! When the `desktop-shims` feature is enabled and a settings path is given, an
//! SQLite-backed `SettingsStore` is created automatically.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::FederationConfig;
//! use std::sync::Arc;
//!
//! let config = FederationConfig::builder()
//!     .settings_store(Arc::new(MySettingsStore))
//!     .source_preference_list("jellyfin,local,subsonic")
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::FederationConfig;
//!
//! // No settings store and no desktop default to fall back to.
//! let config = FederationConfig::builder()
//!     .build()
//!     .expect("Should fail - missing SettingsStore");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, SettingsStore, SystemClock};
use core_library::SourcePreference;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Settings key holding the comma-separated source preference order.
pub const SOURCE_PREFERENCE_KEY: &str = "library.source_preference_order";

/// Batch sizes and thresholds of the shuffle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShuffleTuning {
    /// Songs returned when a session starts
    pub initial_batch: usize,
    /// Songs returned per refill
    pub append_batch: usize,
    /// Consumed songs after which a refill is produced
    pub refill_threshold: usize,
    /// Remaining queue length at or below which a refill is produced
    pub append_threshold: usize,
    /// Length of the recent-history FIFO
    pub history_limit: usize,
    /// Default affinity mix length
    pub mix_length: usize,
    /// Number of made-for-you seed tiles
    pub mix_tile_limit: usize,
}

impl Default for ShuffleTuning {
    fn default() -> Self {
        Self {
            initial_batch: 100,
            append_batch: 50,
            refill_threshold: 50,
            append_threshold: 50,
            history_limit: 20,
            mix_length: 40,
            mix_tile_limit: 4,
        }
    }
}

impl ShuffleTuning {
    fn validate(&self) -> Result<()> {
        let fields = [
            ("initial_batch", self.initial_batch),
            ("append_batch", self.append_batch),
            ("refill_threshold", self.refill_threshold),
            ("append_threshold", self.append_threshold),
            ("history_limit", self.history_limit),
            ("mix_length", self.mix_length),
            ("mix_tile_limit", self.mix_tile_limit),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(Error::Config(format!(
                    "Shuffle {name} must be greater than 0"
                )));
            }
        }
        Ok(())
    }
}

/// Scheduling and retry policy for backend loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationTuning {
    /// Size of the worker pool running backend loads
    pub worker_threads: usize,
    /// Per-attempt deadline for one backend load
    pub load_timeout: Duration,
    /// Extra attempts after the first failure
    pub retry_attempts: u32,
    /// Delay before the first retry; doubles per attempt
    pub retry_backoff: Duration,
}

impl Default for AggregationTuning {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            load_timeout: Duration::from_secs(30),
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl AggregationTuning {
    fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::Config(
                "Aggregation worker_threads must be greater than 0".to_string(),
            ));
        }
        if self.load_timeout.is_zero() {
            return Err(Error::Config(
                "Aggregation load_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Core configuration for the federation engine.
///
/// Use [`FederationConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct FederationConfig {
    /// Merge tie-break order
    pub source_preference: SourcePreference,

    pub shuffle: ShuffleTuning,

    pub aggregation: AggregationTuning,

    /// Key-value persistence (required)
    pub settings_store: Arc<dyn SettingsStore>,

    /// Time source for seeds and timestamps
    pub clock: Arc<dyn Clock>,

    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
}

impl std::fmt::Debug for FederationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationConfig")
            .field("source_preference", &self.source_preference)
            .field("shuffle", &self.shuffle)
            .field("aggregation", &self.aggregation)
            .field("settings_store", &"SettingsStore { ... }")
            .field("clock", &"Clock { ... }")
            .field("event_buffer", &self.event_buffer)
            .finish()
    }
}

impl FederationConfig {
    pub fn builder() -> FederationConfigBuilder {
        FederationConfigBuilder::default()
    }

    /// Checks every tuning value.
    pub fn validate(&self) -> Result<()> {
        self.shuffle.validate()?;
        self.aggregation.validate()?;
        if self.event_buffer == 0 {
            return Err(Error::Config(
                "Event buffer must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for shuffle sessions and source preferences. \
                 Desktop: enable the 'desktop-shims' feature and set a settings path to use the default SqliteSettingsStore. \
                 Mobile: inject platform-native settings (UserDefaults/DataStore)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(settings_path: Option<&Path>) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    let path = settings_path.map(Path::to_path_buf).ok_or_else(|| Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "No SettingsStore injected and no settings path set. \
                  Use .settings_path() to create the default SqliteSettingsStore."
            .to_string(),
    })?;

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Runtime::new().map_err(|e| {
            Error::Internal(format!(
                "Failed to create Tokio runtime for default settings store: {}",
                e
            ))
        })?;

        Ok(runtime.block_on(SqliteSettingsStore::new(path))?)
    };

    // A runtime cannot be started from inside another one.
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default SettingsStore".to_string(),
                )
            })??,
        Err(_) => init_store(path)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_settings_path: Option<&Path>) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

/// Builder for [`FederationConfig`].
#[derive(Default)]
pub struct FederationConfigBuilder {
    source_preference: Option<SourcePreference>,
    source_preference_list: Option<String>,
    shuffle: Option<ShuffleTuning>,
    aggregation: Option<AggregationTuning>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    settings_path: Option<PathBuf>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer: Option<usize>,
}

impl FederationConfigBuilder {
    /// Sets the merge tie-break order.
    ///
    /// Default: local, subsonic, jellyfin
    pub fn source_preference(mut self, preference: SourcePreference) -> Self {
        self.source_preference = Some(preference);
        self.source_preference_list = None;
        self
    }

    /// Sets the merge tie-break order from a comma-separated list of wire ids.
    ///
    /// Parsed in [`build()`](FederationConfigBuilder::build); unknown ids fail
    /// the build.
    ///
    /// ```
    /// use core_runtime::config::FederationConfig;
    ///
    /// let builder = FederationConfig::builder()
    ///     .source_preference_list("jellyfin, local");
    /// ```
    pub fn source_preference_list(mut self, list: impl Into<String>) -> Self {
        self.source_preference_list = Some(list.into());
        self.source_preference = None;
        self
    }

    pub fn shuffle(mut self, tuning: ShuffleTuning) -> Self {
        self.shuffle = Some(tuning);
        self
    }

    pub fn aggregation(mut self, tuning: AggregationTuning) -> Self {
        self.aggregation = Some(tuning);
        self
    }

    /// Sets the settings store implementation (required unless a desktop
    /// default can be created).
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Path of the SQLite file backing the desktop default settings store.
    pub fn settings_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Default: 100
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = Some(capacity);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<FederationConfig> {
        let source_preference = match (self.source_preference, self.source_preference_list) {
            (Some(preference), _) => preference,
            (None, Some(list)) => SourcePreference::parse(&list)
                .map_err(|e| Error::Config(e.to_string()))?,
            (None, None) => SourcePreference::default(),
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(self.settings_path.as_deref())?,
        };

        let config = FederationConfig {
            source_preference,
            shuffle: self.shuffle.unwrap_or_default(),
            aggregation: self.aggregation.unwrap_or_default(),
            settings_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer: self.event_buffer.unwrap_or(100),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::MemorySettingsStore;
    use bridge_traits::ManualClock;
    use core_library::SourceKind;

    fn store() -> Arc<dyn SettingsStore> {
        Arc::new(MemorySettingsStore::new())
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_settings_store() {
        let result = FederationConfig::builder().build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("SettingsStore"));
        assert!(err_msg.contains("shuffle sessions"));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_default_settings() {
        let base = std::env::temp_dir().join(format!("core-runtime-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&base).unwrap();

        let config = FederationConfig::builder()
            .settings_path(base.join("settings.db"))
            .build()
            .expect("desktop default should succeed");

        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            config.settings_store.set_i64("shuffle.seed", 3).await.unwrap();
            assert_eq!(config.settings_store.get_i64("shuffle.seed").await.unwrap(), Some(3));
        });

        drop(config);
        let _ = std::fs::remove_dir_all(&base);
    }

    #[test]
    fn test_defaults() {
        let config = FederationConfig::builder()
            .settings_store(store())
            .build()
            .unwrap();

        assert_eq!(
            config.source_preference.order(),
            &[SourceKind::Local, SourceKind::RemoteA, SourceKind::RemoteB]
        );
        assert_eq!(config.shuffle.initial_batch, 100);
        assert_eq!(config.shuffle.append_batch, 50);
        assert_eq!(config.shuffle.history_limit, 20);
        assert_eq!(config.aggregation.worker_threads, 4);
        assert_eq!(config.aggregation.load_timeout, Duration::from_secs(30));
        assert_eq!(config.event_buffer, 100);
    }

    #[test]
    fn test_preference_list_is_parsed() {
        let config = FederationConfig::builder()
            .settings_store(store())
            .source_preference_list("jellyfin,jellyfin, subsonic")
            .build()
            .unwrap();
        assert_eq!(
            config.source_preference.order(),
            &[SourceKind::RemoteB, SourceKind::RemoteA]
        );

        let blank = FederationConfig::builder()
            .settings_store(store())
            .source_preference_list("  ")
            .build()
            .unwrap();
        assert_eq!(blank.source_preference, SourcePreference::default());
    }

    #[test]
    fn test_unknown_preference_is_rejected() {
        let err = FederationConfig::builder()
            .settings_store(store())
            .source_preference_list("local,spotify")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("spotify"));
    }

    #[test]
    fn test_zero_tuning_values_are_rejected() {
        let err = FederationConfig::builder()
            .settings_store(store())
            .shuffle(ShuffleTuning {
                append_batch: 0,
                ..ShuffleTuning::default()
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("append_batch"));

        let err = FederationConfig::builder()
            .settings_store(store())
            .aggregation(AggregationTuning {
                worker_threads: 0,
                ..AggregationTuning::default()
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("worker_threads"));

        assert!(FederationConfig::builder()
            .settings_store(store())
            .event_buffer(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_injected_clock_is_kept() {
        let config = FederationConfig::builder()
            .settings_store(store())
            .clock(Arc::new(ManualClock::new(77)))
            .build()
            .unwrap();
        assert_eq!(config.clock.unix_timestamp_millis(), 77);

        let cloned = config.clone();
        assert_eq!(cloned.clock.unix_timestamp_millis(), 77);
    }
}
