//! # Aggregation Coordinator
//!
//! Loads one entity kind from every configured backend concurrently and hands
//! the merged list to the caller exactly once.
//!
//! ## Workflow
//!
//! 1. Snapshot the configured sources and the current source preference
//! 2. Create a [`FanIn`] with one slot per source, in configuration order
//! 3. Spawn one load per source on the coordinator's [`WorkerPool`]; each load
//!    goes through [`ResilientSource`] and fills its slot (empty on failure,
//!    timeout or panic, in which case the source is also recorded as failed)
//! 4. The load that empties the countdown merges the slots with the
//!    preference snapshot and invokes the caller's callback with an
//!    [`Aggregated`] result naming any failed sources
//!
//! Merge input order is the configuration order of the sources, never the
//! order loads happened to finish in, so results do not depend on timing.
//!
//! ## Shutdown
//!
//! [`AggregationCoordinator::shutdown`] cancels the coordinator token and shuts
//! the pool. New requests fail with [`FederationError::ShutDown`]; loads that
//! are already running finish, but their join is discarded without invoking
//! the callback.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let coordinator = AggregationCoordinator::from_config(&config, events);
//! coordinator.add_source(Arc::new(subsonic_adapter));
//! coordinator.add_source(Arc::new(local_adapter));
//!
//! let songs = coordinator.load_songs().await?;
//! ```

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use core_async::pool::WorkerPool;
use core_async::sync::{oneshot, CancellationToken};
use core_library::{Album, Artist, Genre, Playlist, Song, SourceKind, SourcePreference, SourceRef};
use core_runtime::config::{AggregationTuning, FederationConfig};
use core_runtime::events::{AggregationEvent, CoreEvent, EventBus};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument};

use crate::adapter::{FederatedKind, SourceAdapter};
use crate::error::{FederationError, Result};
use crate::fan_in::FanIn;
use crate::resilient::ResilientSource;

/// Merged items of one aggregation, plus the sources whose load failed.
///
/// A failed source contributes nothing to `items`, so a non-empty
/// `failed_sources` means the list is known to be incomplete.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregated<T> {
    pub items: Vec<T>,
    /// `kind:instance` labels, in configuration order
    pub failed_sources: Vec<String>,
}

impl<T> Aggregated<T> {
    pub fn is_partial(&self) -> bool {
        !self.failed_sources.is_empty()
    }
}

pub struct AggregationCoordinator {
    /// Executor for backend loads
    pool: WorkerPool,

    /// Configured sources, in merge order
    sources: RwLock<Vec<ResilientSource>>,

    /// Tie-break order for equal-score duplicates
    preference: RwLock<SourcePreference>,

    tuning: AggregationTuning,

    events: EventBus,

    /// Cancelled on shutdown; child of the pool's shutdown token
    cancel: CancellationToken,
}

impl AggregationCoordinator {
    pub fn new(
        pool: WorkerPool,
        tuning: AggregationTuning,
        preference: SourcePreference,
        events: EventBus,
    ) -> Self {
        let cancel = pool.shutdown_token().child_token();
        Self {
            pool,
            sources: RwLock::new(Vec::new()),
            preference: RwLock::new(preference),
            tuning,
            events,
            cancel,
        }
    }

    /// Coordinator with a dedicated `aggregation` pool sized from `config`.
    pub fn from_config(config: &FederationConfig, events: EventBus) -> Self {
        let pool = WorkerPool::new("aggregation", config.aggregation.worker_threads);
        Self::new(
            pool,
            config.aggregation,
            config.source_preference.clone(),
            events,
        )
    }

    /// Adds a source, replacing one with the same kind and instance in place.
    pub fn add_source(&self, adapter: Arc<dyn SourceAdapter>) {
        let source = ResilientSource::new(adapter, self.tuning, self.events.clone());
        let mut sources = self.sources.write();
        let key = (source.source().kind, source.source().instance_id.clone());

        match sources
            .iter()
            .position(|existing| (existing.source().kind, existing.source().instance_id.clone()) == key)
        {
            Some(index) => {
                debug!(source = %source.label(), "Replacing source adapter");
                sources[index] = source;
            }
            None => {
                info!(source = %source.label(), "Registered source adapter");
                sources.push(source);
            }
        }
    }

    pub fn remove_source(&self, kind: SourceKind, instance_id: &str) -> bool {
        let mut sources = self.sources.write();
        let before = sources.len();
        sources.retain(|s| !(s.source().kind == kind && s.source().instance_id == instance_id));
        before != sources.len()
    }

    pub fn sources(&self) -> Vec<SourceRef> {
        self.sources
            .read()
            .iter()
            .map(|s| s.source().clone())
            .collect()
    }

    pub fn preference(&self) -> SourcePreference {
        self.preference.read().clone()
    }

    /// Applies to requests issued after the call.
    pub fn set_preference(&self, preference: SourcePreference) {
        info!(order = %preference, "Source preference updated");
        *self.preference.write() = preference;
    }

    /// Starts a load of `T` from every source; `on_merged` runs at most once.
    ///
    /// It runs exactly once unless the coordinator shuts down before the join
    /// completes, in which case the result is discarded.
    pub fn aggregate_with<T, F>(&self, on_merged: F) -> Result<()>
    where
        T: FederatedKind,
        F: FnOnce(Vec<T>) + Send + 'static,
    {
        self.aggregate_detailed_with::<T, _>(move |outcome| on_merged(outcome.items))
    }

    /// [`aggregate_with`](Self::aggregate_with), also reporting which sources
    /// failed.
    #[instrument(skip_all, fields(kind = %T::KIND))]
    pub fn aggregate_detailed_with<T, F>(&self, on_merged: F) -> Result<()>
    where
        T: FederatedKind,
        F: FnOnce(Aggregated<T>) + Send + 'static,
    {
        if self.is_shut_down() {
            return Err(FederationError::ShutDown);
        }

        let sources = self.sources.read().clone();
        let preference = self.preference();
        let labels: Vec<String> = sources.iter().map(ResilientSource::label).collect();
        debug!(sources = ?labels, "Dispatching source loads");
        self.events
            .emit(CoreEvent::Aggregation(AggregationEvent::Started {
                kind: T::KIND,
                sources: labels.clone(),
            }))
            .ok();

        // Slot indices of failed loads; written before the slot completes.
        let failures = Arc::new(Mutex::new(Vec::<usize>::new()));

        let cancel = self.cancel.clone();
        let events = self.events.clone();
        let failed = Arc::clone(&failures);
        let slots = FanIn::new(sources.len(), move |lists: Vec<Vec<T>>| {
            if cancel.is_cancelled() {
                debug!(kind = %T::KIND, "Discarding aggregation result after shutdown");
                return;
            }
            let input: usize = lists.iter().map(Vec::len).sum();
            let merged = T::merge(lists, &preference);

            let mut indices = std::mem::take(&mut *failed.lock());
            indices.sort_unstable();
            let failed_sources: Vec<String> = indices
                .into_iter()
                .filter_map(|index| labels.get(index).cloned())
                .collect();

            debug!(kind = %T::KIND, input, output = merged.len(), failed = failed_sources.len(), "Aggregation merged");
            events
                .emit(CoreEvent::Aggregation(AggregationEvent::Merged {
                    kind: T::KIND,
                    input,
                    output: merged.len(),
                }))
                .ok();
            on_merged(Aggregated {
                items: merged,
                failed_sources,
            });
        });

        for (index, (source, slot)) in sources.into_iter().zip(slots).enumerate() {
            let cancel = self.cancel.clone();
            let failures = Arc::clone(&failures);
            self.pool.spawn(async move {
                let label = source.label();
                match AssertUnwindSafe(source.try_load::<T>(&cancel)).catch_unwind().await {
                    Ok(Ok(items)) => slot.complete(items),
                    Ok(Err(_)) => {
                        failures.lock().push(index);
                        slot.complete(Vec::new());
                    }
                    Err(_) => {
                        error!(source = %label, kind = %T::KIND, "Source load panicked; contributing nothing");
                        failures.lock().push(index);
                        slot.complete(Vec::new());
                    }
                }
            })?;
        }

        Ok(())
    }

    /// Awaitable form of [`aggregate_with`](Self::aggregate_with).
    pub async fn aggregate<T: FederatedKind>(&self) -> Result<Vec<T>> {
        Ok(self.aggregate_detailed::<T>().await?.items)
    }

    /// Awaitable form of [`aggregate_detailed_with`](Self::aggregate_detailed_with).
    pub async fn aggregate_detailed<T: FederatedKind>(&self) -> Result<Aggregated<T>> {
        let (tx, rx) = oneshot::channel();
        self.aggregate_detailed_with::<T, _>(move |outcome| {
            tx.send(outcome).ok();
        })?;
        rx.await.map_err(|_| FederationError::Cancelled)
    }

    pub async fn load_artists(&self) -> Result<Vec<Artist>> {
        self.aggregate().await
    }

    pub async fn load_albums(&self) -> Result<Vec<Album>> {
        self.aggregate().await
    }

    pub async fn load_songs(&self) -> Result<Vec<Song>> {
        self.aggregate().await
    }

    /// Merged songs, with the sources that failed to contribute.
    pub async fn load_songs_detailed(&self) -> Result<Aggregated<Song>> {
        self.aggregate_detailed().await
    }

    pub async fn load_playlists(&self) -> Result<Vec<Playlist>> {
        self.aggregate().await
    }

    pub async fn load_genres(&self) -> Result<Vec<Genre>> {
        self.aggregate().await
    }

    /// Stops accepting requests and discards joins still in flight. Idempotent.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!("Shutting down aggregation coordinator");
        }
        self.cancel.cancel();
        self.pool.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once every accepted load has finished.
    pub async fn drained(&self) {
        self.pool.drained().await;
    }
}

impl fmt::Debug for AggregationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregationCoordinator")
            .field("pool", &self.pool)
            .field("sources", &self.sources.read().len())
            .field("preference", &*self.preference.read())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_library::EntityId;

    struct Static {
        source: SourceRef,
        artists: Vec<&'static str>,
    }

    #[async_trait]
    impl SourceAdapter for Static {
        fn source(&self) -> &SourceRef {
            &self.source
        }

        async fn load_artists(&self) -> Result<Vec<Artist>> {
            Ok(self
                .artists
                .iter()
                .map(|name| Artist {
                    id: EntityId::new(self.source.kind, &self.source.instance_id, *name),
                    name: name.to_string(),
                    sort_name: None,
                    album_count: None,
                    song_count: None,
                    artwork: None,
                    source: self.source.clone(),
                    native: Default::default(),
                })
                .collect())
        }

        async fn load_albums(&self) -> Result<Vec<Album>> {
            Ok(Vec::new())
        }

        async fn load_songs(&self) -> Result<Vec<Song>> {
            Ok(Vec::new())
        }

        async fn load_playlists(&self) -> Result<Vec<Playlist>> {
            Ok(Vec::new())
        }
    }

    struct Down(SourceRef);

    #[async_trait]
    impl SourceAdapter for Down {
        fn source(&self) -> &SourceRef {
            &self.0
        }

        async fn load_artists(&self) -> Result<Vec<Artist>> {
            Err(FederationError::source_failed("subsonic:home", "connection refused"))
        }

        async fn load_albums(&self) -> Result<Vec<Album>> {
            Ok(Vec::new())
        }

        async fn load_songs(&self) -> Result<Vec<Song>> {
            Ok(Vec::new())
        }

        async fn load_playlists(&self) -> Result<Vec<Playlist>> {
            Ok(Vec::new())
        }
    }

    fn coordinator() -> AggregationCoordinator {
        AggregationCoordinator::new(
            WorkerPool::new("test", 2),
            AggregationTuning::default(),
            SourcePreference::default(),
            EventBus::default(),
        )
    }

    #[tokio::test]
    async fn test_no_sources_yields_empty_result() {
        let coordinator = coordinator();
        assert!(coordinator.load_artists().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_source_replaces_same_instance() {
        let coordinator = coordinator();
        coordinator.add_source(Arc::new(Static {
            source: SourceRef::new(SourceKind::RemoteB, "den"),
            artists: vec!["Björk"],
        }));
        coordinator.add_source(Arc::new(Static {
            source: SourceRef::new(SourceKind::RemoteB, "den").with_display_name("Den"),
            artists: vec!["Björk", "Low"],
        }));

        assert_eq!(coordinator.sources().len(), 1);
        assert_eq!(coordinator.load_artists().await.unwrap().len(), 2);
        assert!(coordinator.remove_source(SourceKind::RemoteB, "den"));
        assert!(!coordinator.remove_source(SourceKind::RemoteB, "den"));
    }

    #[tokio::test]
    async fn test_preference_change_applies_to_next_request() {
        let coordinator = coordinator();
        coordinator.add_source(Arc::new(Static {
            source: SourceRef::new(SourceKind::RemoteA, "home"),
            artists: vec!["Nina Simone"],
        }));
        coordinator.add_source(Arc::new(Static {
            source: SourceRef::local(),
            artists: vec!["Nina Simone"],
        }));

        let merged = coordinator.load_artists().await.unwrap();
        assert_eq!(merged[0].source.kind, SourceKind::Local);

        coordinator.set_preference(SourcePreference::new([SourceKind::RemoteA]));
        let merged = coordinator.load_artists().await.unwrap();
        assert_eq!(merged[0].source.kind, SourceKind::RemoteA);
    }

    #[tokio::test]
    async fn test_failed_source_is_reported_with_partial_result() {
        let coordinator = AggregationCoordinator::new(
            WorkerPool::new("test", 2),
            AggregationTuning {
                retry_attempts: 0,
                ..AggregationTuning::default()
            },
            SourcePreference::default(),
            EventBus::default(),
        );
        coordinator.add_source(Arc::new(Down(SourceRef::new(SourceKind::RemoteA, "home"))));
        coordinator.add_source(Arc::new(Static {
            source: SourceRef::local(),
            artists: vec!["Low"],
        }));

        let outcome = coordinator.aggregate_detailed::<Artist>().await.unwrap();
        assert_eq!(outcome.items.len(), 1);
        assert!(outcome.is_partial());
        assert_eq!(outcome.failed_sources, vec!["subsonic:home".to_string()]);

        assert_eq!(coordinator.load_artists().await.unwrap().len(), 1);
        assert!(!coordinator.load_songs_detailed().await.unwrap().is_partial());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_requests() {
        let coordinator = coordinator();
        coordinator.shutdown();
        assert_eq!(
            coordinator.load_songs().await.unwrap_err(),
            FederationError::ShutDown
        );
        coordinator.drained().await;
    }
}
