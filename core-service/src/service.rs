//! The [`FederationService`] facade.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::{Clock, SettingsStore};
use core_federation::{AggregationCoordinator, SourceAdapter};
use core_library::{
    Album, Artist, EntityId, Genre, InMemorySearchIndex, Playlist, SearchIndex,
    SearchIndexBuilder, SearchIndexEntry, Song, SourceKind, SourcePreference, SourceRef,
    SourceRegistry,
};
use core_playback::{
    IndexSongSource, PlaybackError, ShuffleEngine, SnapshotCapture, SongLoad, SongSource,
};
use core_runtime::config::{FederationConfig, SOURCE_PREFERENCE_KEY};
use core_runtime::events::{EventBus, EventStream};
use tracing::{info, instrument, warn};

use crate::error::Result;

/// Live songs for shuffle snapshots, read through the coordinator.
///
/// A load with any failed backend is reported as partial.
struct CoordinatorSongs(Arc<AggregationCoordinator>);

#[async_trait]
impl SongSource for CoordinatorSongs {
    async fn songs(&self) -> core_playback::Result<Vec<Song>> {
        Ok(self.load().await?.songs)
    }

    async fn load(&self) -> core_playback::Result<SongLoad> {
        let outcome = self
            .0
            .load_songs_detailed()
            .await
            .map_err(|err| PlaybackError::SnapshotUnavailable(err.to_string()))?;
        if outcome.is_partial() {
            warn!(failed = ?outcome.failed_sources, "Song snapshot is missing failed sources");
            return Ok(SongLoad::partial(outcome.items));
        }
        Ok(SongLoad::complete(outcome.items))
    }
}

/// Primary facade exposed to host applications.
///
/// Owns the event bus, source registry, search index, aggregation
/// coordinator and shuffle engine, and ties their lifecycles together.
pub struct FederationService {
    config: FederationConfig,
    events: EventBus,
    registry: Arc<SourceRegistry>,
    index: Arc<InMemorySearchIndex>,
    coordinator: Arc<AggregationCoordinator>,
    shuffle: ShuffleEngine,
}

impl FederationService {
    /// Builds every component from `config`.
    ///
    /// A preference order persisted by an earlier run overrides the one in
    /// `config`.
    pub async fn start(config: FederationConfig) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_buffer);
        let coordinator = Arc::new(AggregationCoordinator::from_config(&config, events.clone()));

        match config.settings_store.get_string(SOURCE_PREFERENCE_KEY).await {
            Ok(Some(stored)) => {
                let preference = SourcePreference::from_setting(Some(&stored));
                info!(%preference, "Restored source preference");
                coordinator.set_preference(preference);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "Could not read source preference; using configured order"),
        }

        let registry = Arc::new(SourceRegistry::new());
        let index = Arc::new(InMemorySearchIndex::new());
        let capture = SnapshotCapture::new(Arc::new(CoordinatorSongs(Arc::clone(&coordinator))))
            .with_fallback(Arc::new(IndexSongSource::new(
                Arc::clone(&index) as Arc<dyn SearchIndex>,
                Arc::clone(&registry),
            )));
        let shuffle = ShuffleEngine::from_config(&config, capture, events.clone());

        info!(
            workers = config.aggregation.worker_threads,
            preference = %coordinator.preference(),
            "Federation service started"
        );
        Ok(Self {
            config,
            events,
            registry,
            index,
            coordinator,
            shuffle,
        })
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    // ------------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------------

    /// Registers a backend instance; replaces one with the same kind and instance.
    pub fn add_source(&self, adapter: Arc<dyn SourceAdapter>) -> Arc<SourceRef> {
        let source = self.registry.register(adapter.source().clone());
        self.coordinator.add_source(adapter);
        source
    }

    pub fn remove_source(&self, kind: SourceKind, instance_id: &str) -> bool {
        let removed = self.coordinator.remove_source(kind, instance_id);
        self.registry.remove(kind, instance_id) || removed
    }

    pub fn sources(&self) -> Vec<SourceRef> {
        self.coordinator.sources()
    }

    // ------------------------------------------------------------------------
    // Source preference
    // ------------------------------------------------------------------------

    pub fn source_preference(&self) -> SourcePreference {
        self.coordinator.preference()
    }

    /// Persists `preference` and applies it to subsequent merges.
    pub async fn set_source_preference(&self, preference: SourcePreference) -> Result<()> {
        self.config
            .settings_store
            .set_string(SOURCE_PREFERENCE_KEY, &preference.to_setting_string())
            .await?;
        self.coordinator.set_preference(preference);
        Ok(())
    }

    /// [`set_source_preference`](Self::set_source_preference) from a
    /// comma-separated list of wire ids; unknown ids are rejected.
    pub async fn set_source_preference_list(&self, list: &str) -> Result<()> {
        let preference = SourcePreference::parse(list)?;
        self.set_source_preference(preference).await
    }

    // ------------------------------------------------------------------------
    // Browse
    // ------------------------------------------------------------------------

    /// Merged artists, sorted by name ignoring case.
    pub async fn artists(&self) -> Result<Vec<Artist>> {
        let mut artists = self.coordinator.load_artists().await?;
        artists.sort_by_cached_key(|artist| artist.name.to_lowercase());
        Ok(artists)
    }

    /// Merged albums, sorted by title then artist ignoring case.
    pub async fn albums(&self) -> Result<Vec<Album>> {
        let mut albums = self.coordinator.load_albums().await?;
        albums.sort_by_cached_key(|album| {
            (
                album.title.to_lowercase(),
                album.artist.as_deref().unwrap_or_default().to_lowercase(),
            )
        });
        Ok(albums)
    }

    /// Merged songs in merge order.
    pub async fn songs(&self) -> Result<Vec<Song>> {
        Ok(self.coordinator.load_songs().await?)
    }

    pub async fn playlists(&self) -> Result<Vec<Playlist>> {
        Ok(self.coordinator.load_playlists().await?)
    }

    pub async fn genres(&self) -> Result<Vec<Genre>> {
        Ok(self.coordinator.load_genres().await?)
    }

    // ------------------------------------------------------------------------
    // Search index
    // ------------------------------------------------------------------------

    /// Reloads every entity kind and rewrites the search index; returns the
    /// number of rows written.
    #[instrument(skip(self))]
    pub async fn rebuild_search_index(&self) -> Result<usize> {
        let artists = self.coordinator.load_artists().await?;
        let albums = self.coordinator.load_albums().await?;
        let songs = self.coordinator.load_songs().await?;
        let playlists = self.coordinator.load_playlists().await?;

        let entries = SearchIndexBuilder::new(self.config.clock.unix_timestamp_millis())
            .artists(&artists)
            .albums(&albums)
            .songs(&songs)
            .playlists(&playlists)
            .build();
        let written = entries.len();

        for kind in SourceKind::ALL {
            let rows: Vec<SearchIndexEntry> = entries
                .iter()
                .filter(|entry| entry.source == kind.wire_id())
                .cloned()
                .collect();
            self.index.replace_source(kind.wire_id(), rows);
        }
        info!(rows = written, "Search index rebuilt");
        Ok(written)
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchIndexEntry>> {
        Ok(self.index.search(query, limit).await?)
    }

    // ------------------------------------------------------------------------
    // Shuffle and mixes
    // ------------------------------------------------------------------------

    /// Starts or resumes shuffle-all.
    ///
    /// Shuffle failures never reach the caller: once the service is shut down,
    /// or when shuffle state cannot be read or written, the batch is empty.
    pub async fn start_shuffle(&self, force_new: bool) -> Result<Vec<Song>> {
        Ok(batch_or_empty(self.shuffle.start(force_new).await))
    }

    pub async fn next_shuffle_batch(&self, count: usize) -> Result<Vec<Song>> {
        Ok(batch_or_empty(self.shuffle.next_batch(count).await))
    }

    /// Reports a played song; returns songs to append to the queue, if any.
    pub async fn on_track_advanced(
        &self,
        played: &EntityId,
        increment_consumed: bool,
        remaining_queue: usize,
    ) -> Result<Vec<Song>> {
        Ok(batch_or_empty(
            self.shuffle
                .on_advance(played, increment_consumed, remaining_queue)
                .await,
        ))
    }

    pub async fn clear_shuffle(&self) -> Result<()> {
        match self.shuffle.clear().await {
            Ok(()) | Err(PlaybackError::ShutDown) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn is_shuffle_active(&self) -> bool {
        self.shuffle.is_active().await
    }

    /// Affinity mix over the current merged songs.
    pub async fn mix(&self, seed: Option<&EntityId>, length: Option<usize>) -> Result<Vec<Song>> {
        let songs = self.coordinator.load_songs().await?;
        Ok(self.shuffle.mix(&songs, seed, length).await)
    }

    /// Seed songs for the made-for-you tiles.
    pub async fn made_for_you(&self) -> Result<Vec<Song>> {
        let songs = self.coordinator.load_songs().await?;
        Ok(self.shuffle.made_for_you(&songs).await)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Stops accepting work, discards in-flight joins and waits for workers.
    pub async fn shutdown(&self) {
        self.shuffle.shutdown();
        self.coordinator.shutdown();
        self.coordinator.drained().await;
        info!("Federation service shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.coordinator.is_shut_down()
    }
}

impl std::fmt::Debug for FederationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationService")
            .field("config", &self.config)
            .field("sources", &self.registry.len())
            .field("index_rows", &self.index.len())
            .finish()
    }
}

fn batch_or_empty(result: core_playback::Result<Vec<Song>>) -> Vec<Song> {
    match result {
        Ok(batch) => batch,
        Err(PlaybackError::ShutDown) => Vec::new(),
        Err(err) => {
            warn!(error = %err, "Shuffle request failed; returning an empty batch");
            Vec::new()
        }
    }
}
