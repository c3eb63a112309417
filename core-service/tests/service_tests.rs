//! Integration tests for the federation service facade
//!
//! These tests verify:
//! - Browse views are sorted case-insensitively
//! - The source preference is persisted and restored across restarts
//! - The search index is rebuilt from merged results and backs shuffle
//!   when only local songs are live
//! - A restart while one backend is down keeps the persisted shuffle session
//! - Shuffle storage failures and shutdown turn shuffle calls into empty
//!   batches, and shutdown rejects loads

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_desktop::MemorySettingsStore;
use bridge_traits::{BridgeError, ManualClock, SettingsStore, SettingsTransaction};
use core_federation::{FederationError, Result, SourceAdapter};
use core_library::{
    Album, Artist, EntityId, NativeRef, Playlist, Song, SourceKind, SourcePreference, SourceRef,
};
use core_playback::state_store::{KEY_CURSOR, KEY_FINGERPRINT, KEY_SEED};
use core_runtime::config::{AggregationTuning, FederationConfig, SOURCE_PREFERENCE_KEY};
use core_service::{CoreError, FederationService};
use mockall::mock;

const START_MILLIS: i64 = 1_700_000_000_000;

// ============================================================================
// Fixtures
// ============================================================================

struct Fake {
    source: SourceRef,
    artists: Vec<&'static str>,
    albums: Vec<(&'static str, &'static str)>,
    songs: Vec<&'static str>,
}

impl Fake {
    fn new(source: SourceRef) -> Self {
        Self {
            source,
            artists: Vec::new(),
            albums: Vec::new(),
            songs: Vec::new(),
        }
    }

    fn id(&self, native: &str) -> EntityId {
        EntityId::new(self.source.kind, &self.source.instance_id, native)
    }
}

#[async_trait]
impl SourceAdapter for Fake {
    fn source(&self) -> &SourceRef {
        &self.source
    }

    async fn load_artists(&self) -> Result<Vec<Artist>> {
        Ok(self
            .artists
            .iter()
            .map(|name| Artist {
                id: self.id(name),
                name: name.to_string(),
                sort_name: None,
                album_count: None,
                song_count: None,
                artwork: None,
                source: self.source.clone(),
                native: NativeRef::Detached,
            })
            .collect())
    }

    async fn load_albums(&self) -> Result<Vec<Album>> {
        Ok(self
            .albums
            .iter()
            .map(|(title, artist)| Album {
                id: self.id(&format!("{title}-{artist}")),
                title: title.to_string(),
                artist: Some(artist.to_string()),
                artist_id: None,
                year: None,
                track_count: None,
                artwork: None,
                source: self.source.clone(),
                native: NativeRef::Detached,
            })
            .collect())
    }

    async fn load_songs(&self) -> Result<Vec<Song>> {
        Ok(self
            .songs
            .iter()
            .map(|title| Song::new(self.id(title), *title, self.source.clone()))
            .collect())
    }

    async fn load_playlists(&self) -> Result<Vec<Playlist>> {
        Ok(Vec::new())
    }
}

/// A numbered catalog of songs whose backend can be taken down.
struct Catalog {
    source: SourceRef,
    songs: usize,
    down: Arc<AtomicBool>,
}

impl Catalog {
    fn new(source: SourceRef, songs: usize, down: Arc<AtomicBool>) -> Self {
        Self { source, songs, down }
    }
}

#[async_trait]
impl SourceAdapter for Catalog {
    fn source(&self) -> &SourceRef {
        &self.source
    }

    async fn load_artists(&self) -> Result<Vec<Artist>> {
        Ok(Vec::new())
    }

    async fn load_albums(&self) -> Result<Vec<Album>> {
        Ok(Vec::new())
    }

    async fn load_songs(&self) -> Result<Vec<Song>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(FederationError::source_failed(
                self.source.instance_id.clone(),
                "connection refused",
            ));
        }
        let kind = self.source.kind;
        Ok((0..self.songs)
            .map(|i| {
                Song::new(
                    EntityId::new(kind, &self.source.instance_id, format!("{i:04}")),
                    format!("{} track {i}", kind.wire_id()),
                    self.source.clone(),
                )
            })
            .collect())
    }

    async fn load_playlists(&self) -> Result<Vec<Playlist>> {
        Ok(Vec::new())
    }
}

mock! {
    Store {}

    #[async_trait]
    impl SettingsStore for Store {
        async fn set_string(&self, key: &str, value: &str) -> bridge_traits::error::Result<()>;
        async fn get_string(&self, key: &str) -> bridge_traits::error::Result<Option<String>>;
        async fn set_bool(&self, key: &str, value: bool) -> bridge_traits::error::Result<()>;
        async fn get_bool(&self, key: &str) -> bridge_traits::error::Result<Option<bool>>;
        async fn set_i64(&self, key: &str, value: i64) -> bridge_traits::error::Result<()>;
        async fn get_i64(&self, key: &str) -> bridge_traits::error::Result<Option<i64>>;
        async fn delete(&self, key: &str) -> bridge_traits::error::Result<()>;
        async fn has_key(&self, key: &str) -> bridge_traits::error::Result<bool>;
        async fn list_keys(&self, prefix: &str) -> bridge_traits::error::Result<Vec<String>>;
        async fn begin_transaction(&self) -> bridge_traits::error::Result<Box<dyn SettingsTransaction + Send>>;
    }
}

fn config(store: Arc<MemorySettingsStore>) -> FederationConfig {
    config_at(store, START_MILLIS)
}

fn config_at(store: Arc<dyn SettingsStore>, millis: i64) -> FederationConfig {
    FederationConfig::builder()
        .settings_store(store)
        .clock(Arc::new(ManualClock::new(millis)))
        .aggregation(AggregationTuning {
            retry_attempts: 0,
            load_timeout: Duration::from_secs(2),
            ..AggregationTuning::default()
        })
        .build()
        .unwrap()
}

async fn service() -> FederationService {
    FederationService::start(config(Arc::new(MemorySettingsStore::new())))
        .await
        .unwrap()
}

// ============================================================================
// Browse
// ============================================================================

#[tokio::test]
async fn test_browse_views_are_sorted() {
    let service = service().await;
    let mut local = Fake::new(SourceRef::local());
    local.artists = vec!["portishead", "Aphex Twin", "Boards of Canada"];
    local.albums = vec![("Dummy", "Portishead"), ("dummy", "Another"), ("Blue Lines", "Massive Attack")];
    service.add_source(Arc::new(local));

    let artists: Vec<String> = service.artists().await.unwrap().into_iter().map(|a| a.name).collect();
    assert_eq!(artists, vec!["Aphex Twin", "Boards of Canada", "portishead"]);

    let albums: Vec<(String, Option<String>)> = service
        .albums()
        .await
        .unwrap()
        .into_iter()
        .map(|a| (a.title, a.artist))
        .collect();
    assert_eq!(albums[0].0, "Blue Lines");
    assert_eq!(albums[1].1.as_deref(), Some("Another"));
    assert_eq!(albums[2].1.as_deref(), Some("Portishead"));
}

#[tokio::test]
async fn test_sources_are_registered_and_removed() {
    let service = service().await;
    service.add_source(Arc::new(Fake::new(SourceRef::new(SourceKind::RemoteB, "den"))));
    service.add_source(Arc::new(Fake::new(SourceRef::local())));

    assert_eq!(service.sources().len(), 2);
    assert!(service.registry().get(SourceKind::RemoteB, "den").is_some());

    assert!(service.remove_source(SourceKind::RemoteB, "den"));
    assert!(!service.remove_source(SourceKind::RemoteB, "den"));
    assert_eq!(service.sources().len(), 1);
}

// ============================================================================
// Source preference
// ============================================================================

#[tokio::test]
async fn test_preference_is_persisted_and_restored() {
    let store = Arc::new(MemorySettingsStore::new());
    let first = FederationService::start(config(store.clone())).await.unwrap();
    first.set_source_preference_list("jellyfin, local").await.unwrap();

    assert_eq!(
        store.get_string(SOURCE_PREFERENCE_KEY).await.unwrap().as_deref(),
        Some("jellyfin,local")
    );
    first.shutdown().await;

    let second = FederationService::start(config(store)).await.unwrap();
    assert_eq!(
        second.source_preference(),
        SourcePreference::new([SourceKind::RemoteB, SourceKind::Local])
    );
}

#[tokio::test]
async fn test_unknown_preference_is_rejected() {
    let service = service().await;
    let before = service.source_preference();

    assert!(matches!(
        service.set_source_preference_list("local,napster").await,
        Err(CoreError::Library(_))
    ));
    assert_eq!(service.source_preference(), before);
}

#[tokio::test]
async fn test_preference_changes_merge_winner() {
    let service = service().await;
    let mut local = Fake::new(SourceRef::local());
    local.songs = vec!["Teardrop"];
    let mut remote = Fake::new(SourceRef::new(SourceKind::RemoteB, "den"));
    remote.songs = vec!["teardrop"];
    service.add_source(Arc::new(local));
    service.add_source(Arc::new(remote));

    assert_eq!(service.songs().await.unwrap()[0].source.kind, SourceKind::Local);

    service
        .set_source_preference(SourcePreference::new([SourceKind::RemoteB]))
        .await
        .unwrap();
    assert_eq!(service.songs().await.unwrap()[0].source.kind, SourceKind::RemoteB);
}

// ============================================================================
// Search index and shuffle
// ============================================================================

#[tokio::test]
async fn test_search_index_rebuild_and_query() {
    let service = service().await;
    let mut remote = Fake::new(SourceRef::new(SourceKind::RemoteA, "home"));
    remote.artists = vec!["Massive Attack"];
    remote.songs = vec!["Angel", "Teardrop"];
    service.add_source(Arc::new(remote));

    assert_eq!(service.rebuild_search_index().await.unwrap(), 3);

    let hits = service.search("tear", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Teardrop");
    assert_eq!(hits[0].updated_at, 1_700_000_000_000);
}

#[tokio::test]
async fn test_shuffle_tops_up_local_only_library_from_index() {
    let service = service().await;
    let mut local = Fake::new(SourceRef::local());
    local.songs = vec!["Roads", "Sour Times"];
    let mut remote = Fake::new(SourceRef::new(SourceKind::RemoteB, "den"));
    remote.songs = vec!["Angel", "Protection", "Karmacoma"];
    service.add_source(Arc::new(local));
    service.add_source(Arc::new(remote));
    service.rebuild_search_index().await.unwrap();

    service.remove_source(SourceKind::RemoteB, "den");
    let batch = service.start_shuffle(false).await.unwrap();
    assert_eq!(batch.len(), 100);

    let titles: HashSet<String> = batch.into_iter().map(|s| s.title).collect();
    assert_eq!(titles.len(), 5);
    assert!(titles.contains("Karmacoma"));
}

#[tokio::test]
async fn test_restart_during_backend_outage_keeps_shuffle_session() {
    let store = Arc::new(MemorySettingsStore::new());
    let subsonic_down = Arc::new(AtomicBool::new(false));
    let healthy = Arc::new(AtomicBool::new(false));

    let first = FederationService::start(config(store.clone())).await.unwrap();
    first.add_source(Arc::new(Catalog::new(
        SourceRef::new(SourceKind::RemoteB, "den"),
        200,
        healthy.clone(),
    )));
    first.add_source(Arc::new(Catalog::new(
        SourceRef::new(SourceKind::RemoteA, "home"),
        100,
        subsonic_down.clone(),
    )));
    let initial = first.start_shuffle(false).await.unwrap();
    assert_eq!(initial.len(), 100);
    first.on_track_advanced(&initial[0].id, true, 99).await.unwrap();
    first.shutdown().await;

    let seed = store.get_i64(KEY_SEED).await.unwrap();
    let fingerprint = store.get_string(KEY_FINGERPRINT).await.unwrap();
    assert_eq!(seed, Some(START_MILLIS));
    assert_eq!(store.get_i64(KEY_CURSOR).await.unwrap(), Some(100));

    subsonic_down.store(true, Ordering::SeqCst);
    let second = FederationService::start(config_at(store.clone(), START_MILLIS + 9_999))
        .await
        .unwrap();
    second.add_source(Arc::new(Catalog::new(
        SourceRef::new(SourceKind::RemoteB, "den"),
        200,
        healthy,
    )));
    second.add_source(Arc::new(Catalog::new(
        SourceRef::new(SourceKind::RemoteA, "home"),
        100,
        subsonic_down,
    )));
    second.on_track_advanced(&initial[1].id, true, 99).await.unwrap();
    assert!(second.is_shuffle_active().await);

    assert_eq!(store.get_i64(KEY_SEED).await.unwrap(), seed);
    assert_eq!(store.get_i64(KEY_CURSOR).await.unwrap(), Some(100));
    assert_eq!(store.get_string(KEY_FINGERPRINT).await.unwrap(), fingerprint);
}

#[tokio::test]
async fn test_shuffle_storage_failure_yields_empty_batches() {
    let mut store = MockStore::new();
    store.expect_get_string().returning(|_| Ok(None));
    store.expect_get_bool().returning(|_| Ok(None));
    store
        .expect_begin_transaction()
        .returning(|| Err(BridgeError::DatabaseError("disk full".into())));

    let service = FederationService::start(config_at(Arc::new(store), START_MILLIS))
        .await
        .unwrap();
    let mut local = Fake::new(SourceRef::local());
    local.songs = vec!["Roads", "Sour Times", "Glory Box"];
    service.add_source(Arc::new(local));

    assert!(service.start_shuffle(false).await.unwrap().is_empty());
    assert!(service.next_shuffle_batch(10).await.unwrap().is_empty());

    let played = EntityId::new(SourceKind::Local, "local", "Roads");
    assert!(service.on_track_advanced(&played, true, 0).await.unwrap().is_empty());
    assert!(!service.is_shuffle_active().await);
}

#[tokio::test]
async fn test_mix_and_tiles_through_facade() {
    let service = service().await;
    let mut local = Fake::new(SourceRef::local());
    local.songs = vec!["One", "Two", "Three", "Four", "Five"];
    service.add_source(Arc::new(local));

    assert_eq!(service.mix(None, Some(3)).await.unwrap().len(), 3);
    assert_eq!(service.made_for_you().await.unwrap().len(), 4);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_empties_shuffle_and_rejects_loads() {
    let service = service().await;
    let mut local = Fake::new(SourceRef::local());
    local.songs = vec!["Only Song"];
    service.add_source(Arc::new(local));

    let batch = service.start_shuffle(false).await.unwrap();
    assert!(!batch.is_empty());

    service.shutdown().await;
    assert!(service.is_shut_down());

    assert!(service.start_shuffle(false).await.unwrap().is_empty());
    assert!(service
        .on_track_advanced(&batch[0].id, true, 0)
        .await
        .unwrap()
        .is_empty());
    service.clear_shuffle().await.unwrap();

    assert!(matches!(
        service.songs().await,
        Err(CoreError::Federation(FederationError::ShutDown))
    ));
}
