//! Song snapshots a shuffle session is built over.
//!
//! A [`SongSnapshot`] is deduplicated by identity and sorted by canonical id,
//! so the same song set always produces the same index space regardless of
//! the order backends returned it in. Its fingerprint is a SHA-256 over the
//! sorted tagged ids and detects when the song set changed identity.
//!
//! A snapshot captured while the live source was down, or while only some of
//! the backends behind it answered, is marked degraded; the engine never lets
//! a degraded snapshot replace a persisted session.

use std::sync::Arc;

use async_trait::async_trait;
use core_library::{EntityId, SearchIndex, Song, SourceKind, SourceRegistry};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{PlaybackError, Result};

#[derive(Debug, Clone, Default)]
pub struct SongSnapshot {
    songs: Vec<Song>,
    fingerprint: String,
    degraded: bool,
}

impl SongSnapshot {
    pub fn new(songs: impl IntoIterator<Item = Song>) -> Self {
        let mut songs: Vec<Song> = songs.into_iter().collect();
        songs.sort_by(|a, b| a.id.cmp(&b.id));
        songs.dedup_by(|a, b| a.id == b.id);
        let fingerprint = fingerprint(songs.iter().map(|song| &song.id));
        Self {
            songs,
            fingerprint,
            degraded: false,
        }
    }

    /// Marks the snapshot as captured without the live source.
    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn get(&self, index: usize) -> Option<&Song> {
        self.songs.get(index)
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// A missing persisted fingerprint is accepted.
    pub fn is_compatible_with(&self, persisted: Option<&str>) -> bool {
        persisted.map_or(true, |fp| fp == self.fingerprint)
    }
}

/// Hex SHA-256 over tagged ids, one per line, in iteration order.
pub fn fingerprint<'a>(ids: impl IntoIterator<Item = &'a EntityId>) -> String {
    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.to_tagged().as_bytes());
        hasher.update(b"\n");
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Songs read from a [`SongSource`].
#[derive(Debug, Clone, Default)]
pub struct SongLoad {
    pub songs: Vec<Song>,
    /// Some backend behind the source failed and its songs are missing
    pub partial: bool,
}

impl SongLoad {
    pub fn complete(songs: Vec<Song>) -> Self {
        Self {
            songs,
            partial: false,
        }
    }

    pub fn partial(songs: Vec<Song>) -> Self {
        Self {
            songs,
            partial: true,
        }
    }
}

/// Somewhere the current song set can be read from.
#[async_trait]
pub trait SongSource: Send + Sync {
    async fn songs(&self) -> Result<Vec<Song>>;

    /// [`songs`](Self::songs), flagged when the set is known to be incomplete.
    async fn load(&self) -> Result<SongLoad> {
        Ok(SongLoad::complete(self.songs().await?))
    }
}

/// Song rows of the search index, rebuilt as detached songs.
pub struct IndexSongSource {
    index: Arc<dyn SearchIndex>,
    registry: Arc<SourceRegistry>,
}

impl IndexSongSource {
    pub fn new(index: Arc<dyn SearchIndex>, registry: Arc<SourceRegistry>) -> Self {
        Self { index, registry }
    }
}

#[async_trait]
impl SongSource for IndexSongSource {
    async fn songs(&self) -> Result<Vec<Song>> {
        self.index
            .songs(&self.registry)
            .await
            .map_err(|err| PlaybackError::SnapshotUnavailable(err.to_string()))
    }
}

/// Live song source with an optional fallback.
#[derive(Clone)]
pub struct SnapshotCapture {
    live: Arc<dyn SongSource>,
    fallback: Option<Arc<dyn SongSource>>,
}

impl SnapshotCapture {
    pub fn new(live: Arc<dyn SongSource>) -> Self {
        Self {
            live,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn SongSource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub async fn capture(&self) -> SongSnapshot {
        capture(self.live.as_ref(), self.fallback.as_deref()).await
    }
}

/// Captures a snapshot from `live`, topping it up from `fallback`.
///
/// The fallback is consulted when the live load failed, came back empty, or
/// carries only local songs. A failed, empty or partial live load marks the
/// result degraded.
pub async fn capture(live: &dyn SongSource, fallback: Option<&dyn SongSource>) -> SongSnapshot {
    let (live_songs, degraded) = match live.load().await {
        Ok(load) => {
            if load.partial {
                warn!(songs = load.songs.len(), "Live song load is missing failed backends; snapshot degraded");
            }
            let degraded = load.partial || load.songs.is_empty();
            (load.songs, degraded)
        }
        Err(err) => {
            warn!(error = %err, "Live song load failed; using fallback snapshot");
            (Vec::new(), true)
        }
    };
    let mark = |snapshot: SongSnapshot| if degraded { snapshot.degraded() } else { snapshot };

    let needs_fallback = live_songs.iter().all(|song| song.kind() == SourceKind::Local);
    let Some(fallback) = fallback.filter(|_| needs_fallback) else {
        return mark(SongSnapshot::new(live_songs));
    };

    match fallback.songs().await {
        Ok(indexed) => {
            debug!(live = live_songs.len(), indexed = indexed.len(), "Topping up snapshot from search index");
            mark(SongSnapshot::new(live_songs.into_iter().chain(indexed)))
        }
        Err(err) => {
            warn!(error = %err, "Fallback song load failed");
            mark(SongSnapshot::new(live_songs))
        }
    }
}
