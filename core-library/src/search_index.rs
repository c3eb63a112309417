//! Search index projection
//!
//! A flattened, single-namespace table of library entries across all backends.
//! Item ids are written in tagged form so one column can hold ids from every
//! instance; reading back goes through the identity resolvers. The index also
//! serves as the fallback song snapshot for shuffle when live loads come back
//! empty.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::identity::{
    resolve_for_kind, SourceKind, DEFAULT_REMOTE_A_INSTANCE, DEFAULT_REMOTE_B_INSTANCE,
    LOCAL_INSTANCE,
};
use crate::models::{Album, Artist, Artwork, NativeRef, Playlist, Song};
use crate::normalize::{normalize, search_text};
use crate::registry::SourceRegistry;

pub const TYPE_ARTIST: &str = "artist";
pub const TYPE_ALBUM: &str = "album";
pub const TYPE_SONG: &str = "song";
pub const TYPE_PLAYLIST: &str = "playlist";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndexEntry {
    pub uid: String,
    /// Tagged id of the entity.
    pub item_id: Option<String>,
    /// Wire id of the source kind.
    pub source: String,
    pub media_type: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_id: Option<String>,
    pub artist_id: Option<String>,
    pub cover_art: Option<String>,
    pub search_text: String,
    /// Unix millis.
    pub updated_at: i64,
}

/// Normalized title, artist and album joined by single spaces.
pub fn build_search_text(title: &str, artist: Option<&str>, album: Option<&str>) -> String {
    search_text([Some(title), artist, album])
}

/// `source:media_type:item_id`, or a content hash of the search text when the
/// entry has no id.
pub fn build_uid(source: &str, media_type: &str, item_id: Option<&str>, search_text: &str) -> String {
    let source = source.trim().to_lowercase();
    let media_type = media_type.trim().to_lowercase();
    match item_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!("{source}:{media_type}:{id}"),
        None => {
            let digest = Sha256::digest(search_text.as_bytes());
            let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
            format!("{source}:{media_type}:h{hex}")
        }
    }
}

fn entry(
    kind: SourceKind,
    media_type: &str,
    item_id: String,
    title: &str,
    artist: Option<&str>,
    album: Option<&str>,
    updated_at: i64,
) -> SearchIndexEntry {
    let text = build_search_text(title, artist, album);
    SearchIndexEntry {
        uid: build_uid(kind.wire_id(), media_type, Some(&item_id), &text),
        item_id: Some(item_id),
        source: kind.wire_id().to_string(),
        media_type: media_type.to_string(),
        title: title.to_string(),
        artist: artist.map(str::to_string),
        album: album.map(str::to_string),
        album_id: None,
        artist_id: None,
        cover_art: None,
        search_text: text,
        updated_at,
    }
}

/// Builds index rows from normalized entities.
pub struct SearchIndexBuilder {
    updated_at: i64,
    entries: Vec<SearchIndexEntry>,
}

impl SearchIndexBuilder {
    pub fn new(updated_at: i64) -> Self {
        Self {
            updated_at,
            entries: Vec::new(),
        }
    }

    pub fn artists<'a>(mut self, artists: impl IntoIterator<Item = &'a Artist>) -> Self {
        for artist in artists {
            let mut row = entry(
                artist.id.kind(),
                TYPE_ARTIST,
                artist.id.to_tagged(),
                &artist.name,
                None,
                None,
                self.updated_at,
            );
            row.artist_id = row.item_id.clone();
            row.cover_art = artist.artwork.as_ref().map(|a| a.id.to_tagged());
            self.entries.push(row);
        }
        self
    }

    pub fn albums<'a>(mut self, albums: impl IntoIterator<Item = &'a Album>) -> Self {
        for album in albums {
            let mut row = entry(
                album.id.kind(),
                TYPE_ALBUM,
                album.id.to_tagged(),
                &album.title,
                album.artist.as_deref(),
                None,
                self.updated_at,
            );
            row.album = Some(album.title.clone());
            row.album_id = row.item_id.clone();
            row.artist_id = album.artist_id.as_ref().map(|id| id.to_tagged());
            row.cover_art = album.artwork.as_ref().map(|a| a.id.to_tagged());
            self.entries.push(row);
        }
        self
    }

    pub fn songs<'a>(mut self, songs: impl IntoIterator<Item = &'a Song>) -> Self {
        for song in songs {
            let mut row = entry(
                song.id.kind(),
                TYPE_SONG,
                song.id.to_tagged(),
                &song.title,
                song.artist.as_deref(),
                song.album.as_deref(),
                self.updated_at,
            );
            row.album_id = song.album_id.as_ref().map(|id| id.to_tagged());
            row.artist_id = song.artist_id.as_ref().map(|id| id.to_tagged());
            row.cover_art = song.artwork.as_ref().map(|a| a.id.to_tagged());
            self.entries.push(row);
        }
        self
    }

    pub fn playlists<'a>(mut self, playlists: impl IntoIterator<Item = &'a Playlist>) -> Self {
        for playlist in playlists {
            let mut row = entry(
                playlist.id.kind(),
                TYPE_PLAYLIST,
                playlist.id.to_tagged(),
                &playlist.name,
                None,
                None,
                self.updated_at,
            );
            row.cover_art = playlist.artwork.as_ref().map(|a| a.id.to_tagged());
            self.entries.push(row);
        }
        self
    }

    pub fn build(self) -> Vec<SearchIndexEntry> {
        self.entries
    }
}

fn default_instance(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Local => LOCAL_INSTANCE,
        SourceKind::RemoteA => DEFAULT_REMOTE_A_INSTANCE,
        SourceKind::RemoteB | SourceKind::Other => DEFAULT_REMOTE_B_INSTANCE,
    }
}

/// Rebuilds a detached [`Song`] from a song row.
///
/// Rows of other media types, or from an unknown source, yield `None`.
pub fn to_song(entry: &SearchIndexEntry, registry: &SourceRegistry) -> Option<Song> {
    if entry.media_type != TYPE_SONG || entry.title.trim().is_empty() {
        return None;
    }
    let kind = SourceKind::from_wire_id(&entry.source)?;
    let instance = default_instance(kind);
    let resolve = |raw: Option<&str>, fallback: &str| resolve_for_kind(kind, instance, raw, fallback);
    let related = |raw: &Option<String>| {
        raw.as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| resolve(Some(v), v))
    };

    let id = resolve(entry.item_id.as_deref(), &entry.title);
    let mut song = Song::new(id.clone(), entry.title.trim(), registry.resolve(&id));
    song.artist = entry.artist.clone();
    song.album = entry.album.clone();
    song.artist_id = related(&entry.artist_id);
    song.album_id = related(&entry.album_id);
    song.artwork = related(&entry.cover_art).map(|id| Artwork { id });
    song.native = NativeRef::Detached;
    Some(song)
}

/// Read side of the search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// All rows of the given media type.
    async fn entries_of_type(&self, media_type: &str) -> Result<Vec<SearchIndexEntry>>;

    /// Rows whose search text contains every normalized token of `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchIndexEntry>>;

    /// Song rows rebuilt as detached songs.
    async fn songs(&self, registry: &SourceRegistry) -> Result<Vec<Song>> {
        Ok(self
            .entries_of_type(TYPE_SONG)
            .await?
            .iter()
            .filter_map(|entry| to_song(entry, registry))
            .collect())
    }
}

/// [`SearchIndex`] held in memory and keyed by uid.
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    rows: RwLock<BTreeMap<String, SearchIndexEntry>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, entries: impl IntoIterator<Item = SearchIndexEntry>) {
        let mut rows = self.rows.write();
        for entry in entries {
            rows.insert(entry.uid.clone(), entry);
        }
    }

    /// Replaces every row of `source` with `entries`.
    pub fn replace_source(&self, source: &str, entries: impl IntoIterator<Item = SearchIndexEntry>) {
        let mut rows = self.rows.write();
        rows.retain(|_, row| row.source != source);
        for entry in entries {
            rows.insert(entry.uid.clone(), entry);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn entries_of_type(&self, media_type: &str) -> Result<Vec<SearchIndexEntry>> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|row| row.media_type == media_type)
            .cloned()
            .collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchIndexEntry>> {
        let query = normalize(query);
        let tokens: Vec<&str> = query.split(' ').filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchIndexEntry> = self
            .rows
            .read()
            .values()
            .filter(|row| tokens.iter().all(|t| row.search_text.contains(t)))
            .cloned()
            .collect();
        hits.sort_by_cached_key(|row| (row.title.to_lowercase(), row.uid.clone()));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{EntityId, SourceRef};

    fn remote_b_song() -> Song {
        let id = EntityId::new(SourceKind::RemoteB, "den", "abc:1");
        Song::new(id, "Teardrop", SourceRef::new(SourceKind::RemoteB, "den"))
            .with_artist("Massive Attack", Some(EntityId::new(SourceKind::RemoteB, "den", "ar9")))
            .with_album("Mezzanine", None)
    }

    #[test]
    fn test_build_uid() {
        assert_eq!(build_uid("Local", "SONG", Some(" 7 "), "x"), "local:song:7");

        let a = build_uid("subsonic", "song", None, "teardrop massive attack");
        let b = build_uid("subsonic", "song", Some(""), "teardrop massive attack");
        let c = build_uid("subsonic", "song", None, "angel massive attack");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("subsonic:song:h"));
        assert_eq!(a.len(), "subsonic:song:h".len() + 16);
    }

    #[test]
    fn test_builder_tags_ids() {
        let rows = SearchIndexBuilder::new(42).songs([&remote_b_song()]).build();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.item_id.as_deref(), Some("jellyfin:den:abc:1"));
        assert_eq!(row.uid, "jellyfin:song:jellyfin:den:abc:1");
        assert_eq!(row.search_text, "teardrop massive attack mezzanine");
        assert_eq!(row.artist_id.as_deref(), Some("jellyfin:den:ar9"));
        assert_eq!(row.updated_at, 42);
    }

    #[test]
    fn test_to_song_restores_identity() {
        let registry = SourceRegistry::new();
        registry.register(SourceRef::new(SourceKind::RemoteB, "den").with_display_name("Den"));

        let original = remote_b_song();
        let rows = SearchIndexBuilder::new(0).songs([&original]).build();
        let song = to_song(&rows[0], &registry).unwrap();

        assert_eq!(song.id, original.id);
        assert_eq!(song.artist_id, original.artist_id);
        assert_eq!(song.source.label(), "Den");
        assert!(song.native.is_detached());
    }

    #[test]
    fn test_to_song_skips_other_rows() {
        let registry = SourceRegistry::new();
        let artist = Artist {
            id: EntityId::new(SourceKind::Local, "local", "a"),
            name: "Air".into(),
            sort_name: None,
            album_count: None,
            song_count: None,
            artwork: None,
            source: SourceRef::local(),
            native: NativeRef::Detached,
        };
        let rows = SearchIndexBuilder::new(0).artists([&artist]).build();
        assert!(to_song(&rows[0], &registry).is_none());
    }

    #[tokio::test]
    async fn test_in_memory_search() {
        let index = InMemorySearchIndex::new();
        index.upsert(SearchIndexBuilder::new(0).songs([&remote_b_song()]).build());

        assert_eq!(index.search("MASSIVE tear", 10).await.unwrap().len(), 1);
        assert!(index.search("portishead", 10).await.unwrap().is_empty());
        assert!(index.search("  ", 10).await.unwrap().is_empty());

        let songs = index.songs(&SourceRegistry::new()).await.unwrap();
        assert_eq!(songs.len(), 1);

        index.replace_source("jellyfin", Vec::new());
        assert!(index.is_empty());
    }
}
