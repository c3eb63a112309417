//! Native record mapping
//!
//! The translation half of a source adapter: turns [`crate::catalog`] records
//! into normalized entities with resolved identities. Records that lack a
//! required title or name are dropped here and never reach the merge engine.
//!
//! ```rust
//! use core_library::catalog::CatalogSong;
//! use core_library::mapping::CatalogMapper;
//!
//! let mapper = CatalogMapper::remote_a("", None);
//! let song = mapper
//!     .map_song(CatalogSong {
//!         id: Some("tr-9".into()),
//!         title: Some("  Windowlicker ".into()),
//!         duration: Some(367),
//!         ..Default::default()
//!     })
//!     .unwrap();
//!
//! assert_eq!(song.title, "Windowlicker");
//! assert_eq!(song.id.instance_id(), "default");
//! assert_eq!(song.duration_ms, Some(367_000));
//! ```

use std::sync::Arc;

use crate::catalog::{CatalogAlbum, CatalogArtist, CatalogGenre, CatalogPlaylist, CatalogSong};
use crate::identity::{
    resolve_for_kind, EntityId, SourceKind, SourceRef, DEFAULT_REMOTE_A_INSTANCE,
    DEFAULT_REMOTE_B_INSTANCE,
};
use crate::models::{Album, Artist, Artwork, Genre, NativeRef, Playlist, Song};

/// Maps catalog records of one backend instance.
#[derive(Debug, Clone)]
pub struct CatalogMapper {
    source: SourceRef,
}

impl CatalogMapper {
    pub fn new(source: SourceRef) -> Self {
        Self { source }
    }

    /// Mapper for a RemoteA instance; a blank instance id becomes `"default"`.
    pub fn remote_a(instance_id: &str, display_name: Option<&str>) -> Self {
        Self::remote(SourceKind::RemoteA, instance_id, DEFAULT_REMOTE_A_INSTANCE, display_name)
    }

    pub fn remote_b(instance_id: &str, display_name: Option<&str>) -> Self {
        Self::remote(SourceKind::RemoteB, instance_id, DEFAULT_REMOTE_B_INSTANCE, display_name)
    }

    pub fn local() -> Self {
        Self::new(SourceRef::local())
    }

    fn remote(kind: SourceKind, instance_id: &str, default: &str, display_name: Option<&str>) -> Self {
        let instance = match instance_id.trim() {
            "" => default,
            trimmed => trimmed,
        };
        let mut source = SourceRef::new(kind, instance);
        if let Some(name) = display_name {
            source = source.with_display_name(name);
        }
        Self::new(source)
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    fn resolve(&self, raw: Option<&str>, fallback: &str) -> EntityId {
        resolve_for_kind(self.source.kind, &self.source.instance_id, raw, fallback)
    }

    fn related(&self, raw: Option<&str>) -> Option<EntityId> {
        let raw = clean(raw)?;
        Some(self.resolve(Some(&raw), &raw))
    }

    fn artwork(&self, cover_art_id: Option<&str>) -> Option<Artwork> {
        self.related(cover_art_id).map(|id| Artwork { id })
    }

    pub fn map_artist(&self, record: CatalogArtist) -> Option<Artist> {
        let name = clean(record.name.as_deref())?;
        let record = Arc::new(record);
        Some(Artist {
            id: self.resolve(record.id.as_deref(), &name),
            name,
            sort_name: clean(record.sort_name.as_deref()),
            album_count: positive(record.album_count),
            song_count: positive(record.song_count),
            artwork: self.artwork(record.cover_art_id.as_deref()),
            source: self.source.clone(),
            native: NativeRef::Artist(record),
        })
    }

    pub fn map_album(&self, record: CatalogAlbum) -> Option<Album> {
        let title = clean(record.name.as_deref())?;
        let record = Arc::new(record);
        Some(Album {
            id: self.resolve(record.id.as_deref(), &title),
            title,
            artist: clean(record.artist.as_deref()),
            artist_id: self.related(record.artist_id.as_deref()),
            year: positive(record.year),
            track_count: positive(record.song_count),
            artwork: self.artwork(record.cover_art_id.as_deref()),
            source: self.source.clone(),
            native: NativeRef::Album(record),
        })
    }

    pub fn map_song(&self, record: CatalogSong) -> Option<Song> {
        let title = clean(record.title.as_deref())?;
        let record = Arc::new(record);
        Some(Song {
            id: self.resolve(record.id.as_deref(), &title),
            title,
            artist: clean(record.artist.as_deref()),
            album: clean(record.album.as_deref()),
            artist_id: self.related(record.artist_id.as_deref()),
            album_id: self.related(record.album_id.as_deref()),
            duration_ms: seconds_to_millis(record.duration),
            track_number: positive(record.track),
            disc_number: positive(record.disc_number),
            year: positive(record.year),
            genre: clean(record.genre.as_deref()),
            artwork: self.artwork(record.cover_art_id.as_deref()),
            source: self.source.clone(),
            native: NativeRef::Song(record),
        })
    }

    pub fn map_playlist(&self, record: CatalogPlaylist) -> Option<Playlist> {
        let name = clean(record.name.as_deref())?;
        let record = Arc::new(record);
        Some(Playlist {
            id: self.resolve(record.id.as_deref(), &name),
            name,
            owner: clean(record.owner.as_deref()),
            song_count: positive(record.song_count),
            duration_ms: seconds_to_millis(record.duration),
            artwork: self.artwork(record.cover_art_id.as_deref()),
            source: self.source.clone(),
            native: NativeRef::Playlist(record),
        })
    }

    pub fn map_genre(&self, record: CatalogGenre) -> Option<Genre> {
        Some(Genre {
            name: clean(record.value.as_deref())?,
            song_count: positive(record.song_count).unwrap_or(0),
            album_count: positive(record.album_count).unwrap_or(0),
        })
    }

    pub fn map_artists(&self, records: impl IntoIterator<Item = CatalogArtist>) -> Vec<Artist> {
        records.into_iter().filter_map(|r| self.map_artist(r)).collect()
    }

    pub fn map_albums(&self, records: impl IntoIterator<Item = CatalogAlbum>) -> Vec<Album> {
        records.into_iter().filter_map(|r| self.map_album(r)).collect()
    }

    pub fn map_songs(&self, records: impl IntoIterator<Item = CatalogSong>) -> Vec<Song> {
        records.into_iter().filter_map(|r| self.map_song(r)).collect()
    }

    pub fn map_playlists(&self, records: impl IntoIterator<Item = CatalogPlaylist>) -> Vec<Playlist> {
        records.into_iter().filter_map(|r| self.map_playlist(r)).collect()
    }

    pub fn map_genres(&self, records: impl IntoIterator<Item = CatalogGenre>) -> Vec<Genre> {
        records.into_iter().filter_map(|r| self.map_genre(r)).collect()
    }
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn positive(value: Option<i64>) -> Option<u32> {
    value
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
}

fn seconds_to_millis(value: Option<i64>) -> Option<u64> {
    value
        .filter(|n| *n > 0)
        .and_then(|n| u64::try_from(n).ok())
        .map(|secs| secs.saturating_mul(1000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_titles_are_dropped() {
        let mapper = CatalogMapper::local();
        let songs = mapper.map_songs(vec![
            CatalogSong {
                title: Some("   ".into()),
                ..Default::default()
            },
            CatalogSong::default(),
            CatalogSong {
                title: Some("Kept".into()),
                ..Default::default()
            },
        ]);

        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].title, "Kept");
        // No native id: the title stands in.
        assert_eq!(songs[0].id.native_id(), "Kept");
    }

    #[test]
    fn test_numbers_and_related_ids() {
        let mapper = CatalogMapper::remote_a("home", Some("Home NAS"));
        let song = mapper
            .map_song(CatalogSong {
                id: Some("s1".into()),
                title: Some("Song".into()),
                artist: Some(" Artist ".into()),
                artist_id: Some("ar1".into()),
                album_id: Some("  ".into()),
                duration: Some(-3),
                track: Some(0),
                disc_number: Some(2),
                cover_art_id: Some("al-1".into()),
                starred: true,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(song.artist.as_deref(), Some("Artist"));
        assert_eq!(
            song.artist_id,
            Some(EntityId::new(SourceKind::RemoteA, "home", "ar1"))
        );
        assert_eq!(song.album_id, None);
        assert_eq!(song.duration_ms, None);
        assert_eq!(song.track_number, None);
        assert_eq!(song.disc_number, Some(2));
        assert_eq!(song.artwork.as_ref().unwrap().id.native_id(), "al-1");
        assert_eq!(song.source.label(), "Home NAS");
        assert!(song.is_favorited());
    }

    #[test]
    fn test_remote_b_records_with_tagged_ids() {
        let mapper = CatalogMapper::remote_b("den", None);
        let tagged = EntityId::new(SourceKind::RemoteB, "attic", "x1").to_tagged();
        let artist = mapper
            .map_artist(CatalogArtist {
                id: Some(tagged),
                name: Some("Portishead".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(artist.id, EntityId::new(SourceKind::RemoteB, "attic", "x1"));

        let bare = mapper
            .map_artist(CatalogArtist {
                id: Some("x2".into()),
                name: Some("Massive Attack".into()),
                song_count: Some(61),
                album_count: Some(0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(bare.id, EntityId::new(SourceKind::RemoteB, "den", "x2"));
        assert_eq!(bare.song_count, Some(61));
        assert_eq!(bare.album_count, None);
    }

    #[test]
    fn test_blank_remote_instances_use_defaults() {
        assert_eq!(CatalogMapper::remote_a(" ", None).source().instance_id, "default");
        assert_eq!(CatalogMapper::remote_b("", None).source().instance_id, "jellyfin");
    }

    #[test]
    fn test_refetch_yields_equal_ids() {
        let mapper = CatalogMapper::remote_a("home", None);
        let record = CatalogAlbum {
            id: Some("al-3".into()),
            name: Some("Mezzanine".into()),
            ..Default::default()
        };
        let first = mapper.map_album(record.clone()).unwrap();
        let second = mapper.map_album(record).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_genres() {
        let mapper = CatalogMapper::local();
        let genres = mapper.map_genres(vec![
            CatalogGenre {
                value: Some("Trip Hop".into()),
                song_count: Some(12),
                album_count: None,
            },
            CatalogGenre::default(),
        ]);
        assert_eq!(genres.len(), 1);
        assert_eq!(genres[0].song_count, 12);
        assert_eq!(genres[0].album_count, 0);
    }
}
