//! Normalized library entities
//!
//! Backend-agnostic artists, albums, songs, playlists and genres. Every entity
//! carries its canonical [`EntityId`], the [`SourceRef`] of the instance it came
//! from, and a [`NativeRef`] back to the adapter's record.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::{CatalogAlbum, CatalogArtist, CatalogPlaylist, CatalogSong};
use crate::identity::{EntityId, SourceKind, SourceRef};

// =============================================================================
// Native back-reference
// =============================================================================

/// Read-only handle on the record an entity was mapped from.
///
/// Entities rebuilt from a flattened store (the search index) have no native
/// record and carry `Detached`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum NativeRef {
    #[default]
    Detached,
    Artist(Arc<CatalogArtist>),
    Album(Arc<CatalogAlbum>),
    Song(Arc<CatalogSong>),
    Playlist(Arc<CatalogPlaylist>),
}

impl NativeRef {
    /// Backend favorite flag; playlists and detached entities are never favorited.
    pub fn is_favorited(&self) -> bool {
        match self {
            NativeRef::Artist(record) => record.starred,
            NativeRef::Album(record) => record.starred,
            NativeRef::Song(record) => record.starred,
            NativeRef::Playlist(_) | NativeRef::Detached => false,
        }
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, NativeRef::Detached)
    }
}

// =============================================================================
// Entities
// =============================================================================

/// Reference to cover art owned by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artwork {
    pub id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: EntityId,
    pub name: String,
    pub sort_name: Option<String>,
    pub album_count: Option<u32>,
    pub song_count: Option<u32>,
    pub artwork: Option<Artwork>,
    pub source: SourceRef,
    #[serde(skip)]
    pub native: NativeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: EntityId,
    pub title: String,
    pub artist: Option<String>,
    pub artist_id: Option<EntityId>,
    pub year: Option<u32>,
    pub track_count: Option<u32>,
    pub artwork: Option<Artwork>,
    pub source: SourceRef,
    #[serde(skip)]
    pub native: NativeRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: EntityId,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub artist_id: Option<EntityId>,
    pub album_id: Option<EntityId>,
    pub duration_ms: Option<u64>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub year: Option<u32>,
    pub genre: Option<String>,
    pub artwork: Option<Artwork>,
    pub source: SourceRef,
    #[serde(skip)]
    pub native: NativeRef,
}

impl Song {
    /// Minimal song with only the required fields populated.
    pub fn new(id: EntityId, title: impl Into<String>, source: SourceRef) -> Self {
        Self {
            id,
            title: title.into(),
            artist: None,
            album: None,
            artist_id: None,
            album_id: None,
            duration_ms: None,
            track_number: None,
            disc_number: None,
            year: None,
            genre: None,
            artwork: None,
            source,
            native: NativeRef::Detached,
        }
    }

    pub fn with_artist(mut self, name: impl Into<String>, id: Option<EntityId>) -> Self {
        self.artist = Some(name.into());
        self.artist_id = id;
        self
    }

    pub fn with_album(mut self, title: impl Into<String>, id: Option<EntityId>) -> Self {
        self.album = Some(title.into());
        self.album_id = id;
        self
    }

    pub fn is_favorited(&self) -> bool {
        self.native.is_favorited()
    }

    pub fn kind(&self) -> SourceKind {
        self.id.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: EntityId,
    pub name: String,
    pub owner: Option<String>,
    pub song_count: Option<u32>,
    pub duration_ms: Option<u64>,
    pub artwork: Option<Artwork>,
    pub source: SourceRef,
    #[serde(skip)]
    pub native: NativeRef,
}

/// Genre facet; merged by name across backends rather than by identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub name: String,
    pub song_count: u32,
    pub album_count: u32,
}

/// Which list an aggregation request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Artist,
    Album,
    Song,
    Playlist,
    Genre,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Album => "album",
            EntityKind::Song => "song",
            EntityKind::Playlist => "playlist",
            EntityKind::Genre => "genre",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
