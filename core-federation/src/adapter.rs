//! # Source Adapters
//!
//! The boundary between one configured backend instance and the coordinator.
//!
//! A [`SourceAdapter`] hands out normalized entities that already carry their
//! resolved [`EntityId`](core_library::EntityId) and [`SourceRef`]. Failures
//! are plain `Err` values here; [`ResilientSource`](crate::ResilientSource)
//! turns them into empty lists before they reach the join.
//!
//! Backends that speak the shared catalog record shape implement the smaller
//! [`CatalogBackend`] trait and get a full adapter from [`CatalogAdapter`],
//! which runs every record through a [`CatalogMapper`].

use async_trait::async_trait;
use core_library::catalog::{CatalogAlbum, CatalogArtist, CatalogGenre, CatalogPlaylist, CatalogSong};
use core_library::{
    merge_albums, merge_artists, merge_genres, merge_playlists, merge_songs, Album, Artist,
    CatalogMapper, EntityKind, Genre, Playlist, Song, SourcePreference, SourceRef,
};
use futures::future::BoxFuture;

use crate::error::Result;

/// One backend instance as seen by the aggregation coordinator.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Descriptor of the instance this adapter loads from.
    fn source(&self) -> &SourceRef;

    async fn load_artists(&self) -> Result<Vec<Artist>>;

    async fn load_albums(&self) -> Result<Vec<Album>>;

    async fn load_songs(&self) -> Result<Vec<Song>>;

    async fn load_playlists(&self) -> Result<Vec<Playlist>>;

    /// Backends without a genre listing contribute nothing.
    async fn load_genres(&self) -> Result<Vec<Genre>> {
        Ok(Vec::new())
    }
}

/// An entity kind the coordinator can load and merge.
pub trait FederatedKind: Sized + Send + 'static {
    const KIND: EntityKind;

    fn load(adapter: &dyn SourceAdapter) -> BoxFuture<'_, Result<Vec<Self>>>;

    fn merge(lists: Vec<Vec<Self>>, preference: &SourcePreference) -> Vec<Self>;
}

impl FederatedKind for Artist {
    const KIND: EntityKind = EntityKind::Artist;

    fn load(adapter: &dyn SourceAdapter) -> BoxFuture<'_, Result<Vec<Self>>> {
        adapter.load_artists()
    }

    fn merge(lists: Vec<Vec<Self>>, preference: &SourcePreference) -> Vec<Self> {
        merge_artists(lists, preference)
    }
}

impl FederatedKind for Album {
    const KIND: EntityKind = EntityKind::Album;

    fn load(adapter: &dyn SourceAdapter) -> BoxFuture<'_, Result<Vec<Self>>> {
        adapter.load_albums()
    }

    fn merge(lists: Vec<Vec<Self>>, preference: &SourcePreference) -> Vec<Self> {
        merge_albums(lists, preference)
    }
}

impl FederatedKind for Song {
    const KIND: EntityKind = EntityKind::Song;

    fn load(adapter: &dyn SourceAdapter) -> BoxFuture<'_, Result<Vec<Self>>> {
        adapter.load_songs()
    }

    fn merge(lists: Vec<Vec<Self>>, preference: &SourcePreference) -> Vec<Self> {
        merge_songs(lists, preference)
    }
}

impl FederatedKind for Playlist {
    const KIND: EntityKind = EntityKind::Playlist;

    fn load(adapter: &dyn SourceAdapter) -> BoxFuture<'_, Result<Vec<Self>>> {
        adapter.load_playlists()
    }

    fn merge(lists: Vec<Vec<Self>>, preference: &SourcePreference) -> Vec<Self> {
        merge_playlists(lists, preference)
    }
}

impl FederatedKind for Genre {
    const KIND: EntityKind = EntityKind::Genre;

    fn load(adapter: &dyn SourceAdapter) -> BoxFuture<'_, Result<Vec<Self>>> {
        adapter.load_genres()
    }

    // Genres carry no source, so preference has nothing to break.
    fn merge(lists: Vec<Vec<Self>>, _preference: &SourcePreference) -> Vec<Self> {
        merge_genres(lists)
    }
}

// ============================================================================
// Catalog-record backends
// ============================================================================

/// A backend that returns raw catalog records.
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    async fn fetch_artists(&self) -> Result<Vec<CatalogArtist>>;

    async fn fetch_albums(&self) -> Result<Vec<CatalogAlbum>>;

    async fn fetch_songs(&self) -> Result<Vec<CatalogSong>>;

    async fn fetch_playlists(&self) -> Result<Vec<CatalogPlaylist>>;

    async fn fetch_genres(&self) -> Result<Vec<CatalogGenre>> {
        Ok(Vec::new())
    }
}

/// [`SourceAdapter`] over a [`CatalogBackend`]; unmappable records are dropped.
pub struct CatalogAdapter<B> {
    backend: B,
    mapper: CatalogMapper,
}

impl<B: CatalogBackend> CatalogAdapter<B> {
    pub fn new(backend: B, mapper: CatalogMapper) -> Self {
        Self { backend, mapper }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: CatalogBackend> SourceAdapter for CatalogAdapter<B> {
    fn source(&self) -> &SourceRef {
        self.mapper.source()
    }

    async fn load_artists(&self) -> Result<Vec<Artist>> {
        Ok(self.mapper.map_artists(self.backend.fetch_artists().await?))
    }

    async fn load_albums(&self) -> Result<Vec<Album>> {
        Ok(self.mapper.map_albums(self.backend.fetch_albums().await?))
    }

    async fn load_songs(&self) -> Result<Vec<Song>> {
        Ok(self.mapper.map_songs(self.backend.fetch_songs().await?))
    }

    async fn load_playlists(&self) -> Result<Vec<Playlist>> {
        Ok(self.mapper.map_playlists(self.backend.fetch_playlists().await?))
    }

    async fn load_genres(&self) -> Result<Vec<Genre>> {
        Ok(self.mapper.map_genres(self.backend.fetch_genres().await?))
    }
}
