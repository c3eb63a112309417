//! # Library Model Module
//!
//! Backend-agnostic view of a federated music library.
//!
//! ## Overview
//!
//! This module owns:
//! - Canonical identity ([`identity`]) and the registry of configured instances
//! - Normalized entities and the native records they are mapped from
//! - The merge/dedupe engine used to collapse per-backend lists
//! - The search index projection, a single-namespace table of tagged ids
//!
//! Nothing here performs I/O; loading and scheduling live in
//! `core-federation`, shuffle state in `core-playback`.

pub mod catalog;
pub mod dedupe;
pub mod error;
pub mod identity;
pub mod mapping;
pub mod models;
pub mod normalize;
pub mod registry;
pub mod search_index;

pub use dedupe::{
    merge_albums, merge_artists, merge_entities, merge_genres, merge_playlists, merge_songs,
    Dedupe, SourcePreference,
};
pub use error::{LibraryError, Result};
pub use identity::{EntityId, SourceKind, SourceRef};
pub use mapping::CatalogMapper;
pub use models::{Album, Artist, Artwork, EntityKind, Genre, NativeRef, Playlist, Song};
pub use registry::SourceRegistry;
pub use search_index::{InMemorySearchIndex, SearchIndex, SearchIndexBuilder, SearchIndexEntry};
