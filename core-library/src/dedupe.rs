//! # Merge/Dedupe Engine
//!
//! Collapses per-backend entity lists into one list with no duplicate
//! real-world items.
//!
//! ## Keys
//!
//! | Entity   | Key                                                        |
//! |----------|------------------------------------------------------------|
//! | Artist   | `normalize(name)`                                          |
//! | Album    | `normalize(title)|normalize(artist)`                       |
//! | Song     | `normalize(title)|normalize(artist)|normalize(album)`      |
//! | Playlist | `normalize(name)`                                          |
//!
//! An entity whose title normalizes to nothing (all punctuation) is keyed by
//! its canonical id instead, so it only collapses with itself.
//!
//! ## Resolution
//!
//! The incumbent stays unless the candidate has a strictly higher detail score,
//! or an equal score and a source kind ranked strictly earlier in the
//! [`SourcePreference`]. Surviving groups keep first-seen order.
//!
//! Every function here is pure.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{LibraryError, Result};
use crate::identity::{EntityId, SourceKind};
use crate::models::{Album, Artist, Genre, Playlist, Song};
use crate::normalize::{normalize, normalize_opt};

// =============================================================================
// Source preference
// =============================================================================

/// Ordered list of source kinds used as the merge tie-break.
///
/// Kinds that are not listed rank after every listed kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePreference {
    order: Vec<SourceKind>,
}

impl Default for SourcePreference {
    fn default() -> Self {
        Self {
            order: vec![SourceKind::Local, SourceKind::RemoteA, SourceKind::RemoteB],
        }
    }
}

impl SourcePreference {
    /// Builds a preference from `order`, keeping the first occurrence of each
    /// kind. An empty order yields the default.
    pub fn new(order: impl IntoIterator<Item = SourceKind>) -> Self {
        let mut deduped = Vec::new();
        for kind in order {
            if !deduped.contains(&kind) {
                deduped.push(kind);
            }
        }
        if deduped.is_empty() {
            return Self::default();
        }
        Self { order: deduped }
    }

    /// Strict parse of a comma-separated list of wire ids.
    ///
    /// Blank input yields the default; any unknown id is an error.
    pub fn parse(value: &str) -> Result<Self> {
        let mut kinds = Vec::new();
        for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let kind = SourceKind::from_wire_id(part).ok_or_else(|| {
                LibraryError::InvalidPreferenceOrder {
                    value: value.to_string(),
                    reason: format!("unknown source '{part}'"),
                }
            })?;
            kinds.push(kind);
        }
        Ok(Self::new(kinds))
    }

    /// Lenient parse for values read back from settings: unknown ids are
    /// skipped and an unusable value yields the default.
    pub fn from_setting(value: Option<&str>) -> Self {
        let kinds = value
            .unwrap_or_default()
            .split(',')
            .filter_map(SourceKind::from_wire_id);
        Self::new(kinds)
    }

    /// Position of `kind`; unlisted kinds share the last rank.
    pub fn rank(&self, kind: SourceKind) -> usize {
        self.order
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(self.order.len())
    }

    pub fn order(&self) -> &[SourceKind] {
        &self.order
    }

    /// Comma-separated wire ids, the inverse of [`SourcePreference::parse`].
    pub fn to_setting_string(&self) -> String {
        self.order
            .iter()
            .map(|k| k.wire_id())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for SourcePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_setting_string())
    }
}

// =============================================================================
// Dedupe contract
// =============================================================================

/// What the merge engine needs from an entity.
pub trait Dedupe {
    fn dedupe_key(&self) -> String;

    /// Number of informative fields the entity carries.
    fn detail_score(&self) -> u32;

    fn source_kind(&self) -> SourceKind;
}

fn count(fields: &[bool]) -> u32 {
    fields.iter().filter(|present| **present).count() as u32
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn key_or_id(title: &str, rest: &[Option<&str>], id: &EntityId) -> String {
    let head = normalize(title);
    if head.is_empty() {
        return format!("#{}", id.to_tagged());
    }
    let mut key = head;
    for part in rest {
        key.push('|');
        key.push_str(&normalize_opt(*part));
    }
    key
}

impl Dedupe for Artist {
    fn dedupe_key(&self) -> String {
        key_or_id(&self.name, &[], &self.id)
    }

    fn detail_score(&self) -> u32 {
        count(&[
            !self.name.trim().is_empty(),
            filled(&self.sort_name),
            self.album_count.is_some_and(|n| n > 0),
            self.song_count.is_some_and(|n| n > 0),
            self.artwork.is_some(),
        ])
    }

    fn source_kind(&self) -> SourceKind {
        self.id.kind()
    }
}

impl Dedupe for Album {
    fn dedupe_key(&self) -> String {
        key_or_id(&self.title, &[self.artist.as_deref()], &self.id)
    }

    fn detail_score(&self) -> u32 {
        count(&[
            !self.title.trim().is_empty(),
            filled(&self.artist),
            self.artist_id.is_some(),
            self.year.is_some_and(|n| n > 0),
            self.track_count.is_some_and(|n| n > 0),
            self.artwork.is_some(),
        ])
    }

    fn source_kind(&self) -> SourceKind {
        self.id.kind()
    }
}

impl Dedupe for Song {
    fn dedupe_key(&self) -> String {
        key_or_id(
            &self.title,
            &[self.artist.as_deref(), self.album.as_deref()],
            &self.id,
        )
    }

    fn detail_score(&self) -> u32 {
        count(&[
            !self.title.trim().is_empty(),
            filled(&self.artist),
            filled(&self.album),
            self.artist_id.is_some(),
            self.album_id.is_some(),
            self.duration_ms.is_some_and(|n| n > 0),
            self.track_number.is_some_and(|n| n > 0),
            self.disc_number.is_some_and(|n| n > 0),
            self.year.is_some_and(|n| n > 0),
            filled(&self.genre),
            self.artwork.is_some(),
        ])
    }

    fn source_kind(&self) -> SourceKind {
        self.id.kind()
    }
}

impl Dedupe for Playlist {
    fn dedupe_key(&self) -> String {
        key_or_id(&self.name, &[], &self.id)
    }

    fn detail_score(&self) -> u32 {
        count(&[
            !self.name.trim().is_empty(),
            filled(&self.owner),
            self.song_count.is_some_and(|n| n > 0),
            self.duration_ms.is_some_and(|n| n > 0),
            self.artwork.is_some(),
        ])
    }

    fn source_kind(&self) -> SourceKind {
        self.id.kind()
    }
}

// =============================================================================
// Merge
// =============================================================================

fn should_prefer<T: Dedupe>(candidate: &T, incumbent: &T, preference: &SourcePreference) -> bool {
    let (candidate_score, incumbent_score) = (candidate.detail_score(), incumbent.detail_score());
    if candidate_score != incumbent_score {
        return candidate_score > incumbent_score;
    }
    preference.rank(candidate.source_kind()) < preference.rank(incumbent.source_kind())
}

/// Flattens `lists` in order and collapses entities with equal keys.
///
/// Each list may be anything iterable, so `Option<Vec<T>>` inputs skip `None`
/// for free.
pub fn merge_entities<T, I, L>(lists: I, preference: &SourcePreference) -> Vec<T>
where
    T: Dedupe,
    I: IntoIterator<Item = L>,
    L: IntoIterator<Item = T>,
{
    let mut merged: Vec<T> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for candidate in lists.into_iter().flatten() {
        let key = candidate.dedupe_key();
        match slots.get(&key) {
            Some(&slot) => {
                if should_prefer(&candidate, &merged[slot], preference) {
                    merged[slot] = candidate;
                }
            }
            None => {
                slots.insert(key, merged.len());
                merged.push(candidate);
            }
        }
    }

    merged
}

pub fn merge_artists<I, L>(lists: I, preference: &SourcePreference) -> Vec<Artist>
where
    I: IntoIterator<Item = L>,
    L: IntoIterator<Item = Artist>,
{
    merge_entities(lists, preference)
}

pub fn merge_albums<I, L>(lists: I, preference: &SourcePreference) -> Vec<Album>
where
    I: IntoIterator<Item = L>,
    L: IntoIterator<Item = Album>,
{
    merge_entities(lists, preference)
}

pub fn merge_songs<I, L>(lists: I, preference: &SourcePreference) -> Vec<Song>
where
    I: IntoIterator<Item = L>,
    L: IntoIterator<Item = Song>,
{
    merge_entities(lists, preference)
}

pub fn merge_playlists<I, L>(lists: I, preference: &SourcePreference) -> Vec<Playlist>
where
    I: IntoIterator<Item = L>,
    L: IntoIterator<Item = Playlist>,
{
    merge_entities(lists, preference)
}

/// Merges genres by normalized name, keeping the first display name and the
/// largest counts, sorted case-insensitively.
pub fn merge_genres<I, L>(lists: I) -> Vec<Genre>
where
    I: IntoIterator<Item = L>,
    L: IntoIterator<Item = Genre>,
{
    let mut merged: Vec<Genre> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for genre in lists.into_iter().flatten() {
        let key = normalize(&genre.name);
        if key.is_empty() {
            continue;
        }
        match slots.get(&key) {
            Some(&slot) => {
                let existing = &mut merged[slot];
                existing.song_count = existing.song_count.max(genre.song_count);
                existing.album_count = existing.album_count.max(genre.album_count);
            }
            None => {
                slots.insert(key, merged.len());
                merged.push(genre);
            }
        }
    }

    merged.sort_by_cached_key(|g| g.name.to_lowercase());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SourceRef;
    use crate::models::Artwork;

    fn song(kind: SourceKind, native: &str, title: &str) -> Song {
        let source = SourceRef::new(kind, "i");
        Song::new(EntityId::new(kind, "i", native), title, source)
    }

    #[test]
    fn test_preference_parse() {
        let pref = SourcePreference::parse(" jellyfin , local,jellyfin").unwrap();
        assert_eq!(pref.order(), &[SourceKind::RemoteB, SourceKind::Local]);
        assert_eq!(pref.rank(SourceKind::RemoteA), 2);
        assert_eq!(pref.to_setting_string(), "jellyfin,local");

        assert_eq!(SourcePreference::parse("  ").unwrap(), SourcePreference::default());
        assert!(matches!(
            SourcePreference::parse("local,tidal"),
            Err(LibraryError::InvalidPreferenceOrder { .. })
        ));
    }

    #[test]
    fn test_preference_from_setting_is_lenient() {
        assert_eq!(
            SourcePreference::from_setting(Some("tidal,subsonic")).order(),
            &[SourceKind::RemoteA]
        );
        assert_eq!(SourcePreference::from_setting(None), SourcePreference::default());
        assert_eq!(
            SourcePreference::from_setting(Some("garbage")),
            SourcePreference::default()
        );
    }

    #[test]
    fn test_song_keys_ignore_case_and_punctuation() {
        let a = song(SourceKind::Local, "1", "Bitter Sweet Symphony").with_artist("The Verve", None);
        let b = song(SourceKind::RemoteA, "2", "bitter sweet  symphony!").with_artist("the verve", None);
        assert_eq!(a.dedupe_key(), b.dedupe_key());

        let c = song(SourceKind::RemoteA, "3", "Bitter Sweet Symphony").with_artist("Other", None);
        assert_ne!(a.dedupe_key(), c.dedupe_key());
    }

    #[test]
    fn test_punctuation_only_titles_key_by_id() {
        let a = song(SourceKind::Local, "1", "???");
        let b = song(SourceKind::Local, "2", "!!!");
        assert_ne!(a.dedupe_key(), b.dedupe_key());
    }

    #[test]
    fn test_detail_score_counts_informative_fields() {
        let bare = song(SourceKind::Local, "1", "X");
        assert_eq!(bare.detail_score(), 1);

        let mut rich = song(SourceKind::Local, "1", "X").with_artist("A", None);
        rich.duration_ms = Some(1000);
        rich.track_number = Some(0);
        rich.artwork = Some(Artwork {
            id: EntityId::new(SourceKind::Local, "local", "cover"),
        });
        assert_eq!(rich.detail_score(), 4);
    }

    #[test]
    fn test_merge_keeps_first_seen_order_of_groups() {
        let pref = SourcePreference::default();
        let merged = merge_songs(
            vec![
                vec![song(SourceKind::RemoteA, "a", "A"), song(SourceKind::RemoteA, "b", "B")],
                vec![song(SourceKind::Local, "c", "C"), song(SourceKind::Local, "a2", "A")],
            ],
            &pref,
        );

        let titles: Vec<_> = merged.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        // Equal scores: Local outranks RemoteA and takes the slot.
        assert_eq!(merged[0].id.native_id(), "a2");
    }

    #[test]
    fn test_unlisted_kinds_rank_last_and_incumbent_wins_ties() {
        let pref = SourcePreference::new([SourceKind::RemoteA]);
        let merged = merge_songs(
            vec![
                vec![song(SourceKind::Local, "1", "X")],
                vec![song(SourceKind::RemoteB, "2", "X")],
            ],
            &pref,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id.native_id(), "1");
    }

    #[test]
    fn test_artist_song_count_breaks_preference() {
        let artist = |kind: SourceKind, song_count: Option<u32>| Artist {
            id: EntityId::new(kind, "i", "portishead"),
            name: "Portishead".into(),
            sort_name: None,
            album_count: None,
            song_count,
            artwork: None,
            source: SourceRef::new(kind, "i"),
            native: Default::default(),
        };
        assert_eq!(artist(SourceKind::RemoteB, Some(0)).detail_score(), 1);

        let merged = merge_artists(
            vec![
                vec![artist(SourceKind::Local, None)],
                vec![artist(SourceKind::RemoteB, Some(34))],
            ],
            &SourcePreference::default(),
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source.kind, SourceKind::RemoteB);
        assert_eq!(merged[0].song_count, Some(34));
    }

    #[test]
    fn test_none_lists_are_skipped() {
        let merged = merge_songs(
            vec![None, Some(vec![song(SourceKind::Local, "1", "X")]), None].into_iter().flatten(),
            &SourcePreference::default(),
        );
        assert_eq!(merged.len(), 1);

        let empty: Vec<Song> = merge_songs(Vec::<Vec<Song>>::new(), &SourcePreference::default());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_merge_genres() {
        let genres = merge_genres(vec![
            vec![
                Genre { name: "rock".into(), song_count: 3, album_count: 1 },
                Genre { name: "Ambient".into(), song_count: 1, album_count: 1 },
            ],
            vec![Genre { name: "Rock".into(), song_count: 9, album_count: 0 }],
        ]);

        assert_eq!(genres.len(), 2);
        assert_eq!(genres[0].name, "Ambient");
        assert_eq!(genres[1].name, "rock");
        assert_eq!(genres[1].song_count, 9);
        assert_eq!(genres[1].album_count, 1);
    }
}
