//! Affinity mixes and made-for-you seed selection.
//!
//! A mix starts from one seed song and leans on songs by the same artist:
//! artist matches come first in random order, the rest of the library only
//! fills whatever length the matches cannot.

use std::collections::{HashMap, HashSet};

use core_library::{EntityId, Song};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::permutation::shuffle;

/// Seed for a mix: a favorited song, else the latest played song, else any.
///
/// `recent` holds tagged ids, most recent first.
pub fn pick_seed<'a, R: Rng + ?Sized>(songs: &'a [Song], recent: &[String], rng: &mut R) -> Option<&'a Song> {
    let favorites: Vec<&Song> = songs.iter().filter(|song| song.is_favorited()).collect();
    if let Some(song) = favorites.choose(rng) {
        return Some(*song);
    }

    if let Some(latest) = recent.first() {
        if let Some(song) = songs.iter().find(|song| &song.id.to_tagged() == latest) {
            return Some(song);
        }
    }

    songs.choose(rng)
}

fn same_artist(seed: &Song, candidate: &Song) -> bool {
    if let (Some(a), Some(b)) = (&seed.artist_id, &candidate.artist_id) {
        if a == b {
            return true;
        }
    }
    match (seed.artist.as_deref(), candidate.artist.as_deref()) {
        (Some(a), Some(b)) if !a.trim().is_empty() => a.trim().to_lowercase() == b.trim().to_lowercase(),
        _ => false,
    }
}

/// Mix of at most `length` songs: the seed, then artist matches, then the rest.
///
/// When nothing matches the seed's artist the whole pool is used. Songs are
/// never repeated.
pub fn build_mix<R: Rng + ?Sized>(seed: &Song, pool: &[Song], length: usize, rng: &mut R) -> Vec<Song> {
    if length == 0 {
        return Vec::new();
    }

    let (mut matches, mut rest): (Vec<&Song>, Vec<&Song>) = pool
        .iter()
        .filter(|song| song.id != seed.id)
        .partition(|song| same_artist(seed, song));
    shuffle(&mut matches, rng);
    shuffle(&mut rest, rng);

    let mut seen: HashSet<&EntityId> = HashSet::new();
    seen.insert(&seed.id);

    let mut mix = Vec::with_capacity(length.min(pool.len() + 1));
    mix.push(seed.clone());
    for song in matches.into_iter().chain(rest) {
        if mix.len() >= length {
            break;
        }
        if seen.insert(&song.id) {
            mix.push(song.clone());
        }
    }
    mix
}

/// Up to `limit` distinct seed songs for made-for-you tiles.
///
/// Ordered by position in `recent` (tagged ids, most recent first), then
/// favorites, then title; one song per title and artist pair.
pub fn select_seeds(songs: &[Song], recent: &[String], limit: usize) -> Vec<Song> {
    if songs.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut rank: HashMap<&str, usize> = HashMap::new();
    for id in recent.iter().filter(|id| !id.trim().is_empty()) {
        let next = rank.len();
        rank.entry(id.as_str()).or_insert(next);
    }

    let mut ordered: Vec<(usize, bool, String, &Song)> = songs
        .iter()
        .map(|song| {
            let position = rank.get(song.id.to_tagged().as_str()).copied().unwrap_or(usize::MAX);
            (position, !song.is_favorited(), song.title.to_lowercase(), song)
        })
        .collect();
    ordered.sort_by(|a, b| (a.0, a.1, &a.2).cmp(&(b.0, b.1, &b.2)));

    let mut seen: HashSet<String> = HashSet::new();
    let mut seeds = Vec::with_capacity(limit);
    for (_, _, title, song) in ordered {
        let key = format!("{}|{}", title, song.artist.as_deref().unwrap_or_default().to_lowercase());
        if seen.insert(key) {
            seeds.push(song.clone());
            if seeds.len() >= limit {
                break;
            }
        }
    }
    seeds
}
