//! # Shuffle & Mix Module
//!
//! Continuous shuffled playback over the federated song set.
//!
//! ## Overview
//!
//! This module handles:
//! - Deterministic seeded permutations ([`permutation`])
//! - Song snapshots and their identity fingerprint, with a search-index fallback
//! - Shuffle sessions that survive restarts through the host settings store
//! - The [`ShuffleEngine`], which serializes every session mutation
//! - Affinity mixes and made-for-you seed tiles ([`mix`])

pub mod engine;
pub mod error;
pub mod mix;
pub mod permutation;
pub mod session;
pub mod snapshot;
pub mod state_store;

pub use engine::ShuffleEngine;
pub use error::{PlaybackError, Result};
pub use session::ShuffleSession;
pub use snapshot::{IndexSongSource, SnapshotCapture, SongLoad, SongSnapshot, SongSource};
pub use state_store::{ShuffleState, ShuffleStateStore};
