//! One shuffle session: persisted fields plus the permutation they index.

use std::sync::Arc;

use core_library::Song;
use core_runtime::config::ShuffleTuning;

use crate::error::{PlaybackError, Result};
use crate::permutation::permutation;
use crate::snapshot::SongSnapshot;
use crate::state_store::{ShuffleState, KEY_CURSOR};

/// Extra seeds tried when a reseed would replay the previous order.
const MAX_RESEED_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
pub struct ShuffleSession {
    state: ShuffleState,
    snapshot: Arc<SongSnapshot>,
    order: Vec<usize>,
    persistent: bool,
}

impl ShuffleSession {
    /// New session at cursor zero.
    pub fn start(snapshot: Arc<SongSnapshot>, seed: i64, session_id: i64) -> Self {
        let seed = non_zero(seed);
        let mut state = ShuffleState::new(seed, session_id);
        state.fingerprint = Some(snapshot.fingerprint().to_string());
        Self {
            order: permutation(snapshot.len(), seed),
            state,
            snapshot,
            persistent: true,
        }
    }

    /// Rebuilds a persisted session over `snapshot`.
    ///
    /// Fails when the cursor points past the snapshot.
    pub fn resume(snapshot: Arc<SongSnapshot>, mut state: ShuffleState) -> Result<Self> {
        if state.cursor > snapshot.len() {
            return Err(PlaybackError::corrupt(
                KEY_CURSOR,
                format!("cursor {} beyond snapshot of {}", state.cursor, snapshot.len()),
            ));
        }
        state.active = true;
        state.fingerprint = Some(snapshot.fingerprint().to_string());
        Ok(Self {
            order: permutation(snapshot.len(), state.seed),
            state,
            snapshot,
            persistent: true,
        })
    }

    /// Session over a degraded snapshot that borrows a persisted session's
    /// seed and history but never writes back.
    pub fn detached(snapshot: Arc<SongSnapshot>, mut state: ShuffleState) -> Self {
        state.cursor = state.cursor.min(snapshot.len());
        let mut session = Self {
            order: permutation(snapshot.len(), state.seed),
            state,
            snapshot,
            persistent: false,
        };
        session.state.active = true;
        session
    }

    pub fn state(&self) -> &ShuffleState {
        &self.state
    }

    pub fn snapshot(&self) -> &SongSnapshot {
        &self.snapshot
    }

    pub fn session_id(&self) -> i64 {
        self.state.session_id
    }

    /// Whether mutations should be written to the state store.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Up to `count` songs from the cursor, wrapping into a fresh order.
    ///
    /// `next_seed` is asked for a seed on every wrap; the seeds actually used
    /// are returned alongside the batch.
    pub fn next_batch(&mut self, count: usize, mut next_seed: impl FnMut() -> i64) -> (Vec<Song>, Vec<i64>) {
        let len = self.snapshot.len();
        let mut batch = Vec::with_capacity(count.min(len));
        let mut reseeds = Vec::new();
        if len == 0 {
            return (batch, reseeds);
        }

        while batch.len() < count {
            if self.state.cursor >= len {
                reseeds.push(self.reseed(next_seed()));
            }
            let index = self.order[self.state.cursor];
            self.state.cursor += 1;
            if let Some(song) = self.snapshot.get(index) {
                batch.push(song.clone());
            }
        }
        (batch, reseeds)
    }

    fn reseed(&mut self, candidate: i64) -> i64 {
        let len = self.snapshot.len();
        let mut seed = non_zero(candidate);
        if seed == self.state.seed {
            seed = non_zero(seed.wrapping_add(1));
        }

        let mut order = permutation(len, seed);
        let mut attempts = 0;
        while len > 1 && order == self.order && attempts < MAX_RESEED_ATTEMPTS {
            seed = non_zero(seed.wrapping_add(1));
            order = permutation(len, seed);
            attempts += 1;
        }

        self.order = order;
        self.state.seed = seed;
        self.state.cursor = 0;
        seed
    }

    /// Records a played song and bumps the refill counter if asked to.
    pub fn record_advance(&mut self, played: &str, increment_consumed: bool, history_limit: usize) {
        self.state.record_played(played, history_limit);
        if increment_consumed {
            self.state.consumed_since_refill += 1;
        }
    }

    /// True when a refill is due; the consumed counter is reset when it is.
    pub fn take_refill(&mut self, remaining_queue: usize, tuning: &ShuffleTuning) -> bool {
        let due = self.state.consumed_since_refill >= tuning.refill_threshold
            || remaining_queue <= tuning.append_threshold;
        if due {
            self.state.consumed_since_refill = 0;
        }
        due
    }
}

/// Zero marks "no session" in the store.
pub(crate) fn non_zero(seed: i64) -> i64 {
    if seed == 0 {
        1
    } else {
        seed
    }
}
