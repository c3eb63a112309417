//! # Shuffle Engine
//!
//! Serves a logically endless, resumable shuffle over the current song set in
//! bounded batches, plus affinity mixes seeded from one song.
//!
//! ## Session lifecycle
//!
//! ```text
//!            start / first advance             clear
//!   Idle ─────────────────────────> Active ────────────> Idle
//!                                    │  ▲
//!                 advance / refill   └──┘   song set changed identity:
//!                                           fresh seed, new session
//! ```
//!
//! Every read-modify-write of the session runs under one async mutex. Changes
//! are made on a copy that replaces the live session only once it has been
//! persisted, so a batch handed to a caller is always backed by a persisted
//! cursor and a failed write leaves memory and store in agreement.
//!
//! ## Recovery
//!
//! - An empty snapshot yields no session and leaves persisted state alone
//! - A persisted session is resumed when its snapshot fingerprint still
//!   matches (or was never recorded)
//! - A degraded snapshot (a backend down or missing from the load) never
//!   replaces a persisted session; it is served from a detached copy that is
//!   not written back, and the persisted session is picked up again once a
//!   healthy snapshot arrives
//! - Corrupt persisted state is discarded and a fresh session started

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_traits::Clock;
use core_async::sync::Mutex;
use core_library::{EntityId, Song};
use core_runtime::config::{FederationConfig, ShuffleTuning};
use core_runtime::events::{CoreEvent, EventBus, ShuffleEvent};
use tracing::{debug, info, instrument, warn};

use crate::error::{PlaybackError, Result};
use crate::mix::{build_mix, pick_seed, select_seeds};
use crate::permutation::rng_for;
use crate::session::ShuffleSession;
use crate::snapshot::{SnapshotCapture, SongSnapshot};
use crate::state_store::{ShuffleState, ShuffleStateStore};

pub struct ShuffleEngine {
    /// The active session, if any
    session: Mutex<Option<ShuffleSession>>,

    store: ShuffleStateStore,

    capture: SnapshotCapture,

    /// Source of fresh seeds and session ids
    clock: Arc<dyn Clock>,

    tuning: ShuffleTuning,

    events: EventBus,

    closed: AtomicBool,
}

impl ShuffleEngine {
    pub fn new(
        store: ShuffleStateStore,
        capture: SnapshotCapture,
        clock: Arc<dyn Clock>,
        tuning: ShuffleTuning,
        events: EventBus,
    ) -> Self {
        Self {
            session: Mutex::new(None),
            store,
            capture,
            clock,
            tuning,
            events,
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &FederationConfig, capture: SnapshotCapture, events: EventBus) -> Self {
        Self::new(
            ShuffleStateStore::new(Arc::clone(&config.settings_store)),
            capture,
            Arc::clone(&config.clock),
            config.shuffle,
            events,
        )
    }

    pub fn tuning(&self) -> &ShuffleTuning {
        &self.tuning
    }

    /// Starts or resumes shuffle-all and returns the initial batch.
    pub async fn start(&self, force_new: bool) -> Result<Vec<Song>> {
        self.ensure_open()?;
        let snapshot = self.capture.capture().await;
        self.start_with(snapshot, force_new).await
    }

    /// [`start`](Self::start) over an already captured snapshot.
    #[instrument(skip(self, snapshot), fields(songs = snapshot.len(), degraded = snapshot.is_degraded()))]
    pub async fn start_with(&self, snapshot: SongSnapshot, force_new: bool) -> Result<Vec<Song>> {
        self.ensure_open()?;
        if snapshot.is_empty() {
            debug!("Empty song snapshot; no shuffle session");
            return Ok(Vec::new());
        }

        let mut slot = self.session.lock().await;
        self.ensure_open()?;
        let previous = slot.clone();
        let resumed = self.ensure_session(&mut slot, snapshot, force_new).await?;
        let Some(session) = slot.as_mut() else {
            return Ok(Vec::new());
        };

        let count = self.tuning.initial_batch;
        let (batch, reseeds) = match self.commit(session, |next| self.draw(next, count)).await {
            Ok(drawn) => drawn,
            Err(err) => {
                *slot = previous;
                return Err(err);
            }
        };
        let Some(session) = slot.as_ref() else {
            return Ok(batch);
        };
        self.emit_reseeds(session.session_id(), reseeds);

        info!(session_id = session.session_id(), resumed, size = session.snapshot().len(), "Shuffle session started");
        self.emit(ShuffleEvent::SessionStarted {
            session_id: session.session_id(),
            resumed,
            size: session.snapshot().len(),
        });
        Ok(batch)
    }

    /// Up to `count` more songs from the active session.
    pub async fn next_batch(&self, count: usize) -> Result<Vec<Song>> {
        self.ensure_open()?;
        let mut slot = self.session.lock().await;
        self.ensure_open()?;
        let Some(session) = slot.as_mut() else {
            return Ok(Vec::new());
        };

        let (batch, reseeds) = self.commit(session, |next| self.draw(next, count)).await?;
        self.emit_reseeds(session.session_id(), reseeds);
        Ok(batch)
    }

    /// Records a played song; returns an append batch when a refill is due.
    ///
    /// After a restart the persisted session is resumed on the first advance.
    #[instrument(skip(self, played), fields(played = %played))]
    pub async fn on_advance(
        &self,
        played: &EntityId,
        increment_consumed: bool,
        remaining_queue: usize,
    ) -> Result<Vec<Song>> {
        self.ensure_open()?;
        if self.session.lock().await.is_none() {
            self.resume_after_restart().await?;
        }

        let mut slot = self.session.lock().await;
        self.ensure_open()?;
        let Some(session) = slot.as_mut() else {
            return Ok(Vec::new());
        };

        let played = played.to_tagged();
        let tuning = self.tuning;
        let (batch, reseeds) = self
            .commit(session, |next| {
                next.record_advance(&played, increment_consumed, tuning.history_limit);
                if next.take_refill(remaining_queue, &tuning) {
                    self.draw(next, tuning.append_batch)
                } else {
                    (Vec::new(), Vec::new())
                }
            })
            .await?;
        self.emit_reseeds(session.session_id(), reseeds);

        if !batch.is_empty() {
            debug!(session_id = session.session_id(), count = batch.len(), "Appending shuffle batch");
            self.emit(ShuffleEvent::BatchAppended {
                session_id: session.session_id(),
                count: batch.len(),
            });
        }
        Ok(batch)
    }

    /// Ends the session, e.g. when unrelated playback starts.
    pub async fn clear(&self) -> Result<()> {
        self.ensure_open()?;
        let mut slot = self.session.lock().await;
        *slot = None;
        self.store.clear().await?;
        info!("Shuffle session cleared");
        self.emit(ShuffleEvent::Cleared);
        Ok(())
    }

    /// Snapshot of the active session's fields.
    pub async fn state(&self) -> Option<ShuffleState> {
        self.session.lock().await.as_ref().map(|s| s.state().clone())
    }

    pub async fn is_active(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Recently played tagged ids, most recent first.
    pub async fn recent_history(&self) -> Vec<String> {
        if let Some(session) = self.session.lock().await.as_ref() {
            return session.state().recent_history.iter().cloned().collect();
        }
        match self.store.load().await {
            Ok(Some(state)) => state.recent_history.into_iter().collect(),
            Ok(None) => Vec::new(),
            Err(err) => {
                debug!(error = %err, "No usable shuffle history");
                Vec::new()
            }
        }
    }

    /// Affinity mix from `seed`, or from a picked seed when `seed` is `None`
    /// or not in `songs`.
    pub async fn mix(&self, songs: &[Song], seed: Option<&EntityId>, length: Option<usize>) -> Vec<Song> {
        let history = self.recent_history().await;
        let mut rng = rng_for(self.clock.unix_timestamp_millis());

        let seed_song = seed
            .and_then(|id| songs.iter().find(|song| &song.id == id))
            .or_else(|| pick_seed(songs, &history, &mut rng));
        match seed_song {
            Some(seed_song) => build_mix(seed_song, songs, length.unwrap_or(self.tuning.mix_length), &mut rng),
            None => Vec::new(),
        }
    }

    /// Seed songs for the made-for-you tiles.
    pub async fn made_for_you(&self, songs: &[Song]) -> Vec<Song> {
        let history = self.recent_history().await;
        select_seeds(songs, &history, self.tuning.mix_tile_limit)
    }

    /// Rejects every later mutation. Idempotent.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Shuffle engine shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------------
    // Internals; callers hold the session lock
    // ------------------------------------------------------------------------

    fn ensure_open(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(PlaybackError::ShutDown);
        }
        Ok(())
    }

    async fn resume_after_restart(&self) -> Result<()> {
        match self.store.load().await {
            Ok(Some(_)) => {}
            Ok(None) => return Ok(()),
            Err(PlaybackError::CorruptState { key, reason }) => {
                warn!(%key, %reason, "Discarding corrupt shuffle state");
                return self.store.clear().await;
            }
            Err(err) => return Err(err),
        }

        let snapshot = self.capture.capture().await;
        if snapshot.is_empty() {
            return Ok(());
        }
        let mut slot = self.session.lock().await;
        if slot.is_none() {
            let resumed = self.ensure_session(&mut slot, snapshot, false).await?;
            if let Some(session) = slot.as_ref() {
                self.emit(ShuffleEvent::SessionStarted {
                    session_id: session.session_id(),
                    resumed,
                    size: session.snapshot().len(),
                });
            }
        }
        Ok(())
    }

    /// Fills `slot` with a session for `snapshot`; true when it was resumed.
    async fn ensure_session(
        &self,
        slot: &mut Option<ShuffleSession>,
        snapshot: SongSnapshot,
        force_new: bool,
    ) -> Result<bool> {
        let previous_id = slot.as_ref().map(|s| s.session_id());

        if !force_new {
            // A detached session only stands in while snapshots stay degraded.
            let current = slot
                .as_ref()
                .filter(|session| session.is_persistent() || snapshot.is_degraded());
            if let Some(session) = current {
                if snapshot.is_degraded() || session.snapshot().fingerprint() == snapshot.fingerprint() {
                    return Ok(true);
                }
                info!("Song set changed identity; starting a fresh shuffle");
            } else if let Some(session) = self.load_persisted(&snapshot).await? {
                *slot = Some(session);
                return Ok(true);
            }
        }

        let seed = self.clock.unix_timestamp_millis();
        let session_id = match previous_id {
            Some(id) if id == seed => seed.wrapping_add(1),
            _ => seed,
        };
        let session = ShuffleSession::start(Arc::new(snapshot), seed, session_id);
        debug!(session_id, seed = session.state().seed, "Created shuffle session");
        *slot = Some(session);
        Ok(false)
    }

    async fn load_persisted(&self, snapshot: &SongSnapshot) -> Result<Option<ShuffleSession>> {
        let state = match self.store.load().await {
            Ok(Some(state)) => state,
            Ok(None) => return Ok(None),
            Err(PlaybackError::CorruptState { key, reason }) => {
                warn!(%key, %reason, "Discarding corrupt shuffle state");
                self.store.clear().await?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        if snapshot.is_compatible_with(state.fingerprint.as_deref()) {
            return match ShuffleSession::resume(Arc::new(snapshot.clone()), state) {
                Ok(session) => Ok(Some(session)),
                Err(err) => {
                    warn!(error = %err, "Discarding unusable shuffle state");
                    Ok(None)
                }
            };
        }

        if snapshot.is_degraded() {
            debug!("Degraded snapshot; serving persisted session without writing back");
            return Ok(Some(ShuffleSession::detached(Arc::new(snapshot.clone()), state)));
        }

        info!("Persisted shuffle session no longer matches the song set");
        Ok(None)
    }

    /// Applies `update` to a copy of `session` and installs the copy once it
    /// is persisted; `session` is untouched when the write fails.
    async fn commit<R>(
        &self,
        session: &mut ShuffleSession,
        update: impl FnOnce(&mut ShuffleSession) -> R,
    ) -> Result<R> {
        let mut next = session.clone();
        let output = update(&mut next);
        if next.is_persistent() {
            if let Err(err) = self.store.save(next.state()).await {
                warn!(session_id = session.session_id(), error = %err, "Shuffle state not persisted; keeping previous cursor");
                return Err(err);
            }
        }
        *session = next;
        Ok(output)
    }

    /// Up to `count` songs plus the seeds used by any reseed on the way.
    fn draw(&self, session: &mut ShuffleSession, count: usize) -> (Vec<Song>, Vec<i64>) {
        session.next_batch(count, || self.clock.unix_timestamp_millis())
    }

    fn emit_reseeds(&self, session_id: i64, reseeds: Vec<i64>) {
        for seed in reseeds {
            debug!(session_id, seed, "Shuffle order exhausted; reseeded");
            self.emit(ShuffleEvent::Reseeded { session_id, seed });
        }
    }

    fn emit(&self, event: ShuffleEvent) {
        self.events.emit(CoreEvent::Shuffle(event)).ok();
    }
}
