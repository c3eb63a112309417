//! Persisted shuffle session fields.
//!
//! Every field lives under its own key in the host [`SettingsStore`] and is
//! written in one transaction, so a restart never observes half an update.
//! Anything that cannot be read back faithfully is reported as
//! [`PlaybackError::CorruptState`]; the engine discards such state.

use std::collections::VecDeque;
use std::sync::Arc;

use bridge_traits::{BridgeError, SettingsStore};
use tracing::debug;

use crate::error::{PlaybackError, Result};

pub const KEY_ACTIVE: &str = "playback.shuffle.active";
pub const KEY_SEED: &str = "playback.shuffle.seed";
pub const KEY_CURSOR: &str = "playback.shuffle.cursor";
pub const KEY_CONSUMED: &str = "playback.shuffle.consumed_since_refill";
pub const KEY_SESSION_ID: &str = "playback.shuffle.session_id";
pub const KEY_HISTORY: &str = "playback.shuffle.recent_history";
pub const KEY_FINGERPRINT: &str = "playback.shuffle.snapshot_fingerprint";

/// Mutable fields of one shuffle session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuffleState {
    pub seed: i64,
    pub cursor: usize,
    pub consumed_since_refill: usize,
    pub session_id: i64,
    /// Most recent first
    pub recent_history: VecDeque<String>,
    pub active: bool,
    pub fingerprint: Option<String>,
}

impl ShuffleState {
    pub fn new(seed: i64, session_id: i64) -> Self {
        Self {
            seed,
            cursor: 0,
            consumed_since_refill: 0,
            session_id,
            recent_history: VecDeque::new(),
            active: true,
            fingerprint: None,
        }
    }

    /// Moves `id` to the front of the history, evicting past `limit`.
    pub fn record_played(&mut self, id: &str, limit: usize) {
        if id.trim().is_empty() {
            return;
        }
        self.recent_history.retain(|existing| existing != id);
        self.recent_history.push_front(id.to_string());
        self.recent_history.truncate(limit);
    }
}

#[derive(Clone)]
pub struct ShuffleStateStore {
    store: Arc<dyn SettingsStore>,
}

impl ShuffleStateStore {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// The persisted session, or `None` when no session is active.
    pub async fn load(&self) -> Result<Option<ShuffleState>> {
        if !self.store.get_bool(KEY_ACTIVE).await.map_err(typed)?.unwrap_or(false) {
            return Ok(None);
        }

        let seed = match self.store.get_i64(KEY_SEED).await.map_err(typed)? {
            Some(seed) if seed != 0 => seed,
            _ => return Err(PlaybackError::corrupt(KEY_SEED, "active session without a seed")),
        };
        let cursor = self.count(KEY_CURSOR).await?;
        let consumed_since_refill = self.count(KEY_CONSUMED).await?;
        let session_id = self
            .store
            .get_i64(KEY_SESSION_ID)
            .await
            .map_err(typed)?
            .filter(|id| *id != 0)
            .unwrap_or(seed);

        let recent_history = match self.store.get_string(KEY_HISTORY).await.map_err(typed)? {
            Some(raw) => serde_json::from_str::<VecDeque<String>>(&raw)
                .map_err(|err| PlaybackError::corrupt(KEY_HISTORY, err.to_string()))?,
            None => VecDeque::new(),
        };
        let fingerprint = self.store.get_string(KEY_FINGERPRINT).await.map_err(typed)?;

        Ok(Some(ShuffleState {
            seed,
            cursor,
            consumed_since_refill,
            session_id,
            recent_history,
            active: true,
            fingerprint,
        }))
    }

    pub async fn save(&self, state: &ShuffleState) -> Result<()> {
        let history = serde_json::to_string(&state.recent_history)
            .map_err(|err| PlaybackError::corrupt(KEY_HISTORY, err.to_string()))?;

        let mut tx = self.store.begin_transaction().await?;
        tx.set_bool(KEY_ACTIVE, state.active).await?;
        tx.set_i64(KEY_SEED, state.seed).await?;
        tx.set_i64(KEY_CURSOR, state.cursor as i64).await?;
        tx.set_i64(KEY_CONSUMED, state.consumed_since_refill as i64).await?;
        tx.set_i64(KEY_SESSION_ID, state.session_id).await?;
        tx.set_string(KEY_HISTORY, &history).await?;
        match &state.fingerprint {
            Some(fingerprint) => tx.set_string(KEY_FINGERPRINT, fingerprint).await?,
            None => tx.delete(KEY_FINGERPRINT).await?,
        }
        tx.commit().await?;

        debug!(
            session_id = state.session_id,
            cursor = state.cursor,
            consumed = state.consumed_since_refill,
            "Persisted shuffle state"
        );
        Ok(())
    }

    /// Marks the session inactive and drops every other field.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.store.begin_transaction().await?;
        tx.set_bool(KEY_ACTIVE, false).await?;
        for key in [KEY_SEED, KEY_CURSOR, KEY_CONSUMED, KEY_SESSION_ID, KEY_HISTORY, KEY_FINGERPRINT] {
            tx.delete(key).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn count(&self, key: &str) -> Result<usize> {
        match self.store.get_i64(key).await.map_err(typed)? {
            None => Ok(0),
            Some(value) => usize::try_from(value)
                .map_err(|_| PlaybackError::corrupt(key, format!("negative value {value}"))),
        }
    }
}

/// A value of the wrong type is corruption, not a storage outage.
fn typed(err: BridgeError) -> PlaybackError {
    match err {
        BridgeError::TypeMismatch { key, expected, actual } => PlaybackError::CorruptState {
            key,
            reason: format!("expected {expected}, found {actual}"),
        },
        other => PlaybackError::Storage(other),
    }
}
