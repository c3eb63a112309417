//! # Playback Error Types

use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaybackError {
    /// The settings store failed to read or write shuffle state.
    #[error("Shuffle state storage error: {0}")]
    Storage(#[from] BridgeError),

    /// Persisted shuffle state exists but cannot be trusted.
    #[error("Corrupt shuffle state in '{key}': {reason}")]
    CorruptState { key: String, reason: String },

    /// No song source could produce a snapshot.
    #[error("Song snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    #[error("Shuffle engine is shut down")]
    ShutDown,
}

impl PlaybackError {
    pub(crate) fn corrupt(key: &str, reason: impl Into<String>) -> Self {
        Self::CorruptState {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
