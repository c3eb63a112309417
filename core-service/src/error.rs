use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Aggregation error: {0}")]
    Federation(#[from] core_federation::FederationError),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
