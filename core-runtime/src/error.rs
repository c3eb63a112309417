//! Runtime errors: configuration and missing host capabilities.

use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    /// The default settings store could not be opened.
    #[error("Settings store unavailable: {0}")]
    SettingsStore(#[from] BridgeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
