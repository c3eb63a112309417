use std::time::Duration;

use core_async::PoolError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FederationError {
    #[error("Aggregation is shut down")]
    ShutDown,

    #[error("Aggregation cancelled")]
    Cancelled,

    #[error("Source {instance} failed: {message}")]
    SourceFailed { instance: String, message: String },

    #[error("Source {instance} timed out after {after:?}")]
    Timeout { instance: String, after: Duration },
}

impl FederationError {
    pub fn source_failed(instance: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceFailed {
            instance: instance.into(),
            message: message.into(),
        }
    }

    /// Whether another attempt against the same backend can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SourceFailed { .. } | Self::Timeout { .. })
    }
}

impl From<PoolError> for FederationError {
    fn from(_: PoolError) -> Self {
        Self::ShutDown
    }
}

pub type Result<T> = std::result::Result<T, FederationError>;
