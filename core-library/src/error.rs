use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("Invalid tagged id '{value}': {reason}")]
    InvalidTaggedId { value: String, reason: String },

    #[error("Unknown source kind: {0}")]
    UnknownSourceKind(String),

    #[error("Invalid source preference order '{value}': {reason}")]
    InvalidPreferenceOrder { value: String, reason: String },

    /// Reported by host-backed [`SearchIndex`](crate::SearchIndex) implementations.
    #[error("Search index error: {0}")]
    Index(String),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
