//! Error types for the suggestion and learning engine.
//!
//! Only [`ValidationError`] and [`StorageError::Unexpected`] ever reach a
//! caller of the engine. Everything else is classified, recorded in the
//! resilience layer and degraded to an empty result.
use std::io;

use smol_str::SmolStr;

/// A word was rejected before touching storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// Word is empty after trimming
    #[error("word is empty")]
    Empty,

    /// Word has more grapheme clusters than allowed
    #[error("word is too long ({0} graphemes)")]
    TooLong(usize),

    /// Word contains no letters or word punctuation
    #[error("word contains no letters")]
    NoLetters,
}

/// Errors that can occur while reading a dictionary asset.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AssetError {
    /// No dictionary exists for the language
    #[error("no dictionary for '{0}'")]
    NotFound(SmolStr),

    /// A line could not be parsed as `word frequency`
    #[error("malformed dictionary for '{language}' at line {line}: {reason}")]
    Malformed {
        /// Language being loaded
        language: SmolStr,
        /// One-based line number
        line: usize,
        /// What was wrong with it
        reason: String,
    },

    /// The asset exists but may not be read
    #[error("permission denied reading dictionary for '{0}'")]
    PermissionDenied(SmolStr),

    /// Any other I/O failure
    #[error("I/O error reading dictionary for '{0}'")]
    Io(SmolStr, #[source] io::Error),

    /// The build was aborted through its cancellation token
    #[error("dictionary build cancelled")]
    Cancelled,
}

impl AssetError {
    /// Maps an I/O error from opening or reading `language`'s asset.
    pub fn from_io(language: &str, error: io::Error) -> AssetError {
        match error.kind() {
            io::ErrorKind::NotFound => AssetError::NotFound(language.into()),
            io::ErrorKind::PermissionDenied => AssetError::PermissionDenied(language.into()),
            _ => AssetError::Io(language.into(), error),
        }
    }
}

/// Errors reported by a [`VocabularyStorage`](crate::learned::VocabularyStorage) backend.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Stored data is unreadable
    #[error("vocabulary storage is corrupted: {0}")]
    Corrupted(String),

    /// No space left for new entries
    #[error("vocabulary storage is full")]
    Full,

    /// Storage is held by another writer
    #[error("vocabulary storage is locked")]
    Locked,

    /// Generic I/O failure
    #[error("vocabulary storage I/O error")]
    Io(#[source] io::Error),

    /// Anything the engine does not know how to recover from
    #[error("unexpected storage failure: {0}")]
    Unexpected(String),
}

/// Classes of storage failure the resilience layer knows how to absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageFailure {
    Corruption,
    CapacityExhausted,
    TransientLock,
    Generic,
}

impl StorageError {
    /// Classifies the error, or `None` if it must propagate.
    pub fn classify(&self) -> Option<StorageFailure> {
        match self {
            StorageError::Corrupted(_) => Some(StorageFailure::Corruption),
            StorageError::Full => Some(StorageFailure::CapacityExhausted),
            StorageError::Locked => Some(StorageFailure::TransientLock),
            StorageError::Io(_) => Some(StorageFailure::Generic),
            StorageError::Unexpected(_) => None,
        }
    }

    /// Maps an I/O error from a file-backed store.
    pub fn from_io(error: io::Error) -> StorageError {
        if error.raw_os_error() == Some(libc::ENOSPC) {
            return StorageError::Full;
        }

        match error.kind() {
            io::ErrorKind::WouldBlock => StorageError::Locked,
            io::ErrorKind::InvalidData => StorageError::Corrupted(error.to_string()),
            _ => StorageError::Io(error),
        }
    }
}

/// Errors surfaced by the engine's public operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The input word was rejected
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A dictionary asset failed with no fallback available
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Storage failed in a way that could not be classified
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The request was superseded or the build aborted
    #[error("operation cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted
    #[error("worker task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(e: tokio::task::JoinError) -> Self {
        EngineError::Task(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_classification() {
        assert_eq!(
            StorageError::Corrupted("x".into()).classify(),
            Some(StorageFailure::Corruption)
        );
        assert_eq!(StorageError::Full.classify(), Some(StorageFailure::CapacityExhausted));
        assert_eq!(StorageError::Locked.classify(), Some(StorageFailure::TransientLock));
        assert_eq!(StorageError::Unexpected("x".into()).classify(), None);
    }

    #[test]
    fn io_mapping() {
        let full = io::Error::from_raw_os_error(libc::ENOSPC);
        assert!(matches!(StorageError::from_io(full), StorageError::Full));

        let locked = io::Error::new(io::ErrorKind::WouldBlock, "busy");
        assert!(matches!(StorageError::from_io(locked), StorageError::Locked));

        let other = io::Error::new(io::ErrorKind::Other, "boom");
        assert!(matches!(StorageError::from_io(other), StorageError::Io(_)));

        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            AssetError::from_io("en", missing),
            AssetError::NotFound(ref l) if l == "en"
        ));
    }
}
