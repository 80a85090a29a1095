//! Storage layer error types.
//!
//! All errors that can occur inside the engine are defined here.
//! We use `thiserror` for ergonomic error definition and better messages.
//!
//! The variants are granular (a missing key is not a missing commit), but
//! they collapse onto a small set of disjoint kinds: invalid argument,
//! not found, conflict, io, corrupt, type mismatch, unsupported. The
//! classification helpers at the bottom expose that view.

use thiserror::Error;

/// The main error type for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A caller-supplied argument was rejected before any mutation.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// The requested key is not in the live entry set.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The requested commit is not in the log.
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// The requested tag is not bound.
    #[error("tag not found: {0}")]
    TagNotFound(String),

    /// Merge refused without auto-resolve; the live set equals the target
    /// snapshot.
    #[error("merge conflict on keys: {conflicting_keys:?}")]
    MergeConflict { conflicting_keys: Vec<String> },

    /// I/O error (filesystem level).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The database file is malformed or truncated.
    #[error("corrupt database file at byte {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// The database file carries an unknown value type tag.
    #[error("unknown type tag {tag} at byte {offset}")]
    TypeMismatch { tag: u16, offset: u64 },

    /// The database file was written by a newer format version.
    #[error("unsupported format version {0}")]
    Unsupported(u32),
}

impl StorageError {
    /// Check if this error indicates the resource doesn't exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::KeyNotFound(_)
                | StorageError::CommitNotFound(_)
                | StorageError::TagNotFound(_)
        )
    }

    /// Check if this error is a merge conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::MergeConflict { .. })
    }

    /// Check if this error means the on-disk file cannot be trusted.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            StorageError::Corrupt { .. } | StorageError::TypeMismatch { .. }
        )
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
