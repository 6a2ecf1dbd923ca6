//! Error types for sitesync operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during a synchronization run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The source root directory does not exist.
    #[error("source directory does not exist: {0}")]
    SourceMissing(PathBuf),

    /// Source and destination roots contain each other.
    #[error("source and destination cannot be sub-directories of each other: {source_root} and {dest_root}")]
    OverlappingRoots {
        /// Source root as given by the caller.
        source_root: PathBuf,
        /// Effective destination root (including any target sub-folder).
        dest_root: PathBuf,
    },

    /// An ignore pattern failed to compile as a glob.
    #[error("invalid ignore pattern '{pattern}': {source}")]
    InvalidIgnorePattern {
        /// The offending pattern text.
        pattern: String,
        /// Underlying glob compilation error.
        source: globset::Error,
    },

    /// I/O error that survived the retry budget.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A spawned copy task panicked or was cancelled by the runtime.
    #[error("copy task failed: {0}")]
    CopyTask(#[from] tokio::task::JoinError),
}

/// Result type for sitesync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
