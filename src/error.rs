//! Error types for archive patching

use std::path::PathBuf;

use thiserror::Error;
use zip::result::ZipError;

/// Errors returned by the archive patcher.
///
/// Every variant carries the archive path, and the entry name where one is
/// involved. Nothing is retried internally.
#[derive(Error, Debug)]
pub enum PatchError {
    /// The archive is missing, unreadable or not a valid ZIP container
    #[error("failed to open archive '{}': {source}", path.display())]
    ArchiveOpen {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    /// No entry matched the requested name or suffix
    #[error("entry '{name}' not found in archive '{}'", path.display())]
    EntryNotFound { path: PathBuf, name: String },

    /// An entry could not be decompressed or copied
    #[error("failed to read entry '{name}' in archive '{}': {source}", path.display())]
    EntryRead {
        path: PathBuf,
        name: String,
        #[source]
        source: ZipError,
    },

    /// New content for an entry could not be written into the rebuilt archive
    #[error("failed to write entry '{name}' for archive '{}': {source}", path.display())]
    EntryWrite {
        path: PathBuf,
        name: String,
        #[source]
        source: ZipError,
    },

    /// The rebuilt archive could not be finalized or written to disk
    #[error("failed to write archive '{}': {source}", path.display())]
    ArchiveWrite {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
}

impl PatchError {
    /// True when the error means the requested entry does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, PatchError::EntryNotFound { .. })
    }
}

/// Convenience alias used across the patcher modules
pub type Result<T, E = PatchError> = std::result::Result<T, E>;
