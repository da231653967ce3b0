//! Error types for model acquisition.
//!
//! Each stage has its own error so callers can tell a broken download from a
//! broken archive without string matching. [`AcquireError`] wraps the fatal
//! ones with the role that failed. [`PatchError`] is never fatal: the pipeline
//! logs it and still hands out the extracted directory.

use std::path::PathBuf;
use thiserror::Error;

/// A remote archive could not be brought into the local cache.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The asset location is not a parseable URL.
    #[error("Invalid asset URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// No transport knows how to reach this URL scheme.
    #[error("Unsupported URL scheme '{scheme}' for '{url}'")]
    UnsupportedScheme { url: String, scheme: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    /// Connecting or reading the response body failed.
    #[error("Download of {url} failed: {reason}")]
    Transfer { url: String, reason: String },

    /// Writing the archive (or its marker) to disk failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The downloaded bytes do not hash to the configured digest.
    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    /// The transfer finished but produced zero bytes.
    #[error("Download of {url} produced an empty file")]
    Empty { url: String },
}

/// An archive could not be unpacked into its model directory.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Filesystem failure while staging or writing members.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tar stream (or its gzip wrapper) is corrupt.
    #[error("Malformed archive '{path}': {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// The archive contains no members at all.
    #[error("Archive '{path}' has no members")]
    Empty { path: PathBuf },

    /// A member would be written outside the destination directory.
    #[error("Archive '{archive}' contains unsafe member path '{member}'")]
    UnsafePath { archive: PathBuf, member: String },
}

/// A model config file could not be read, parsed or rewritten.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Failed to read model config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model config '{path}' is not valid YAML: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to write model config '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Fatal acquisition failure for one role.
///
/// Roles acquired before the failing one stay on disk and are reused by the
/// next run.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The downloader itself could not be initialised.
    #[error("Failed to initialise model downloads: {0}")]
    Setup(#[source] FetchError),

    /// The same role appears twice in one request.
    #[error("Model role '{0}' is listed more than once")]
    DuplicateRole(String),

    /// The URL has no final path segment to name the cached archive after.
    #[error("Model role '{role}': cannot derive an archive name from '{url}'")]
    UnnamedAsset { role: String, url: String },

    #[error("Model role '{role}': {source}")]
    Fetch {
        role: String,
        #[source]
        source: FetchError,
    },

    #[error("Model role '{role}': {source}")]
    Extract {
        role: String,
        #[source]
        source: ExtractError,
    },
}
