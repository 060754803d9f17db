//! Error types for kit reorganization.
//!
//! All fallible functions in this crate return [`Result<T>`], which uses [`Error`]
//! as the error type. Only a failure to obtain the document itself is meant to reach the
//! caller of [`import_kit`](crate::import_kit); per-asset failures are recorded in the
//! [`ReorganizeSummary`](crate::ReorganizeSummary) instead.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reorganizing a kit.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem I/O failed (reading cache blobs, writing output files, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or serialize JSON (metadata, side index).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The packed payload could not be decompressed into a document.
    #[error("Decode error: {0}")]
    Decode(#[from] neka_vocab::DecodeError),

    /// A blob could not be fetched.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Image bytes could not be decoded or encoded.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The decompressed document is not a kit (no `data` object, etc.).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// A path that must exist was not found.
    #[error("Not found: {0}")]
    NotFound(Utf8PathBuf),

    /// Catch-all.
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

/// Errors raised while fetching a remote blob.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The host answered with a non-success status.
    #[error("unexpected status {status} for blob {blob}")]
    Status { blob: String, status: u16 },

    /// The blob id cannot be used as a cache file name.
    #[error("invalid blob id {0:?}")]
    InvalidBlobId(String),

    /// Every attempt failed; `last` is the final attempt's error.
    #[error("giving up on blob {blob} after {attempts} attempts: {last}")]
    Exhausted {
        blob: String,
        attempts: u32,
        last: Box<FetchError>,
    },

    /// Writing the fetched bytes into the cache failed.
    #[error("cache write failed for blob {blob}: {source}")]
    CacheWrite {
        blob: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::InvalidBlobId(_)
            | FetchError::Exhausted { .. }
            | FetchError::CacheWrite { .. } => false,
        }
    }
}
