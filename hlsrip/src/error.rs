//! Error types for every phase of a download run.

use reqwest::StatusCode;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Errors raised while reading or parsing a playlist.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("could not read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("couldn't parse input as hls playlist")]
    Parse,

    #[error("input is a master playlist, pass one of its variant playlists instead")]
    MasterPlaylist,

    #[error("playlist contains no segments")]
    NoSegments,

    #[error("playlist contains no decryption keys")]
    NoKeys,

    #[error("{0} encryption is not supported, only AES-128 streams can be decrypted")]
    UnsupportedMethod(String),

    #[error("segment {index} uses {tag}, which is not supported")]
    UnsupportedTag { index: usize, tag: &'static str },

    #[error(
        "segment {index} is marked clear (METHOD=NONE), partly encrypted playlists are not supported"
    )]
    MixedEncryption { index: usize },

    #[error("AES-128 key tag has no URI attribute")]
    MissingKeyUri,

    #[error("couldn't resolve uri {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },
}

/// Errors raised by a [`Transport`](crate::Transport) implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timeout")]
    Timeout,

    #[error("connection error: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether a new attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connect(_))
    }
}

/// Errors raised while fetching the decryption key.
#[derive(Debug, Error)]
pub enum KeyFetchError {
    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("{url} returned an empty body")]
    Empty { url: String },

    #[error("invalid key size: expected 16 bytes for AES-128, got {0} bytes")]
    InvalidLength(usize),

    #[error("malformed data uri")]
    DataUri,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Last failure seen for a segment request.
#[derive(Debug, Error)]
pub enum FetchCause {
    #[error("HTTP {0}")]
    Status(StatusCode),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl FetchCause {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status(status) => status.is_server_error(),
            Self::Transport(error) => error.is_transient(),
        }
    }
}

/// Errors raised while writing or sealing the output file.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("segment {got} written before segment {expected}")]
    OutOfOrder { expected: usize, got: usize },

    #[error("only {written} of {expected} segments were written")]
    Incomplete { written: usize, expected: usize },
}

/// The error type returned by a download run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("key: {0}")]
    KeyFetch(#[from] KeyFetchError),

    #[error("segment {index}: download failed after {attempts} attempt(s) ({cause})")]
    SegmentFetch {
        index: usize,
        attempts: u16,
        cause: FetchCause,
    },

    #[error(
        "segment {index}: {len} bytes is not a multiple of the AES block size, wrong key or not an AES-128 stream"
    )]
    Decrypt { index: usize, len: usize },

    #[error("assembly: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("couldn't start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("download cancelled")]
    Cancelled,

    #[error("workers stopped after {received} of {expected} segments")]
    Incomplete { received: usize, expected: usize },
}

impl Error {
    /// Index of the segment this error belongs to, if any.
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            Self::SegmentFetch { index, .. } | Self::Decrypt { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Result type for download runs.
pub type Result<T> = std::result::Result<T, Error>;
