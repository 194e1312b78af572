use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Transport-level failure while fetching image bytes.
///
/// The pipeline does not retry these; a later request for the same key
/// dispatches a fresh fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("malformed image url {url}: {reason}")]
    MalformedUrl { url: String, reason: String },

    #[error("unexpected status {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("transport failure fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

/// The fetched bytes could not be turned into a usable image.
#[derive(Debug, Error)]
#[error("image decode failed: {reason}")]
pub struct DecodeError {
    pub reason: String,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<::image::ImageError> for DecodeError {
    fn from(err: ::image::ImageError) -> Self {
        Self {
            reason: err.to_string(),
        }
    }
}

/// The image could not be serialized into the persistent on-disk format.
#[derive(Debug, Error)]
#[error("image encode failed: {reason}")]
pub struct EncodeError {
    pub reason: String,
}

impl From<::image::ImageError> for EncodeError {
    fn from(err: ::image::ImageError) -> Self {
        Self {
            reason: err.to_string(),
        }
    }
}

/// Persistent-store write failure.
///
/// The memory layer is unaffected by these; callers decide whether to
/// log-and-continue or give up.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to create cache root {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode image for {key}: {reason}")]
    Encode { key: String, reason: String },

    #[error("failed to write cache entry {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
