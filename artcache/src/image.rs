//! Keys, sources and the decoded raster type shared by every cache layer.

use std::fmt;

use crate::error::DecodeError;

/// Stable identifier for a cacheable image.
///
/// The sole lookup handle across every cache layer. A key stays stable for
/// the lifetime of the entry it names; see [`ImageSource`] for how keys are
/// derived.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ImageKey(String);

impl ImageKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ImageKey").field(&self.0).finish()
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an image comes from, plus its cache identity.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Direct URL; the URL doubles as the cache key.
    Url(String),

    /// Caller-derived cache key with a separate fetch URL, for endpoints
    /// whose URLs carry volatile parts (tokens, cache busters) that must
    /// not change the entry's identity.
    Keyed { key: String, url: String },
}

impl ImageSource {
    pub fn cache_key(&self) -> ImageKey {
        match self {
            ImageSource::Url(url) => ImageKey::new(url.clone()),
            ImageSource::Keyed { key, .. } => ImageKey::new(key.clone()),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            ImageSource::Url(url) => url,
            ImageSource::Keyed { url, .. } => url,
        }
    }
}

/// Decoded RGBA8 raster image.
///
/// The pixel buffer length is the entry's cost for memory-budget
/// accounting.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl DecodedImage {
    /// `pixels` must be tightly packed RGBA8, row-major.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, DecodeError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(DecodeError::new(format!(
                "pixel buffer is {} bytes, expected {expected} for {width}x{height} rgba",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Accounting weight used by the memory store's eviction.
    pub fn byte_cost(&self) -> usize {
        self.pixels.len()
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("byte_cost", &self.pixels.len())
            .finish()
    }
}
