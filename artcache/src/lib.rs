//! Tiered image caching and asynchronous fetching for UI clients.
//!
//! A cached image comes back synchronously from [`ImagePipeline::request`];
//! anything else is fetched in the background, written into the active
//! cache layer, and delivered to every requester that still wants it when
//! the fetch settles.

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod image;
pub mod loader;
pub mod pipeline;

pub use cache::{
    CacheMode, CacheSelector, ImageFileStore, ImageStore, MemoryImageStore, MemoryStoreStats,
    TieredImageStore,
};
pub use codec::{ImageCodec, PngCodec};
pub use config::PipelineConfig;
pub use error::{DecodeError, EncodeError, FetchError, WriteError};
pub use image::{DecodedImage, ImageKey, ImageSource};
pub use loader::{HttpImageLoader, ImageLoader};
pub use pipeline::{DeliveryTarget, ImagePipeline};
