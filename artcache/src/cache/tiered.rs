//! Memory over persistent storage, read-through with promotion.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::ImageStore;
use crate::error::WriteError;
use crate::image::{DecodedImage, ImageKey};

/// Read-through/write-through composition of two layers.
///
/// A memory hit never touches the persistent layer. A persistent hit is
/// promoted into memory before it is returned, so the next lookup for the
/// same key is served from memory alone.
pub struct TieredImageStore {
    memory: Arc<dyn ImageStore>,
    persistent: Arc<dyn ImageStore>,
}

impl TieredImageStore {
    pub fn new(memory: Arc<dyn ImageStore>, persistent: Arc<dyn ImageStore>) -> Self {
        Self { memory, persistent }
    }
}

#[async_trait]
impl ImageStore for TieredImageStore {
    async fn get(&self, key: &ImageKey) -> Option<Arc<DecodedImage>> {
        if let Some(image) = self.memory.get(key).await {
            return Some(image);
        }

        let image = self.persistent.get(key).await?;
        // A failed promotion must not turn the hit into a miss.
        if let Err(err) = self.memory.put(key, image.clone()).await {
            warn!(key = %key, "promotion into memory failed: {err}");
        }
        Some(image)
    }

    /// The two writes are independent: the memory write stands even when
    /// the persistent write fails, and that failure still reaches the
    /// caller instead of being swallowed.
    async fn put(&self, key: &ImageKey, image: Arc<DecodedImage>) -> Result<(), WriteError> {
        let memory_result = self.memory.put(key, image.clone()).await;
        let persistent_result = self.persistent.put(key, image).await;
        memory_result.and(persistent_result)
    }
}

impl std::fmt::Debug for TieredImageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredImageStore").finish_non_exhaustive()
    }
}
