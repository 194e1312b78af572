//! Cache layers with a uniform get/put surface, and the selector that
//! chooses which one serves requests.

pub mod file;
pub mod memory;
pub mod tiered;

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::codec::ImageCodec;
use crate::error::WriteError;
use crate::image::{DecodedImage, ImageKey};

pub use file::ImageFileStore;
pub use memory::{MemoryImageStore, MemoryStoreStats};
pub use tiered::TieredImageStore;

/// One cache layer (memory, file) or a composition of them.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Look up a cached image. Absence is not an error.
    async fn get(&self, key: &ImageKey) -> Option<Arc<DecodedImage>>;

    /// Insert or replace a cached image.
    ///
    /// The memory layer absorbs every input and never fails; persistent
    /// layers report write failures so the caller can decide what to do
    /// with them.
    async fn put(&self, key: &ImageKey, image: Arc<DecodedImage>) -> Result<(), WriteError>;
}

/// Which cache layer serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// In-memory only.
    #[default]
    Memory,
    /// Persistent files only.
    File,
    /// Memory over files, read-through with promotion.
    Tiered,
}

/// Chooses the active cache layer.
///
/// Re-selection applies to subsequent requests only; fetches already
/// dispatched keep writing to the layer that was active when they started.
pub struct CacheSelector {
    memory: Arc<MemoryImageStore>,
    file: Arc<ImageFileStore>,
    tiered: Arc<TieredImageStore>,
    mode: RwLock<CacheMode>,
}

impl CacheSelector {
    /// The tiered composition shares these same two instances, so entries
    /// promoted through it are visible via [`CacheSelector::memory`].
    pub fn new(memory: Arc<MemoryImageStore>, file: Arc<ImageFileStore>) -> Self {
        let tiered = Arc::new(TieredImageStore::new(memory.clone(), file.clone()));
        Self {
            memory,
            file,
            tiered,
            mode: RwLock::new(CacheMode::default()),
        }
    }

    /// Memory store at its default budget, file store under `root`.
    pub fn with_root(root: PathBuf, codec: Arc<dyn ImageCodec>) -> Self {
        let memory = Arc::new(MemoryImageStore::with_default_capacity());
        let file = Arc::new(ImageFileStore::new(root, codec));
        Self::new(memory, file)
    }

    pub fn mode(&self) -> CacheMode {
        *self.mode.read().unwrap()
    }

    pub fn set_mode(&self, mode: CacheMode) {
        *self.mode.write().unwrap() = mode;
    }

    /// The layer serving requests right now.
    pub fn active(&self) -> Arc<dyn ImageStore> {
        match self.mode() {
            CacheMode::Memory => self.memory.clone(),
            CacheMode::File => self.file.clone(),
            CacheMode::Tiered => self.tiered.clone(),
        }
    }

    pub fn memory(&self) -> &Arc<MemoryImageStore> {
        &self.memory
    }

    pub fn file(&self) -> &Arc<ImageFileStore> {
        &self.file
    }
}

impl fmt::Debug for CacheSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSelector")
            .field("mode", &self.mode())
            .field("memory", &self.memory.stats())
            .field("file_root", &self.file.root())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PngCodec;
    use crate::image::DecodedImage;

    fn selector(root: &std::path::Path) -> CacheSelector {
        let memory = Arc::new(MemoryImageStore::new(1024));
        let file = Arc::new(ImageFileStore::new(root.to_path_buf(), Arc::new(PngCodec)));
        CacheSelector::new(memory, file)
    }

    fn pixel() -> Arc<DecodedImage> {
        Arc::new(DecodedImage::from_rgba8(1, 1, vec![9, 9, 9, 255]).unwrap())
    }

    #[tokio::test]
    async fn default_mode_serves_from_memory() {
        let dir = tempfile::tempdir().unwrap();
        let selector = selector(dir.path());
        let key = ImageKey::new("k");

        assert_eq!(selector.mode(), CacheMode::Memory);
        selector.memory().put(&key, pixel());
        assert!(selector.active().get(&key).await.is_some());
    }

    #[tokio::test]
    async fn switching_mode_switches_the_probed_layer() {
        let dir = tempfile::tempdir().unwrap();
        let selector = selector(dir.path());
        let key = ImageKey::new("k");

        selector.memory().put(&key, pixel());
        selector.set_mode(CacheMode::File);
        assert!(selector.active().get(&key).await.is_none());

        selector.set_mode(CacheMode::Tiered);
        assert!(selector.active().get(&key).await.is_some());
    }
}
