//! File-backed image entries keyed by a sha256-derived, filesystem-safe name.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use super::ImageStore;
use crate::codec::ImageCodec;
use crate::error::WriteError;
use crate::image::{DecodedImage, ImageKey};

/// One encoded file per key under `root`; the directory listing plus the
/// key-to-path derivation is the only durable metadata.
///
/// Entries are never evicted here. Growth is bounded only by whoever clears
/// the directory; that is a known limitation, not something this store
/// papers over.
pub struct ImageFileStore {
    root: PathBuf,
    codec: Arc<dyn ImageCodec>,
}

impl ImageFileStore {
    pub fn new(root: PathBuf, codec: Arc<dyn ImageCodec>) -> Self {
        Self { root, codec }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys may contain path separators or other unsafe characters; hashing
    /// keeps the mapping injective and the file name safe.
    fn path_for(&self, key: &ImageKey) -> PathBuf {
        let digest = Sha256::digest(key.as_str().as_bytes());
        self.root.join(format!("{}.png", hex::encode(digest)))
    }

    async fn ensure_root(&self) -> Result<(), WriteError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| WriteError::CreateDir {
                path: self.root.clone(),
                source,
            })
    }

    /// An entry that is missing or no longer decodes reads as absent.
    pub async fn get(&self, key: &ImageKey) -> Option<Arc<DecodedImage>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(_) => return None,
        };

        match self.codec.decode(&bytes) {
            Ok(image) => Some(Arc::new(image)),
            Err(err) => {
                warn!(key = %key, ?path, "discarding unreadable cache entry: {err}");
                None
            }
        }
    }

    /// Write the encoded image to a temp file and rename it into place, so
    /// a concurrent `get` only ever observes complete files. A crash
    /// mid-write can leave a stray temp file behind; it is never served.
    pub async fn put(&self, key: &ImageKey, image: &DecodedImage) -> Result<(), WriteError> {
        self.ensure_root().await?;

        let bytes = self
            .codec
            .encode(image)
            .map_err(|err| WriteError::Encode {
                key: key.to_string(),
                reason: err.to_string(),
            })?;

        let path = self.path_for(key);
        let tmp = self.root.join(format!(".tmp-{}", Uuid::new_v4().simple()));

        if let Err(source) = write_all_to(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(WriteError::Io { path: tmp, source });
        }

        if let Err(source) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(WriteError::Io { path, source });
        }

        Ok(())
    }

    pub async fn contains(&self, key: &ImageKey) -> bool {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .unwrap_or(false)
    }

    pub async fn remove(&self, key: &ImageKey) {
        let _ = tokio::fs::remove_file(self.path_for(key)).await;
    }

    pub async fn clear(&self) {
        let _ = tokio::fs::remove_dir_all(&self.root).await;
    }
}

async fn write_all_to(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

impl fmt::Debug for ImageFileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFileStore")
            .field("root", &self.root)
            .finish()
    }
}

#[async_trait]
impl ImageStore for ImageFileStore {
    async fn get(&self, key: &ImageKey) -> Option<Arc<DecodedImage>> {
        ImageFileStore::get(self, key).await
    }

    async fn put(&self, key: &ImageKey, image: Arc<DecodedImage>) -> Result<(), WriteError> {
        ImageFileStore::put(self, key, &image).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PngCodec;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ImageFileStore {
        ImageFileStore::new(dir.path().join("images"), Arc::new(PngCodec))
    }

    fn image(byte: u8) -> DecodedImage {
        DecodedImage::from_rgba8(1, 1, vec![byte, byte, byte, 255]).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let key = ImageKey::new("https://example.com/a.png");

        store.put(&key, &image(3)).await.unwrap();
        let got = store.get(&key).await.unwrap();
        assert_eq!(*got, image(3));
    }

    #[tokio::test]
    async fn missing_key_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.get(&ImageKey::new("nothing")).await.is_none());
    }

    #[tokio::test]
    async fn corrupt_entry_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let key = ImageKey::new("k");

        store.put(&key, &image(1)).await.unwrap();
        tokio::fs::write(store.path_for(&key), b"not a png")
            .await
            .unwrap();

        assert!(store.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn keys_with_path_separators_are_safe_and_distinct() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let tricky = ImageKey::new("https://example.com/a/b?x=../../etc");
        let sibling = ImageKey::new("https://example.com/a/b?x=..%2F..%2Fetc");

        store.put(&tricky, &image(1)).await.unwrap();
        store.put(&sibling, &image(2)).await.unwrap();

        assert_eq!(*store.get(&tricky).await.unwrap(), image(1));
        assert_eq!(*store.get(&sibling).await.unwrap(), image(2));
        assert!(store.path_for(&tricky).parent().unwrap().ends_with("images"));
    }

    #[tokio::test]
    async fn put_overwrites_the_previous_entry() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let key = ImageKey::new("k");

        store.put(&key, &image(1)).await.unwrap();
        store.put(&key, &image(2)).await.unwrap();

        assert_eq!(*store.get(&key).await.unwrap(), image(2));
    }

    #[tokio::test]
    async fn unwritable_root_reports_the_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, b"a file, not a directory")
            .await
            .unwrap();

        let store = ImageFileStore::new(blocker.join("images"), Arc::new(PngCodec));
        let err = store.put(&ImageKey::new("k"), &image(1)).await.unwrap_err();
        assert!(matches!(err, WriteError::CreateDir { .. }));
    }

    #[tokio::test]
    async fn remove_and_contains() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let key = ImageKey::new("k");

        store.put(&key, &image(1)).await.unwrap();
        assert!(store.contains(&key).await);

        store.remove(&key).await;
        assert!(!store.contains(&key).await);
    }
}
