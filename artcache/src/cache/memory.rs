//! Bounded in-memory image cache with strict least-recently-used eviction.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use super::ImageStore;
use crate::error::WriteError;
use crate::image::{DecodedImage, ImageKey};

/// Counters taken under the same lock as the entries themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStoreStats {
    pub entry_count: usize,
    pub bytes_used: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct LruState {
    entries: HashMap<ImageKey, Arc<DecodedImage>>,
    /// Front is least recently used.
    recency: VecDeque<ImageKey>,
    bytes_used: usize,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl LruState {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            recency: VecDeque::new(),
            bytes_used: 0,
            capacity,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn touch(&mut self, key: &ImageKey) {
        self.recency.retain(|k| k != key);
        self.recency.push_back(key.clone());
    }

    fn forget(&mut self, key: &ImageKey) -> Option<Arc<DecodedImage>> {
        let removed = self.entries.remove(key)?;
        self.recency.retain(|k| k != key);
        self.bytes_used = self.bytes_used.saturating_sub(removed.byte_cost());
        Some(removed)
    }

    fn evict_lru(&mut self) {
        if let Some(key) = self.recency.pop_front() {
            if let Some(removed) = self.entries.remove(&key) {
                self.bytes_used = self.bytes_used.saturating_sub(removed.byte_cost());
                self.evictions += 1;
            }
        }
    }
}

/// Pure accelerator over the persistent layer: entries vanish on restart.
///
/// One mutex guards the map, the recency order and the cost accounting, so
/// concurrent `get`/`put` cannot interleave partial updates. Both `get` and
/// `put` refresh recency.
pub struct MemoryImageStore {
    state: Mutex<LruState>,
}

impl MemoryImageStore {
    /// Capacity in cost units (bytes of decoded pixels).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState::new(capacity)),
        }
    }

    /// Sizes the store at a quarter of the currently available memory.
    ///
    /// The ratio is applied once, here; the budget is not recomputed as
    /// memory pressure changes later.
    pub fn with_default_capacity() -> Self {
        Self::new(default_capacity())
    }

    pub fn get(&self, key: &ImageKey) -> Option<Arc<DecodedImage>> {
        let mut state = self.state.lock().unwrap();
        match state.entries.get(key).cloned() {
            Some(image) => {
                state.touch(key);
                state.hits += 1;
                Some(image)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Inserts or replaces, then evicts oldest-by-recency entries until the
    /// cumulative cost fits the capacity again.
    ///
    /// An image whose cost alone exceeds the capacity is never stored; the
    /// put is a silent no-op and existing entries stay untouched.
    pub fn put(&self, key: &ImageKey, image: Arc<DecodedImage>) {
        let cost = image.byte_cost();
        let mut state = self.state.lock().unwrap();

        if cost > state.capacity {
            debug!(
                key = %key,
                cost,
                capacity = state.capacity,
                "image exceeds the memory budget, not cached"
            );
            return;
        }

        state.forget(key);
        while state.bytes_used + cost > state.capacity {
            state.evict_lru();
        }
        state.bytes_used += cost;
        state.entries.insert(key.clone(), image);
        state.touch(key);
    }

    pub fn contains(&self, key: &ImageKey) -> bool {
        self.state.lock().unwrap().entries.contains_key(key)
    }

    pub fn remove(&self, key: &ImageKey) -> Option<Arc<DecodedImage>> {
        self.state.lock().unwrap().forget(key)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.recency.clear();
        state.bytes_used = 0;
    }

    pub fn stats(&self) -> MemoryStoreStats {
        let state = self.state.lock().unwrap();
        MemoryStoreStats {
            entry_count: state.entries.len(),
            bytes_used: state.bytes_used,
            capacity: state.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}

impl std::fmt::Debug for MemoryImageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryImageStore")
            .field("stats", &self.stats())
            .finish()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn get(&self, key: &ImageKey) -> Option<Arc<DecodedImage>> {
        MemoryImageStore::get(self, key)
    }

    async fn put(&self, key: &ImageKey, image: Arc<DecodedImage>) -> Result<(), WriteError> {
        MemoryImageStore::put(self, key, image);
        Ok(())
    }
}

fn default_capacity() -> usize {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    let available = sys.available_memory() as usize;
    if available == 0 {
        // Platforms where sysinfo cannot report memory get a flat budget.
        256 * 1024 * 1024
    } else {
        available / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ImageKey {
        ImageKey::new(name)
    }

    /// A `width`x1 RGBA image costs exactly `width * 4` bytes.
    fn image_with_cost(cost: usize) -> Arc<DecodedImage> {
        assert_eq!(cost % 4, 0);
        Arc::new(DecodedImage::from_rgba8((cost / 4) as u32, 1, vec![7u8; cost]).unwrap())
    }

    #[test]
    fn basic_put_get() {
        let store = MemoryImageStore::new(100);
        let image = image_with_cost(4);

        store.put(&key("a"), image.clone());
        assert_eq!(store.get(&key("a")), Some(image));
    }

    #[test]
    fn miss_is_counted_not_errored() {
        let store = MemoryImageStore::new(100);
        assert!(store.get(&key("missing")).is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn exceeding_capacity_evicts_the_least_recently_used() {
        // Capacity 10, three entries of cost 4: inserting C pushes the total
        // to 12, so A (oldest) goes and B + C = 8 remain.
        let store = MemoryImageStore::new(10);
        store.put(&key("a"), image_with_cost(4));
        store.put(&key("b"), image_with_cost(4));
        store.put(&key("c"), image_with_cost(4));

        assert!(store.get(&key("a")).is_none());
        assert!(store.get(&key("b")).is_some());
        assert!(store.get(&key("c")).is_some());
        let stats = store.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.bytes_used, 8);
    }

    #[test]
    fn get_refreshes_recency() {
        let store = MemoryImageStore::new(8);
        store.put(&key("a"), image_with_cost(4));
        store.put(&key("b"), image_with_cost(4));

        assert!(store.get(&key("a")).is_some());
        store.put(&key("c"), image_with_cost(4));

        assert!(store.contains(&key("a")));
        assert!(!store.contains(&key("b")));
        assert!(store.contains(&key("c")));
    }

    #[test]
    fn put_refreshes_recency_of_replaced_entries() {
        let store = MemoryImageStore::new(8);
        store.put(&key("a"), image_with_cost(4));
        store.put(&key("b"), image_with_cost(4));

        store.put(&key("a"), image_with_cost(4));
        store.put(&key("c"), image_with_cost(4));

        assert!(store.contains(&key("a")));
        assert!(!store.contains(&key("b")));
    }

    #[test]
    fn replacing_an_entry_does_not_double_count_cost() {
        let store = MemoryImageStore::new(100);
        store.put(&key("a"), image_with_cost(8));
        store.put(&key("a"), image_with_cost(4));

        let stats = store.stats();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.bytes_used, 4);
    }

    #[test]
    fn oversized_image_is_a_silent_no_op() {
        let store = MemoryImageStore::new(10);
        store.put(&key("a"), image_with_cost(4));
        store.put(&key("big"), image_with_cost(12));

        assert!(!store.contains(&key("big")));
        // The existing entry is untouched.
        assert!(store.contains(&key("a")));
        assert_eq!(store.stats().evictions, 0);
    }

    #[test]
    fn remove_and_clear_release_cost() {
        let store = MemoryImageStore::new(100);
        store.put(&key("a"), image_with_cost(4));
        store.put(&key("b"), image_with_cost(4));

        assert!(store.remove(&key("a")).is_some());
        assert_eq!(store.stats().bytes_used, 4);

        store.clear();
        let stats = store.stats();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.bytes_used, 0);
    }

    #[test]
    fn default_capacity_is_nonzero() {
        assert!(default_capacity() > 0);
    }
}
