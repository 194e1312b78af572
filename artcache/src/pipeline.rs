//! Request coordination: cache probe, deduplicated background fetch,
//! write-back and race-safe delivery.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use crate::cache::{CacheSelector, ImageStore};
use crate::codec::{ImageCodec, PngCodec};
use crate::config::PipelineConfig;
use crate::error::DecodeError;
use crate::image::{DecodedImage, ImageKey, ImageSource};
use crate::loader::{HttpImageLoader, ImageLoader};

/// Capability a view slot hands to the pipeline with each request.
///
/// `is_current` is consulted when the fetch settles: a slot retargeted to a
/// different key since it requested must answer `false`, and receives no
/// stale delivery. `deliver` runs on a fetch worker task; implementations
/// hop onto their own UI context as needed, the pipeline does not.
pub trait DeliveryTarget: Send + Sync {
    fn is_current(&self, key: &ImageKey) -> bool;

    fn deliver(&self, key: &ImageKey, image: Arc<DecodedImage>);
}

type Waiters = Vec<Arc<dyn DeliveryTarget>>;
type InFlight = Arc<Mutex<HashMap<ImageKey, Waiters>>>;

/// Coordinates cache lookups with deduplicated background fetches.
///
/// For any key there is at most one outstanding fetch; requesters arriving
/// while it is in flight join its waiter list instead of dispatching a
/// second one. Failed fetches are not negative-cached: the next request for
/// the same key starts fresh.
pub struct ImagePipeline {
    selector: Arc<CacheSelector>,
    loader: Arc<dyn ImageLoader>,
    codec: Arc<dyn ImageCodec>,
    in_flight: InFlight,
    permits: Arc<Semaphore>,
}

impl ImagePipeline {
    pub fn new(
        selector: Arc<CacheSelector>,
        loader: Arc<dyn ImageLoader>,
        codec: Arc<dyn ImageCodec>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            selector,
            loader,
            codec,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(config.fetch_permits())),
        }
    }

    /// HTTP loader, PNG codec, memory store at its default budget and a
    /// file store under `root`, all with default tuning.
    pub fn with_root(root: PathBuf) -> Self {
        let config = PipelineConfig::default();
        let codec: Arc<dyn ImageCodec> = Arc::new(PngCodec);
        let selector = Arc::new(CacheSelector::with_root(root, codec.clone()));
        let loader = Arc::new(HttpImageLoader::with_timeout(config.http_timeout));
        Self::new(selector, loader, codec, config)
    }

    /// Cache layer selection, exposed so callers can re-point the pipeline.
    /// Fetches already in flight keep the layer they started with.
    pub fn selector(&self) -> &Arc<CacheSelector> {
        &self.selector
    }

    /// Number of keys with an outstanding fetch.
    pub async fn pending_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Probe the active cache; on a miss, join or dispatch the background
    /// fetch for this key.
    ///
    /// A hit is returned directly so the caller can show it immediately.
    /// On a miss this returns `None` and the target receives the image via
    /// [`DeliveryTarget::deliver`] once the fetch settles, provided it still
    /// wants the key by then.
    pub async fn request(
        &self,
        source: ImageSource,
        target: Arc<dyn DeliveryTarget>,
    ) -> Option<Arc<DecodedImage>> {
        let key = source.cache_key();
        let store = self.selector.active();

        if let Some(image) = store.get(&key).await {
            return Some(image);
        }

        self.enqueue(key, source, store, Some(target)).await;
        None
    }

    /// Fetch-and-populate without a delivery target.
    ///
    /// A cache hit is a no-op; a miss joins or starts the same deduplicated
    /// fetch a `request` would.
    pub async fn preload(&self, source: ImageSource) {
        let key = source.cache_key();
        let store = self.selector.active();

        if store.get(&key).await.is_some() {
            return;
        }

        self.enqueue(key, source, store, None).await;
    }

    async fn enqueue(
        &self,
        key: ImageKey,
        source: ImageSource,
        store: Arc<dyn ImageStore>,
        target: Option<Arc<dyn DeliveryTarget>>,
    ) {
        // Single critical section for the check-then-register step: two
        // concurrent first requesters must not both dispatch a fetch.
        let mut in_flight = self.in_flight.lock().await;
        if let Some(waiters) = in_flight.get_mut(&key) {
            waiters.extend(target);
            return;
        }
        in_flight.insert(key.clone(), target.into_iter().collect());
        drop(in_flight);

        let worker = FetchWorker {
            loader: self.loader.clone(),
            codec: self.codec.clone(),
            store,
            in_flight: self.in_flight.clone(),
            permits: self.permits.clone(),
        };
        tokio::spawn(worker.run(key, source));
    }
}

impl fmt::Debug for ImagePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self
            .in_flight
            .try_lock()
            .map(|guard| guard.len())
            .unwrap_or(0);

        f.debug_struct("ImagePipeline")
            .field("mode", &self.selector.mode())
            .field("pending_fetches", &pending)
            .field("permits_available", &self.permits.available_permits())
            .finish()
    }
}

/// Everything one dispatched fetch needs, detached from the pipeline's
/// lifetime.
struct FetchWorker {
    loader: Arc<dyn ImageLoader>,
    codec: Arc<dyn ImageCodec>,
    store: Arc<dyn ImageStore>,
    in_flight: InFlight,
    permits: Arc<Semaphore>,
}

impl FetchWorker {
    async fn run(self, key: ImageKey, source: ImageSource) {
        // Queue behind the permit pool; saturation delays, never drops.
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // Pool torn down; settle so waiters are not leaked.
                self.settle_failure(&key).await;
                return;
            }
        };

        let bytes = match self.loader.load(source.url()).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key = %key, "image fetch failed: {err}");
                self.settle_failure(&key).await;
                return;
            }
        };

        let image = match decode_off_thread(self.codec.clone(), bytes).await {
            Ok(image) => Arc::new(image),
            Err(err) => {
                warn!(key = %key, "image decode failed: {err}");
                self.settle_failure(&key).await;
                return;
            }
        };

        // Write-back precedes delivery. A persistent write failure does not
        // block delivery; the in-memory image is already good.
        if let Err(err) = self.store.put(&key, image.clone()).await {
            warn!(key = %key, "cache write-back failed: {err}");
        }

        self.settle_success(&key, image).await;
    }

    async fn settle_success(&self, key: &ImageKey, image: Arc<DecodedImage>) {
        let waiters = self.take_waiters(key).await;
        for target in waiters {
            if target.is_current(key) {
                target.deliver(key, image.clone());
            } else {
                debug!(key = %key, "dropping delivery for a retargeted requester");
            }
        }
    }

    async fn settle_failure(&self, key: &ImageKey) {
        let waiters = self.take_waiters(key).await;
        debug!(key = %key, waiters = waiters.len(), "fetch settled without a result");
    }

    /// Removing the record re-opens the key: a request arriving after this
    /// point starts a fresh fetch.
    async fn take_waiters(&self, key: &ImageKey) -> Waiters {
        self.in_flight.lock().await.remove(key).unwrap_or_default()
    }
}

async fn decode_off_thread(
    codec: Arc<dyn ImageCodec>,
    bytes: Vec<u8>,
) -> Result<DecodedImage, DecodeError> {
    match tokio::task::spawn_blocking(move || codec.decode(&bytes)).await {
        Ok(result) => result,
        Err(err) => Err(DecodeError::new(format!("decode task aborted: {err}"))),
    }
}
