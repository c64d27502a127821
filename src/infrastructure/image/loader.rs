//! Image loading facade.
//!
//! Implements a three-tier lookup: Memory -> Disk -> Network. Memory hits
//! resolve synchronously, everything else runs as a [`FetchTask`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::entities::{CacheKey, DecodedImage, FetchResult, Filter, ResultReason};
use crate::domain::errors::CacheResult;
use crate::domain::ports::{ImageCachePort, TransportPort, TransportRequest};
use crate::infrastructure::config::LoaderConfig;

use super::disk_cache::{DiskImageCache, SweepReport};
use super::fetch_task::{FetchTask, TaskContext, TaskHandle, TaskOptions};
use super::memory_cache::{CacheStats, MemoryImageCache};
use super::scheduler::{DeliveryContext, TaskScheduler};

/// What to load and how.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    url: String,
    headers: Vec<(String, String)>,
    filter: Option<Filter>,
    no_cache: bool,
}

impl ImageRequest {
    /// Creates a plain GET request for `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            filter: None,
            no_cache: false,
        }
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Applies a filter to the decoded image.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Bypasses both cache tiers for this request.
    #[must_use]
    pub const fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    /// Requested URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Memory cache key for this request.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        let filter_id = self.filter.as_ref().map_or("", Filter::identifier);
        CacheKey::derive(&self.url, filter_id)
    }

    fn transport_request(&self) -> TransportRequest {
        self.headers
            .iter()
            .fold(TransportRequest::get(&self.url), |request, (name, value)| {
                request.header(name, value)
            })
    }
}

/// Outcome of [`ImageLoader::request`].
#[derive(Debug)]
pub enum Fetch {
    /// Resolved without starting a task.
    Ready(FetchResult),
    /// A task is running.
    Pending(PendingFetch),
}

impl Fetch {
    /// Waits for the result. `None` if the task was cancelled.
    pub async fn wait(self) -> Option<FetchResult> {
        match self {
            Self::Ready(result) => Some(result),
            Self::Pending(pending) => pending.wait().await,
        }
    }

    /// Handle to the running task, if any.
    #[must_use]
    pub fn handle(&self) -> Option<TaskHandle> {
        match self {
            Self::Ready(_) => None,
            Self::Pending(pending) => Some(pending.handle()),
        }
    }

    /// Returns true if the result was available immediately.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// A request served by a running task.
pub struct PendingFetch {
    rx: oneshot::Receiver<FetchResult>,
    handle: TaskHandle,
}

impl PendingFetch {
    /// Waits for the result. `None` if the task was cancelled.
    pub async fn wait(self) -> Option<FetchResult> {
        self.rx.await.ok()
    }

    /// Blocks the current thread until the result arrives.
    ///
    /// # Panics
    /// Panics if called from within an async execution context.
    #[must_use]
    pub fn wait_blocking(self) -> Option<FetchResult> {
        self.rx.blocking_recv().ok()
    }

    /// Non-owning handle to the task.
    #[must_use]
    pub fn handle(&self) -> TaskHandle {
        self.handle.clone()
    }
}

impl std::fmt::Debug for PendingFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingFetch")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Host signals the loader reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The host moved to the background. Triggers a cache sweep.
    EnteredBackground,
    /// The host is short on memory. Drops every in-memory image.
    MemoryPressure,
}

/// Resolves image requests against memory, disk and network.
pub struct ImageLoader {
    config: LoaderConfig,
    memory_cache: Arc<MemoryImageCache>,
    disk_cache: Arc<DiskImageCache>,
    scheduler: Arc<TaskScheduler>,
    transport: Arc<dyn TransportPort>,
    runtime: Handle,
    dummy_image: RwLock<Option<Arc<DecodedImage>>>,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("config", &self.config)
            .field("cache_dir", &self.disk_cache.cache_dir())
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Creates a loader on the current runtime.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be created.
    pub async fn new(config: LoaderConfig, transport: Arc<dyn TransportPort>) -> CacheResult<Self> {
        let disk_cache = DiskImageCache::new(config.effective_cache_dir()).await?;
        Ok(Self::with_disk_cache(
            config,
            transport,
            Arc::new(disk_cache),
            Handle::current(),
        ))
    }

    /// Creates a loader from existing parts. Tasks are spawned on `runtime`.
    #[must_use]
    pub fn with_disk_cache(
        config: LoaderConfig,
        transport: Arc<dyn TransportPort>,
        disk_cache: Arc<DiskImageCache>,
        runtime: Handle,
    ) -> Self {
        let memory_cache = Arc::new(MemoryImageCache::new(
            config.memory_count_limit,
            config.memory_cost_limit,
        ));
        let scheduler = Arc::new(TaskScheduler::new(
            runtime.clone(),
            config.decode_concurrency,
        ));

        debug!(
            cache_dir = %disk_cache.cache_dir().display(),
            concurrency = scheduler.concurrency(),
            "Image loader created"
        );

        Self {
            config,
            memory_cache,
            disk_cache,
            scheduler,
            transport,
            runtime,
            dummy_image: RwLock::new(None),
        }
    }

    /// Resolves `request`, synchronously when the memory cache can answer.
    pub fn request(&self, request: ImageRequest) -> Fetch {
        let key = request.cache_key();
        if let Some(result) = self.resolve_immediately(&request, &key) {
            return Fetch::Ready(result);
        }

        let (tx, rx) = oneshot::channel();
        let handle = self.start_task(request, key, move |result| {
            let _ = tx.send(result);
        });
        Fetch::Pending(PendingFetch { rx, handle })
    }

    /// Callback form of [`Self::request`].
    ///
    /// Memory hits call back before returning and yield `None`. Otherwise the
    /// callback runs on the runtime this was called from, or on the worker
    /// when called from outside any runtime.
    pub fn request_with<F>(&self, request: ImageRequest, callback: F) -> Option<TaskHandle>
    where
        F: FnOnce(FetchResult) + Send + 'static,
    {
        let key = request.cache_key();
        if let Some(result) = self.resolve_immediately(&request, &key) {
            callback(result);
            return None;
        }

        let context = DeliveryContext::capture();
        Some(self.start_task(request, key, move |result| {
            context.deliver(move || callback(result));
        }))
    }

    /// Loads an image, blocking the calling thread.
    ///
    /// # Panics
    /// Panics if called from within an async execution context.
    pub fn request_blocking(&self, request: ImageRequest) -> Option<Arc<DecodedImage>> {
        match self.request(request) {
            Fetch::Ready(result) => result.image,
            Fetch::Pending(pending) => pending.wait_blocking().and_then(|r| r.image),
        }
    }

    /// Loads `url` without a filter.
    pub fn get(&self, url: impl Into<String>) -> Fetch {
        self.request(ImageRequest::get(url))
    }

    /// Loads `url` resized to fill `width` x `height`.
    pub fn get_sized(&self, url: impl Into<String>, width: u32, height: u32) -> Fetch {
        self.request(ImageRequest::get(url).filter(Filter::resizer(width, height)))
    }

    /// Clears memory and sweeps the disk cache with the configured limits.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be created or read.
    pub async fn clean_cache(&self) -> CacheResult<SweepReport> {
        self.memory_cache.clear();
        self.disk_cache
            .sweep(self.config.file_cache_ttl(), self.config.file_cache_max_size)
            .await
    }

    /// Clears memory, aborts scheduled decodes and empties the disk cache.
    ///
    /// Tasks whose decode was aborted never deliver.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be removed or recreated.
    pub async fn reset(&self) -> CacheResult<()> {
        self.memory_cache.clear();
        let cancelled = self.scheduler.cancel_all();
        self.disk_cache.reset().await?;
        info!(cancelled, "Image loader reset");
        Ok(())
    }

    /// Reacts to a host lifecycle signal.
    pub async fn handle_lifecycle(&self, event: LifecycleEvent) {
        debug!(?event, "Lifecycle event");
        match event {
            LifecycleEvent::EnteredBackground => {
                if let Err(e) = self.clean_cache().await {
                    warn!(error = %e, "Background cache sweep failed");
                }
            }
            LifecycleEvent::MemoryPressure => self.memory_cache.clear(),
        }
    }

    /// Feeds lifecycle signals from `events` into the loader until the channel
    /// closes or the loader is dropped.
    pub fn watch_lifecycle(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<LifecycleEvent>,
    ) -> JoinHandle<()> {
        let loader: Weak<Self> = Arc::downgrade(self);
        self.runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(loader) = loader.upgrade() else {
                    break;
                };
                loader.handle_lifecycle(event).await;
            }
            debug!("Lifecycle watcher stopped");
        })
    }

    /// Makes every request resolve to `image` immediately. `None` restores
    /// normal loading.
    pub fn set_dummy_image(&self, image: Option<DecodedImage>) {
        *self.dummy_image.write() = image.map(Arc::new);
    }

    /// Returns memory cache statistics.
    #[must_use]
    pub fn memory_cache_stats(&self) -> CacheStats {
        self.memory_cache.stats()
    }

    /// The in-memory tier.
    #[must_use]
    pub fn memory_cache(&self) -> &MemoryImageCache {
        &self.memory_cache
    }

    /// The on-disk tier.
    #[must_use]
    pub fn disk_cache(&self) -> &DiskImageCache {
        &self.disk_cache
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn memory_enabled(&self, request: &ImageRequest) -> bool {
        !request.no_cache && !self.config.disable_memory_cache
    }

    fn resolve_immediately(&self, request: &ImageRequest, key: &CacheKey) -> Option<FetchResult> {
        if let Some(dummy) = self.dummy_image.read().clone() {
            return Some(FetchResult::loaded(dummy, ResultReason::MemoryCached));
        }
        if !self.memory_enabled(request) {
            return None;
        }
        self.memory_cache
            .get(key)
            .map(|image| FetchResult::loaded(image, ResultReason::MemoryCached))
    }

    fn start_task<F>(&self, request: ImageRequest, key: CacheKey, completion: F) -> TaskHandle
    where
        F: FnOnce(FetchResult) + Send + 'static,
    {
        let populate_memory = self.memory_enabled(&request);
        let options = TaskOptions {
            disable_file_cache: self.config.disable_file_cache || request.no_cache,
            decode_delay: Duration::from_millis(self.config.debug_decode_delay_ms),
        };
        let context = TaskContext {
            transport: self.transport.clone(),
            disk_cache: self.disk_cache.clone(),
            scheduler: self.scheduler.clone(),
        };
        let task = FetchTask::new(
            request.transport_request(),
            self.disk_cache.path_for(&request.url),
            request.filter,
            context,
            options,
        );

        let memory_cache = self.memory_cache.clone();
        task.start(&self.runtime, move |result| {
            if populate_memory && let Some(image) = &result.image {
                memory_cache.put(key, image.clone());
            }
            completion(result);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::StubTransport;
    use std::io::Cursor;
    use tempfile::TempDir;

    const URL: &str = "https://example.com/cat.png";

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn test_config(temp_dir: &TempDir) -> LoaderConfig {
        LoaderConfig {
            cache_dir: Some(temp_dir.path().join("images")),
            ..LoaderConfig::default()
        }
    }

    async fn create_loader(
        transport: Arc<dyn TransportPort>,
        configure: impl FnOnce(&mut LoaderConfig),
    ) -> (ImageLoader, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(&temp_dir);
        configure(&mut config);
        let loader = ImageLoader::new(config, transport).await.unwrap();
        (loader, temp_dir)
    }

    #[tokio::test]
    async fn test_cold_miss_downloads_and_caches() {
        let transport = Arc::new(StubTransport::ok(200, png_bytes(8, 6)));
        let (loader, _temp) = create_loader(transport.clone(), |_| {}).await;

        let fetch = loader.get(URL);
        assert!(!fetch.is_ready());
        let result = fetch.wait().await.unwrap();

        assert_eq!(result.reason, ResultReason::Downloaded);
        assert_eq!(result.image.as_ref().unwrap().width(), 8);
        assert!(loader.disk_cache().contains(&loader.disk_cache().path_for(URL)).await);
        assert_eq!(loader.memory_cache().len(), 1);

        let second = loader.get(URL);
        assert!(second.is_ready());
        let second = second.wait().await.unwrap();
        assert_eq!(second.reason, ResultReason::MemoryCached);
        assert!(Arc::ptr_eq(&second.image.unwrap(), &result.image.unwrap()));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fresh_loader_reads_disk() {
        let temp_dir = TempDir::new().unwrap();
        let bytes = png_bytes(4, 4);

        let first = ImageLoader::new(
            test_config(&temp_dir),
            Arc::new(StubTransport::ok(200, bytes.clone())),
        )
        .await
        .unwrap();
        first.get(URL).wait().await.unwrap();
        let stored = first.disk_cache().get_bytes(&first.disk_cache().path_for(URL)).await;
        assert_eq!(stored, Some(bytes));

        let offline = Arc::new(StubTransport::ok(503, Vec::new()));
        let second = ImageLoader::new(test_config(&temp_dir), offline.clone())
            .await
            .unwrap();
        let result = second.get(URL).wait().await.unwrap();

        assert_eq!(result.reason, ResultReason::FileCached);
        assert!(result.decode_time <= Duration::from_secs(5));
        assert_eq!(offline.call_count(), 0);
    }

    #[tokio::test]
    async fn test_not_found_caches_nothing() {
        let transport = Arc::new(StubTransport::ok(404, b"missing".to_vec()));
        let (loader, _temp) = create_loader(transport, |_| {}).await;

        let result = loader.get(URL).wait().await.unwrap();

        assert_eq!(result.reason, ResultReason::DownloadFailed);
        assert!(result.image.is_none());
        assert!(loader.memory_cache().is_empty());
        assert!(loader.disk_cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_request() {
        let (transport, gate) = StubTransport::ok(200, png_bytes(2, 2)).gated();
        let transport = Arc::new(transport);
        let (loader, _temp) = create_loader(transport.clone(), |_| {}).await;

        let fetch = loader.get(URL);
        let handle = fetch.handle().unwrap();
        while transport.call_count() == 0 {
            tokio::task::yield_now().await;
        }

        handle.cancel();
        gate.notify_one();

        assert!(fetch.wait().await.is_none());
        assert!(loader.memory_cache().is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let transport = Arc::new(StubTransport::ok(200, png_bytes(3, 3)));
        let (loader, _temp) = create_loader(transport.clone(), |_| {}).await;
        loader.get(URL).wait().await.unwrap();

        loader.reset().await.unwrap();

        assert!(loader.memory_cache().is_empty());
        assert!(loader.disk_cache().is_empty().await);
        assert!(loader.disk_cache().cache_dir().exists());

        let result = loader.get(URL).wait().await.unwrap();
        assert_eq!(result.reason, ResultReason::Downloaded);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_reset_suppresses_scheduled_decode() {
        let transport = Arc::new(StubTransport::ok(200, png_bytes(3, 3)));
        let (loader, _temp) =
            create_loader(transport, |config| config.debug_decode_delay_ms = 300).await;

        let fetch = loader.get(URL);
        let handle = fetch.handle().unwrap();
        while handle.state() != Some(crate::domain::TaskState::Decoding) {
            tokio::task::yield_now().await;
        }

        loader.reset().await.unwrap();
        assert!(fetch.wait().await.is_none());
        assert!(loader.memory_cache().is_empty());
    }

    #[tokio::test]
    async fn test_filter_shares_disk_entry() {
        let transport = Arc::new(StubTransport::ok(200, png_bytes(40, 20)));
        let (loader, _temp) = create_loader(transport.clone(), |_| {}).await;

        let plain = loader.get(URL).wait().await.unwrap();
        let sized = loader.get_sized(URL, 10, 10).wait().await.unwrap();

        assert_eq!(plain.image.unwrap().width(), 40);
        assert_eq!(sized.reason, ResultReason::FileCached);
        let sized = sized.image.unwrap();
        assert_eq!((sized.width(), sized.height()), (10, 10));
        assert_eq!(loader.memory_cache().len(), 2);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_cache_bypasses_both_tiers() {
        let transport = Arc::new(StubTransport::ok(200, png_bytes(2, 2)));
        let (loader, _temp) = create_loader(transport.clone(), |_| {}).await;
        loader.get(URL).wait().await.unwrap();

        let result = loader
            .request(ImageRequest::get(URL).no_cache())
            .wait()
            .await
            .unwrap();

        assert_eq!(result.reason, ResultReason::Downloaded);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_disabled_memory_cache_never_stores() {
        let transport = Arc::new(StubTransport::ok(200, png_bytes(2, 2)));
        let (loader, _temp) =
            create_loader(transport, |config| config.disable_memory_cache = true).await;

        loader.get(URL).wait().await.unwrap();
        let second = loader.get(URL).wait().await.unwrap();

        assert_eq!(second.reason, ResultReason::FileCached);
        assert!(loader.memory_cache().is_empty());
    }

    #[tokio::test]
    async fn test_dummy_image_short_circuits() {
        let transport = Arc::new(StubTransport::ok(500, Vec::new()));
        let (loader, _temp) = create_loader(transport.clone(), |_| {}).await;
        loader.set_dummy_image(Some(DecodedImage::still(image::DynamicImage::new_rgba8(1, 1))));

        let fetch = loader.get("https://example.com/anything.png");
        assert!(fetch.is_ready());
        assert_eq!(fetch.wait().await.unwrap().reason, ResultReason::MemoryCached);
        assert_eq!(transport.call_count(), 0);

        loader.set_dummy_image(None);
        assert!(!loader.get(URL).is_ready());
    }

    #[tokio::test]
    async fn test_request_with_memory_hit_calls_back_synchronously() {
        let transport = Arc::new(StubTransport::ok(200, png_bytes(2, 2)));
        let (loader, _temp) = create_loader(transport, |_| {}).await;
        loader.get(URL).wait().await.unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let handle = loader.request_with(ImageRequest::get(URL), move |result| {
            tx.send(result.reason).unwrap();
        });

        assert!(handle.is_none());
        assert_eq!(rx.try_recv().unwrap(), ResultReason::MemoryCached);
    }

    #[tokio::test]
    async fn test_request_with_delivers_on_runtime() {
        let transport = Arc::new(StubTransport::ok(200, png_bytes(2, 2)));
        let (loader, _temp) = create_loader(transport, |_| {}).await;

        let (tx, rx) = oneshot::channel();
        let handle = loader.request_with(ImageRequest::get(URL), move |result| {
            let _ = tx.send((result.reason, Handle::try_current().is_ok()));
        });

        assert!(handle.is_some());
        assert_eq!(rx.await.unwrap(), (ResultReason::Downloaded, true));
    }

    #[test]
    fn test_request_blocking_outside_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let temp_dir = TempDir::new().unwrap();
        let transport = Arc::new(StubTransport::ok(200, png_bytes(5, 5)));
        let loader = runtime
            .block_on(ImageLoader::new(test_config(&temp_dir), transport))
            .unwrap();

        let image = loader.request_blocking(ImageRequest::get(URL)).unwrap();
        assert_eq!(image.width(), 5);
    }

    #[tokio::test]
    async fn test_clean_cache_applies_size_limit() {
        let transport = Arc::new(StubTransport::ok(200, png_bytes(2, 2)));
        let (loader, _temp) =
            create_loader(transport, |config| config.file_cache_max_size = 1).await;
        loader.get(URL).wait().await.unwrap();

        let report = loader.clean_cache().await.unwrap();

        assert_eq!(report.evicted, 1);
        assert!(loader.memory_cache().is_empty());
        assert!(loader.disk_cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_pressure_clears_memory_only() {
        let transport = Arc::new(StubTransport::ok(200, png_bytes(2, 2)));
        let (loader, _temp) = create_loader(transport, |_| {}).await;
        loader.get(URL).wait().await.unwrap();

        loader.handle_lifecycle(LifecycleEvent::MemoryPressure).await;

        assert!(loader.memory_cache().is_empty());
        assert_eq!(loader.disk_cache().len().await, 1);
    }

    #[tokio::test]
    async fn test_watch_lifecycle_sweeps_on_background() {
        let transport = Arc::new(StubTransport::ok(200, png_bytes(2, 2)));
        let (loader, _temp) =
            create_loader(transport, |config| config.file_cache_max_size = 1).await;
        let loader = Arc::new(loader);
        loader.get(URL).wait().await.unwrap();

        let (tx, rx) = mpsc::channel(4);
        let watcher = loader.watch_lifecycle(rx);
        tx.send(LifecycleEvent::EnteredBackground).await.unwrap();
        drop(tx);
        watcher.await.unwrap();

        assert!(loader.memory_cache().is_empty());
        assert!(loader.disk_cache().is_empty().await);
    }
}
