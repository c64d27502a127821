//! Associates view slots with the image load feeding them.

use std::collections::HashMap;
use std::hash::Hash;

use tracing::trace;

use crate::domain::entities::FetchResult;
use crate::infrastructure::image::{ImageLoader, ImageRequest, TaskHandle};

struct Slot {
    url: String,
    handle: Option<TaskHandle>,
}

/// Tracks which load each view is waiting on.
///
/// Binding a view cancels its previous load. Dropping the bindings cancels
/// every load still running.
pub struct ImageBindings<K> {
    slots: HashMap<K, Slot>,
}

impl<K> ImageBindings<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Creates an empty set of bindings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Loads `request` for `view`. `on_result` receives the view and the
    /// result unless the load is cancelled first.
    pub fn bind<F>(&mut self, view: K, loader: &ImageLoader, request: ImageRequest, on_result: F)
    where
        F: FnOnce(K, FetchResult) + Send + 'static,
    {
        self.unbind(&view);

        let url = request.url().to_string();
        let target = view.clone();
        let handle = loader.request_with(request, move |result| on_result(target, result));
        trace!(url = %url, pending = handle.is_some(), "Bound image");

        self.slots.insert(view, Slot { url, handle });
    }

    /// Cancels and forgets the load bound to `view`. Returns false if the
    /// view had no binding.
    pub fn unbind(&mut self, view: &K) -> bool {
        let Some(slot) = self.slots.remove(view) else {
            return false;
        };
        if let Some(handle) = slot.handle {
            handle.cancel();
        }
        true
    }

    /// URL bound to `view`.
    #[must_use]
    pub fn url(&self, view: &K) -> Option<&str> {
        self.slots.get(view).map(|s| s.url.as_str())
    }

    /// Handle of the load bound to `view`, `None` for memory hits.
    #[must_use]
    pub fn handle(&self, view: &K) -> Option<TaskHandle> {
        self.slots.get(view).and_then(|s| s.handle.clone())
    }

    /// Returns true while the load bound to `view` can still deliver.
    #[must_use]
    pub fn is_loading(&self, view: &K) -> bool {
        self.slots
            .get(view)
            .and_then(|s| s.handle.as_ref())
            .is_some_and(TaskHandle::is_active)
    }

    /// Number of bound views.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no view is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Cancels every load and forgets all views.
    pub fn clear(&mut self) {
        for (_, slot) in self.slots.drain() {
            if let Some(handle) = slot.handle {
                handle.cancel();
            }
        }
    }
}

impl<K> Default for ImageBindings<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for ImageBindings<K> {
    fn drop(&mut self) {
        for slot in self.slots.values() {
            if let Some(handle) = &slot.handle {
                handle.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ResultReason;
    use crate::domain::ports::mocks::StubTransport;
    use crate::infrastructure::config::LoaderConfig;
    use std::io::Cursor;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn png_bytes() -> Vec<u8> {
        let mut buf = Vec::new();
        image::DynamicImage::new_rgb8(2, 2)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    async fn loader(transport: Arc<StubTransport>, temp_dir: &TempDir) -> ImageLoader {
        let config = LoaderConfig {
            cache_dir: Some(temp_dir.path().join("images")),
            ..LoaderConfig::default()
        };
        ImageLoader::new(config, transport).await.unwrap()
    }

    async fn wait_for_calls(transport: &StubTransport, calls: usize) {
        while transport.call_count() < calls {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_rebinding_cancels_previous_load() {
        let temp_dir = TempDir::new().unwrap();
        let (transport, gate) = StubTransport::ok(200, png_bytes()).gated();
        let transport = Arc::new(transport);
        let loader = loader(transport.clone(), &temp_dir).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut bindings = ImageBindings::new();

        let old_tx = tx.clone();
        bindings.bind(1, &loader, ImageRequest::get("https://a/old.png"), move |view, result| {
            let _ = old_tx.send((view, result.reason, "old"));
        });
        wait_for_calls(&transport, 1).await;
        let old = bindings.handle(&1).unwrap();

        bindings.bind(1, &loader, ImageRequest::get("https://a/new.png"), move |view, result| {
            let _ = tx.send((view, result.reason, "new"));
        });
        wait_for_calls(&transport, 2).await;
        gate.notify_waiters();

        assert_eq!(rx.recv().await, Some((1, ResultReason::Downloaded, "new")));
        assert!(!old.is_active());
        assert_eq!(bindings.url(&1), Some("https://a/new.png"));
        assert_eq!(bindings.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropping_bindings_cancels_loads() {
        let temp_dir = TempDir::new().unwrap();
        let (transport, gate) = StubTransport::ok(200, png_bytes()).gated();
        let transport = Arc::new(transport);
        let loader = loader(transport.clone(), &temp_dir).await;
        let (tx, mut rx) = mpsc::unbounded_channel::<ResultReason>();

        let mut bindings = ImageBindings::new();
        bindings.bind("avatar", &loader, ImageRequest::get("https://a/x.png"), move |_, result| {
            let _ = tx.send(result.reason);
        });
        wait_for_calls(&transport, 1).await;
        assert!(bindings.is_loading(&"avatar"));

        drop(bindings);
        gate.notify_one();

        assert_eq!(rx.recv().await, None);
        assert_eq!(loader.memory_cache_stats().size, 0);
    }

    #[tokio::test]
    async fn test_memory_hit_binds_without_task() {
        let temp_dir = TempDir::new().unwrap();
        let transport = Arc::new(StubTransport::ok(200, png_bytes()));
        let loader = loader(transport, &temp_dir).await;
        loader.get("https://a/x.png").wait().await.unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let mut bindings = ImageBindings::new();
        bindings.bind(7u32, &loader, ImageRequest::get("https://a/x.png"), move |view, result| {
            tx.send((view, result.reason)).unwrap();
        });

        assert_eq!(rx.try_recv().unwrap(), (7, ResultReason::MemoryCached));
        assert!(bindings.handle(&7).is_none());
        assert!(!bindings.is_loading(&7));
        assert!(bindings.unbind(&7));
        assert!(bindings.is_empty());
    }
}
