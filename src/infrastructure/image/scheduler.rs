//! Bounded decode worker pool and completion delivery.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, trace};

/// Default number of decode units allowed to run at once.
pub const DEFAULT_DECODE_CONCURRENCY: usize = 4;

/// Why a scheduled unit produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The unit was aborted before it finished.
    #[error("decode unit cancelled")]
    Cancelled,
    /// The unit panicked.
    #[error("decode unit panicked")]
    Panicked,
}

type Registry = Arc<Mutex<HashMap<u64, AbortHandle>>>;

/// Runs CPU-bound work on blocking threads, at most `concurrency` at a time.
///
/// Units waiting for a permit queue in submission order. Every unit not yet
/// finished can be aborted with [`TaskScheduler::cancel_all`].
pub struct TaskScheduler {
    runtime: Handle,
    permits: Arc<Semaphore>,
    concurrency: usize,
    inflight: Registry,
    next_id: AtomicU64,
}

impl TaskScheduler {
    /// Creates a scheduler spawning onto `runtime`.
    #[must_use]
    pub fn new(runtime: Handle, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            runtime,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Queues `work` and returns a handle to its result.
    pub fn submit<F, T>(&self, work: F) -> DecodeUnit<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let permits = self.permits.clone();

        let handle = self.runtime.spawn(async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| ScheduleError::Cancelled)?;
            // The permit is held by the blocking closure so an aborted unit
            // keeps its slot until the work itself returns.
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                work()
            })
            .await
            .map_err(|e| {
                if e.is_panic() {
                    ScheduleError::Panicked
                } else {
                    ScheduleError::Cancelled
                }
            })
        });

        self.inflight.lock().insert(id, handle.abort_handle());
        trace!(unit = id, "Decode unit submitted");

        DecodeUnit {
            id,
            handle,
            registry: self.inflight.clone(),
        }
    }

    /// Aborts every unit that has not finished. Returns how many were aborted.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<AbortHandle> = self.inflight.lock().drain().map(|(_, h)| h).collect();
        let count = drained.len();
        for handle in drained {
            handle.abort();
        }
        if count > 0 {
            debug!(count, "Cancelled scheduled decode units");
        }
        count
    }

    /// Number of submitted units not yet finished or dropped.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Configured concurrency ceiling.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }
}

/// A scheduled unit of work.
///
/// Dropping the unit aborts it if it has not started running. Work already
/// running on a blocking thread finishes and keeps its concurrency slot until
/// then, but its value is discarded.
pub struct DecodeUnit<T> {
    id: u64,
    handle: JoinHandle<Result<T, ScheduleError>>,
    registry: Registry,
}

impl<T> DecodeUnit<T> {
    /// Waits for the unit's value.
    ///
    /// # Errors
    /// Returns `ScheduleError` if the unit was aborted or panicked.
    pub async fn join(mut self) -> Result<T, ScheduleError> {
        match (&mut self.handle).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(ScheduleError::Panicked),
            Err(_) => Err(ScheduleError::Cancelled),
        }
    }
}

impl<T> Drop for DecodeUnit<T> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
        self.handle.abort();
    }
}

/// Where a completion runs.
///
/// Captured when a request is issued so the result comes back on the
/// runtime that asked for it, whichever worker produced it.
#[derive(Debug, Clone)]
pub enum DeliveryContext {
    /// Run on the thread that produced the result.
    Inline,
    /// Spawn onto the captured runtime.
    Runtime(Handle),
}

impl DeliveryContext {
    /// Captures the current runtime, or `Inline` outside of any runtime.
    #[must_use]
    pub fn capture() -> Self {
        Handle::try_current().map_or(Self::Inline, Self::Runtime)
    }

    /// Runs `deliver` in this context.
    pub fn deliver<F>(&self, deliver: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            Self::Inline => deliver(),
            Self::Runtime(handle) => {
                handle.spawn(async move { deliver() });
            }
        }
    }
}
