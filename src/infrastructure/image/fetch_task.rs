//! Per-request state machine: disk lookup, download, decode, deliver.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::domain::entities::{DecodedImage, DiskPath, FetchResult, Filter, ResultReason, TaskState};
use crate::domain::errors::CacheError;
use crate::domain::ports::{TransportPort, TransportRequest};

use super::codec;
use super::disk_cache::DiskImageCache;
use super::scheduler::{ScheduleError, TaskScheduler};

/// Total download attempts allowed when the connection keeps dropping.
pub const MAX_DOWNLOAD_ATTEMPTS: u32 = 10;

type Completion = Box<dyn FnOnce(FetchResult) + Send>;

/// The task observed cancellation and must not deliver.
#[derive(Debug)]
struct Cancelled;

/// State shared between a running task and the handles pointing at it.
struct TaskControl {
    id: Uuid,
    cancel_tx: watch::Sender<bool>,
    state: Mutex<TaskState>,
    completion: Mutex<Option<Completion>>,
}

impl TaskControl {
    fn new() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            cancel_tx,
            state: Mutex::new(TaskState::Created),
            completion: Mutex::new(None),
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    async fn cancelled(&self) {
        let mut rx = self.cancel_tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    fn cancel(&self) {
        let already = self.cancel_tx.send_replace(true);
        // dropping the completion guarantees nothing is delivered later;
        // release the lock first since its destructor may re-enter
        let completion = self.completion.lock().take();
        drop(completion);
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = TaskState::Cancelled;
        }
        if !already {
            debug!(task = %self.id, "Fetch task cancelled");
        }
    }

    fn transition(&self, next: TaskState) {
        let mut state = self.state.lock();
        trace!(task = %self.id, from = %*state, to = %next, "Fetch task transition");
        *state = next;
    }

    fn deliver(&self, result: FetchResult) {
        let completion = self.completion.lock().take();
        match completion {
            Some(completion) if !self.is_cancelled() => {
                self.transition(TaskState::Delivered);
                debug!(task = %self.id, reason = %result.reason, "Fetch task delivered");
                completion(result);
            }
            _ => trace!(task = %self.id, "Delivery suppressed"),
        }
    }
}

/// Non-owning handle to a fetch task.
///
/// Holding a handle does not keep the task alive. Once the task has
/// delivered or been cancelled, the handle goes inert.
#[derive(Clone)]
pub struct TaskHandle {
    id: Uuid,
    control: Weak<TaskControl>,
}

impl TaskHandle {
    /// Cancels the task. The completion will never run.
    pub fn cancel(&self) {
        if let Some(control) = self.control.upgrade() {
            control.cancel();
        }
    }

    /// Current state, `None` once the task is gone.
    #[must_use]
    pub fn state(&self) -> Option<TaskState> {
        self.control.upgrade().map(|c| *c.state.lock())
    }

    /// Returns true while the task can still deliver.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state().is_some_and(|s| !s.is_terminal())
    }

    /// Unique task identifier, for logging.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Per-task switches copied from the loader configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskOptions {
    /// Skip reading and writing the disk cache.
    pub disable_file_cache: bool,
    /// Artificial pause after each decode.
    pub decode_delay: Duration,
}

/// Collaborators a task runs against.
#[derive(Clone)]
pub struct TaskContext {
    /// Network transport.
    pub transport: Arc<dyn TransportPort>,
    /// Raw byte cache.
    pub disk_cache: Arc<DiskImageCache>,
    /// Decode worker pool.
    pub scheduler: Arc<TaskScheduler>,
}

type Decoded = Result<(DecodedImage, Duration), CacheError>;

/// One in-flight request.
pub struct FetchTask {
    request: TransportRequest,
    path: DiskPath,
    filter: Option<Filter>,
    context: TaskContext,
    options: TaskOptions,
    control: Arc<TaskControl>,
    attempts: u32,
}

impl FetchTask {
    /// Creates a task in the `Created` state.
    #[must_use]
    pub fn new(
        request: TransportRequest,
        path: DiskPath,
        filter: Option<Filter>,
        context: TaskContext,
        options: TaskOptions,
    ) -> Self {
        Self {
            request,
            path,
            filter,
            context,
            options,
            control: Arc::new(TaskControl::new()),
            attempts: 0,
        }
    }

    /// Returns a handle to this task.
    #[must_use]
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            id: self.control.id,
            control: Arc::downgrade(&self.control),
        }
    }

    /// Starts the task on `runtime`. `completion` runs at most once, and
    /// never after cancellation.
    pub fn start<F>(self, runtime: &Handle, completion: F) -> TaskHandle
    where
        F: FnOnce(FetchResult) + Send + 'static,
    {
        *self.control.completion.lock() = Some(Box::new(completion));
        let handle = self.handle();
        debug!(task = %handle.id, url = %self.request.url, "Fetch task started");

        let mut task = self;
        runtime.spawn(async move {
            let control = task.control.clone();
            match task.run().await {
                Ok(result) => control.deliver(result),
                Err(Cancelled) => control.cancel(),
            }
        });

        handle
    }

    async fn run(&mut self) -> Result<FetchResult, Cancelled> {
        self.control.transition(TaskState::CheckingDisk);

        if !self.options.disable_file_cache
            && self.context.disk_cache.contains(&self.path).await
            && let Some(result) = self.load_from_disk().await?
        {
            return Ok(result);
        }

        self.download().await
    }

    /// `Ok(None)` means the cached file is unusable and the network should
    /// be tried instead.
    async fn load_from_disk(&mut self) -> Result<Option<FetchResult>, Cancelled> {
        let Some(bytes) = self.context.disk_cache.get_bytes(&self.path).await else {
            warn!(task = %self.control.id, path = %self.path, "Cached file unreadable, downloading");
            return Ok(None);
        };
        self.check_cancelled()?;

        match self.decode(bytes).await? {
            Ok((image, decode_time)) => Ok(Some(
                FetchResult::loaded(Arc::new(image), ResultReason::FileCached)
                    .with_decode_time(decode_time),
            )),
            Err(e) => {
                warn!(task = %self.control.id, path = %self.path, error = %e, "Cached file failed to decode, downloading");
                Ok(None)
            }
        }
    }

    async fn download(&mut self) -> Result<FetchResult, Cancelled> {
        loop {
            self.attempts += 1;
            self.control.transition(TaskState::Downloading {
                attempt: self.attempts,
            });

            let started = Instant::now();
            let control = self.control.clone();
            let transport = self.context.transport.clone();
            let outcome = tokio::select! {
                biased;
                () = control.cancelled() => return Err(Cancelled),
                outcome = transport.fetch(&self.request) => outcome,
            };
            let download_time = started.elapsed();
            self.check_cancelled()?;

            let response = match outcome {
                Ok(response) => response,
                Err(e) if e.is_transient() && self.attempts < MAX_DOWNLOAD_ATTEMPTS => {
                    debug!(task = %self.control.id, attempt = self.attempts, error = %e, "Transient download failure, retrying");
                    self.control.transition(TaskState::Retrying);
                    continue;
                }
                Err(e) => {
                    warn!(task = %self.control.id, url = %self.request.url, attempts = self.attempts, error = %e, "Download failed");
                    return Ok(FetchResult::failed(ResultReason::DownloadFailed)
                        .with_download_time(download_time));
                }
            };

            if !response.is_acceptable_status() {
                warn!(task = %self.control.id, url = %self.request.url, status = response.status, "Download rejected");
                return Ok(FetchResult::failed(ResultReason::DownloadFailed)
                    .with_download_time(download_time));
            }

            let Some(body) = response.body.filter(|b| !b.is_empty()) else {
                warn!(task = %self.control.id, url = %self.request.url, "Response had no body");
                return Ok(FetchResult::failed(ResultReason::NoData).with_download_time(download_time));
            };

            return self.decode_downloaded(body, download_time).await;
        }
    }

    async fn decode_downloaded(
        &mut self,
        body: Bytes,
        download_time: Duration,
    ) -> Result<FetchResult, Cancelled> {
        match self.decode(body.to_vec()).await? {
            Ok((image, decode_time)) => {
                if !self.options.disable_file_cache
                    && let Err(e) = self.context.disk_cache.put_bytes(&self.path, body).await
                {
                    warn!(task = %self.control.id, error = %e, "Failed to cache to disk");
                }
                Ok(FetchResult::loaded(Arc::new(image), ResultReason::Downloaded)
                    .with_decode_time(decode_time)
                    .with_download_time(download_time))
            }
            Err(e) => {
                warn!(task = %self.control.id, url = %self.request.url, error = %e, "Downloaded bytes failed to decode");
                Ok(FetchResult::failed(ResultReason::DecodeFailed).with_download_time(download_time))
            }
        }
    }

    async fn decode(&mut self, bytes: Vec<u8>) -> Result<Decoded, Cancelled> {
        self.control.transition(TaskState::Decoding);

        let filter = self.filter.clone();
        let delay = self.options.decode_delay;
        let unit = self.context.scheduler.submit(move || {
            let started = Instant::now();
            let decoded = codec::decode(bytes, filter.as_ref());
            let decode_time = started.elapsed();
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            decoded.map(|image| (image, decode_time))
        });

        let control = self.control.clone();
        let joined = tokio::select! {
            biased;
            () = control.cancelled() => return Err(Cancelled),
            joined = unit.join() => joined,
        };
        self.check_cancelled()?;

        match joined {
            Ok(decoded) => Ok(decoded),
            Err(ScheduleError::Cancelled) => Err(Cancelled),
            Err(ScheduleError::Panicked) => Ok(Err(CacheError::DecodeError(
                "decoder panicked".to_string(),
            ))),
        }
    }

    fn check_cancelled(&self) -> Result<(), Cancelled> {
        if self.control.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
