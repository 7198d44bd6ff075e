use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, warn};

use crate::chunk::Chunk;
use crate::error::{CoreError, CoreResult};
use crate::net::{DownloadRequest, NetClient};
use crate::plan::DownloadPlan;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Fetches the bytes of one chunk.
pub trait ChunkFetcher: Send + Sync {
    fn fetch(&self, chunk: &Chunk) -> CoreResult<Bytes>;
}

impl<F> ChunkFetcher for F
where
    F: Fn(&Chunk) -> CoreResult<Bytes> + Send + Sync,
{
    fn fetch(&self, chunk: &Chunk) -> CoreResult<Bytes> {
        self(chunk)
    }
}

/// GETs chunks over HTTP, with a `Range` header when the resource serves ranges.
pub struct HttpChunkFetcher {
    net: Arc<dyn NetClient>,
    url: String,
    use_ranges: bool,
}

impl HttpChunkFetcher {
    pub fn new(net: Arc<dyn NetClient>, url: impl Into<String>, use_ranges: bool) -> Self {
        Self {
            net,
            url: url.into(),
            use_ranges,
        }
    }
}

impl ChunkFetcher for HttpChunkFetcher {
    fn fetch(&self, chunk: &Chunk) -> CoreResult<Bytes> {
        let mut req = DownloadRequest::new(self.url.clone());
        if self.use_ranges {
            req = req.with_range(chunk.begin, chunk.end);
        }
        self.net.get(&req)
    }
}

/// Cloneable handle that aborts a running download from any thread.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    canceled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

enum PoolEvent {
    Completed(Chunk),
    Failed(CoreError),
}

pub struct WorkerPool {
    config: PoolConfig,
    cancel: CancelHandle,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetches every chunk of `plan` and hands each completed chunk to
    /// `on_completed` on the calling thread.
    ///
    /// At most `max_concurrency` fetches run at once. Failed chunks go back on
    /// the same pending queue until they exceed `max_retries`. The first fatal
    /// error stops all workers, which are joined before it is returned.
    pub fn run<F>(
        &self,
        plan: &DownloadPlan,
        fetcher: Arc<dyn ChunkFetcher>,
        mut on_completed: F,
    ) -> CoreResult<()>
    where
        F: FnMut(Chunk) -> CoreResult<()>,
    {
        if plan.is_empty() {
            return Ok(());
        }
        if self.config.max_concurrency == 0 {
            return Err(CoreError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        let (pending_tx, pending_rx) = crossbeam_channel::unbounded::<Chunk>();
        for chunk in plan.chunks() {
            pending_tx
                .send(chunk.clone())
                .map_err(|err| CoreError::Io(err.to_string()))?;
        }

        let slots = self.config.max_concurrency.min(plan.len());
        let (event_tx, event_rx) = crossbeam_channel::bounded::<PoolEvent>(slots);
        let stop = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(slots);
        for slot in 0..slots {
            let worker = Worker {
                pending_rx: pending_rx.clone(),
                pending_tx: pending_tx.clone(),
                events: event_tx.clone(),
                fetcher: Arc::clone(&fetcher),
                stop: Arc::clone(&stop),
                max_retries: self.config.max_retries,
                retry_backoff: self.config.retry_backoff,
            };
            let spawned = thread::Builder::new()
                .name(format!("fetch-{}", slot))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    stop.store(true, Ordering::SeqCst);
                    drop(event_rx);
                    join_all(handles);
                    return Err(CoreError::Io(err.to_string()));
                }
            }
        }
        drop(pending_tx);
        drop(pending_rx);
        drop(event_tx);

        let mut remaining = plan.len();
        let outcome = loop {
            if remaining == 0 {
                break Ok(());
            }
            if self.cancel.is_canceled() {
                break Err(CoreError::Canceled);
            }
            match event_rx.recv_timeout(POLL_INTERVAL) {
                Ok(PoolEvent::Completed(chunk)) => {
                    if let Err(err) = on_completed(chunk) {
                        break Err(err);
                    }
                    remaining -= 1;
                }
                Ok(PoolEvent::Failed(err)) => break Err(err),
                Err(RecvTimeoutError::Timeout) => {
                    // workers only return once stopped, an early exit is a panic
                    if handles.iter().any(JoinHandle::is_finished) {
                        break Err(CoreError::Io(
                            "fetch worker exited unexpectedly".to_string(),
                        ));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    break Err(CoreError::Io("all fetch workers exited".to_string()));
                }
            }
        };

        stop.store(true, Ordering::SeqCst);
        // unblocks workers waiting for room on the completed queue
        drop(event_rx);
        join_all(handles);

        if let Err(err) = &outcome {
            error!(error = %err, remaining, "download aborted");
        }
        outcome
    }
}

fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            warn!("fetch worker panicked");
        }
    }
}

struct Worker {
    pending_rx: Receiver<Chunk>,
    pending_tx: Sender<Chunk>,
    events: Sender<PoolEvent>,
    fetcher: Arc<dyn ChunkFetcher>,
    stop: Arc<AtomicBool>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl Worker {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn run(self) {
        loop {
            if self.stopped() {
                return;
            }
            let chunk = match self.pending_rx.recv_timeout(POLL_INTERVAL) {
                Ok(chunk) => chunk.activated(),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            };

            let event = match self.fetch(&chunk) {
                Ok(done) => PoolEvent::Completed(done),
                Err(err) if err.is_retryable() => {
                    let retry = chunk.retried();
                    if retry.retry_count > self.max_retries {
                        let failed = retry.failed();
                        debug!(
                            index = failed.index,
                            status = %failed.status,
                            attempts = failed.retry_count,
                            "chunk retries exhausted"
                        );
                        PoolEvent::Failed(CoreError::RetryExhausted {
                            begin: failed.begin,
                            end: failed.end,
                            attempts: failed.retry_count,
                            last_error: err.to_string(),
                        })
                    } else {
                        warn!(
                            index = chunk.index,
                            begin = chunk.begin,
                            end = chunk.end,
                            retry = retry.retry_count,
                            error = %err,
                            "chunk fetch failed, requeueing"
                        );
                        self.backoff();
                        if self.pending_tx.send(retry).is_err() {
                            return;
                        }
                        continue;
                    }
                }
                Err(err) => PoolEvent::Failed(err),
            };

            if self.stopped() || self.events.send(event).is_err() {
                return;
            }
        }
    }

    fn fetch(&self, chunk: &Chunk) -> CoreResult<Chunk> {
        debug!(
            index = chunk.index,
            begin = chunk.begin,
            end = chunk.end,
            attempt = chunk.retry_count + 1,
            "fetching chunk"
        );
        let body = self.fetcher.fetch(chunk)?;
        let actual = body.len() as u64;
        if actual != chunk.size() {
            return Err(CoreError::LengthMismatch {
                begin: chunk.begin,
                end: chunk.end,
                expected: chunk.size(),
                actual,
            });
        }
        Ok(chunk.completed(body))
    }

    fn backoff(&self) {
        let deadline = Instant::now() + self.retry_backoff;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(POLL_INTERVAL));
        }
    }
}
