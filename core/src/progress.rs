use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receives `(completed_bytes, total_bytes)` observations as chunks are persisted.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, completed: u64, total: u64);
}

impl<F> ProgressSink for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn on_progress(&self, completed: u64, total: u64) {
        self(completed, total)
    }
}

/// Bytes persisted so far for one download.
pub struct ProgressCounter {
    completed: AtomicU64,
    total: u64,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl ProgressCounter {
    pub fn new(total: u64, sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            completed: AtomicU64::new(0),
            total,
            sink,
        }
    }

    /// Records `bytes` more persisted bytes and returns the new total.
    pub fn add(&self, bytes: u64) -> u64 {
        let completed = self.completed.fetch_add(bytes, Ordering::SeqCst) + bytes;
        if let Some(sink) = &self.sink {
            sink.on_progress(completed, self.total);
        }
        completed
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}
