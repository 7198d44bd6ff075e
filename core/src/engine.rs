use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, info_span};

use crate::checksum::{verify_checksum, ChecksumRequest};
use crate::config::DownloaderConfig;
use crate::error::{CoreError, CoreResult};
use crate::naming::output_path;
use crate::net::{NetClient, ReqwestNetClient};
use crate::plan::{choose_strategy, plan, Strategy};
use crate::pool::{CancelHandle, HttpChunkFetcher, PoolConfig, WorkerPool};
use crate::probe::{probe, FileRange};
use crate::progress::{ProgressCounter, ProgressSink};
use crate::writer::FileWriter;

/// Outcome of one finished download.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub range: FileRange,
    pub strategy: Strategy,
    pub chunks: usize,
    pub bytes_written: u64,
}

pub struct Downloader {
    config: DownloaderConfig,
    net: Arc<dyn NetClient>,
    progress: Option<Arc<dyn ProgressSink>>,
    checksum: Option<ChecksumRequest>,
    cancel: CancelHandle,
}

impl Downloader {
    pub fn new(config: DownloaderConfig) -> CoreResult<Self> {
        config.validate()?;
        let net = ReqwestNetClient::new(&config)?;
        Ok(Self {
            config,
            net: Arc::new(net),
            progress: None,
            checksum: None,
            cancel: CancelHandle::new(),
        })
    }

    pub fn with_net_client(mut self, net: Box<dyn NetClient>) -> Self {
        self.net = Arc::from(net);
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn with_checksum(mut self, checksum: ChecksumRequest) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Handle that aborts the running download. Once canceled, later downloads
    /// on this downloader fail with `Canceled` too.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Downloads `url` into the current directory under the name derived from the URL.
    pub fn download(&self, url: &str) -> CoreResult<PathBuf> {
        let dest = output_path(url, "");
        self.download_to(url, dest).map(|report| report.path)
    }

    /// Downloads `url` to `dest`. On failure the partial file is left in place.
    pub fn download_to(&self, url: &str, dest: impl AsRef<Path>) -> CoreResult<DownloadReport> {
        let dest = dest.as_ref();
        let span = info_span!("download", url);
        let _enter = span.enter();

        if self.cancel.is_canceled() {
            return Err(CoreError::Canceled);
        }
        let started = Instant::now();

        let range = probe(self.net.as_ref(), url)?;
        let strategy = choose_strategy(&range, &self.config);
        let plan = plan(&range, strategy)?;
        info!(
            strategy = %plan.strategy(),
            chunks = plan.len(),
            content_length = range.content_length,
            dest = %dest.display(),
            "planned download"
        );

        let progress = Arc::new(ProgressCounter::new(
            range.content_length,
            self.progress.clone(),
        ));
        let writer = FileWriter::create(dest, range.content_length, progress)?;

        let fetcher = Arc::new(HttpChunkFetcher::new(
            Arc::clone(&self.net),
            url,
            range.supports_range,
        ));
        let pool = WorkerPool::new(PoolConfig {
            max_concurrency: self.config.max_workers,
            max_retries: self.config.max_retries,
            retry_backoff: self.config.retry_backoff(),
        })
        .with_cancel(self.cancel.clone());
        pool.run(&plan, fetcher, |chunk| writer.submit(chunk))?;

        if writer.chunks_written() != plan.len() {
            return Err(CoreError::Write(format!(
                "{} of {} chunks written",
                writer.chunks_written(),
                plan.len()
            )));
        }
        let bytes_written = writer.finish()?;

        if let Some(checksum) = &self.checksum {
            verify_checksum(dest, checksum)?;
            info!(kind = %checksum.checksum_type, "checksum verified");
        }

        info!(
            bytes = bytes_written,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "download complete"
        );
        Ok(DownloadReport {
            path: dest.to_path_buf(),
            range,
            strategy: plan.strategy(),
            chunks: plan.len(),
            bytes_written,
        })
    }
}
