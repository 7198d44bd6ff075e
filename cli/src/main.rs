use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rangeget_core::checksum::ChecksumRequest;
use rangeget_core::naming::output_path;
use rangeget_core::{CoreError, Downloader, DownloaderConfig, ProgressSink};

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Parallel HTTP downloader that fetches byte ranges concurrently.
#[derive(Parser, Debug)]
#[command(name = "rangeget", author, version, about, long_about = None)]
struct Args {
    /// URL of the resource to download
    url: String,

    /// Output file (defaults to the last path segment of the URL)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of concurrent fetch workers
    #[arg(short = 'w', long, env = "RANGEGET_WORKERS")]
    workers: Option<usize>,

    /// Number of parts for medium sized files
    #[arg(long, env = "RANGEGET_FANOUT")]
    fanout: Option<u64>,

    /// Chunk size in bytes for large files
    #[arg(long, env = "RANGEGET_CHUNK_SIZE")]
    chunk_size: Option<u64>,

    /// Files below this many bytes are fetched with a single request
    #[arg(long, env = "RANGEGET_SMALL_FILE_BYTES")]
    small_file_bytes: Option<u64>,

    /// Files of at least this many bytes are split by chunk size instead of fanout
    #[arg(long, env = "RANGEGET_LARGE_FILE_BYTES")]
    large_file_bytes: Option<u64>,

    /// Retries per chunk before the download is abandoned
    #[arg(short, long, env = "RANGEGET_RETRIES")]
    retries: Option<u32>,

    /// Delay before a failed chunk is retried, in milliseconds
    #[arg(long, env = "RANGEGET_RETRY_BACKOFF_MS")]
    retry_backoff_ms: Option<u64>,

    /// Seconds allowed for establishing a connection
    #[arg(long, env = "RANGEGET_CONNECT_TIMEOUT_SECS")]
    connect_timeout_secs: Option<u64>,

    /// Seconds allowed for one whole request including its body (unlimited by default)
    #[arg(long, env = "RANGEGET_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// User-Agent header sent with every request
    #[arg(long, env = "RANGEGET_USER_AGENT")]
    user_agent: Option<String>,

    /// Verify the finished file, e.g. sha256:<hex>
    #[arg(long)]
    checksum: Option<ChecksumRequest>,

    /// Hide the progress bar
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn config(&self) -> DownloaderConfig {
        let mut config = DownloaderConfig::default();
        if let Some(workers) = self.workers {
            config.max_workers = workers;
        }
        if let Some(fanout) = self.fanout {
            config.fanout = fanout;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size_bytes = chunk_size;
        }
        if let Some(bytes) = self.small_file_bytes {
            config.very_small_file_bytes = bytes;
        }
        if let Some(bytes) = self.large_file_bytes {
            config.large_file_bytes = bytes;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if let Some(backoff) = self.retry_backoff_ms {
            config.retry_backoff_ms = backoff;
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout_secs = secs;
        }
        if self.request_timeout_secs.is_some() {
            config.request_timeout_secs = self.request_timeout_secs;
        }
        if let Some(user_agent) = &self.user_agent {
            config.user_agent = user_agent.clone();
        }
        config
    }
}

struct BarSink {
    bar: ProgressBar,
}

impl ProgressSink for BarSink {
    fn on_progress(&self, completed: u64, total: u64) {
        if self.bar.length() != Some(total) {
            self.bar.set_length(total);
        }
        self.bar.set_position(completed);
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn progress_bar(quiet: bool, name: &str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar.set_message(name.to_string());
    bar.enable_steady_tick(Duration::from_millis(200));
    bar
}

fn run(args: Args) -> Result<PathBuf> {
    let dest = args
        .output
        .clone()
        .unwrap_or_else(|| output_path(&args.url, ""));
    let name = dest
        .file_name()
        .map(|value| value.to_string_lossy().to_string())
        .unwrap_or_else(|| dest.display().to_string());

    let bar = progress_bar(args.quiet, &name);
    let mut downloader = Downloader::new(args.config())
        .context("invalid configuration")?
        .with_progress(Arc::new(BarSink { bar: bar.clone() }));
    if let Some(checksum) = args.checksum.clone() {
        downloader = downloader.with_checksum(checksum);
    }

    let cancel = downloader.cancel_handle();
    ctrlc::set_handler(move || cancel.cancel()).context("failed to install Ctrl-C handler")?;

    let result = downloader.download_to(&args.url, &dest);
    match &result {
        Ok(_) => bar.finish_with_message(format!("{} done", name)),
        Err(_) => bar.abandon_with_message(format!("{} failed", name)),
    }
    let report = result.with_context(|| format!("downloading {}", args.url))?;
    info!(
        strategy = %report.strategy,
        chunks = report.chunks,
        bytes = report.bytes_written,
        "saved {}",
        report.path.display()
    );
    Ok(report.path)
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(path) => {
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {:#}", err);
            if matches!(err.downcast_ref::<CoreError>(), Some(CoreError::Canceled)) {
                ExitCode::from(130)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
