use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::checksum::{ChecksumRequest, ChecksumType};
use crate::config::DownloaderConfig;
use crate::engine::Downloader;
use crate::error::{CoreError, CoreResult};
use crate::net::{DownloadRequest, HeadResponse, NetClient, ReqwestNetClient};
use crate::plan::Strategy;
use crate::probe::{probe, FileRange};
use crate::progress::ProgressSink;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

fn test_config() -> DownloaderConfig {
    DownloaderConfig {
        max_workers: 4,
        fanout: 5,
        chunk_size_bytes: 4096,
        very_small_file_bytes: 1024,
        large_file_bytes: 16 * 1024,
        max_retries: 2,
        retry_backoff_ms: 0,
        ..DownloaderConfig::default()
    }
}

/// In-memory origin serving `data`, optionally ignoring ranges or failing GETs.
struct MemoryOrigin {
    data: Vec<u8>,
    status: u16,
    accept_ranges: Option<&'static str>,
    honor_ranges: bool,
    failing_gets: AtomicUsize,
    truncate_gets: bool,
    gets: AtomicUsize,
}

impl MemoryOrigin {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            status: 200,
            accept_ranges: Some("bytes"),
            honor_ranges: true,
            failing_gets: AtomicUsize::new(0),
            truncate_gets: false,
            gets: AtomicUsize::new(0),
        }
    }
}

impl NetClient for MemoryOrigin {
    fn head(&self, req: &DownloadRequest) -> CoreResult<HeadResponse> {
        let content_length = match req.range {
            Some((begin, end)) if self.honor_ranges => end - begin + 1,
            _ => self.data.len() as u64,
        };
        Ok(HeadResponse {
            status_code: self.status,
            content_length: Some(content_length),
            accept_ranges: self.accept_ranges.map(str::to_string),
        })
    }

    fn get(&self, req: &DownloadRequest) -> CoreResult<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failing_gets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CoreError::Transport("connection reset by peer".to_string()));
        }
        let body = match req.range {
            Some((begin, end)) if self.honor_ranges => {
                &self.data[begin as usize..=end as usize]
            }
            _ => &self.data[..],
        };
        if self.truncate_gets {
            return Ok(Bytes::copy_from_slice(&body[..body.len() / 2]));
        }
        Ok(Bytes::copy_from_slice(body))
    }
}

fn downloader(origin: MemoryOrigin, config: DownloaderConfig) -> Downloader {
    Downloader::new(config)
        .expect("downloader")
        .with_net_client(Box::new(origin))
}

#[test]
fn downloads_are_byte_identical_for_every_strategy() {
    let cases = [
        (512usize, Strategy::Single),
        (10_000, Strategy::FixedFanout { fanout: 5 }),
        (100_003, Strategy::FixedChunkSize { chunk_size: 4096 }),
    ];
    let dir = tempfile::tempdir().unwrap();
    for (len, expected_strategy) in cases {
        let data = payload(len);
        let dest = dir.path().join(format!("out-{}.bin", len));
        let report = downloader(MemoryOrigin::new(data.clone()), test_config())
            .download_to("http://origin/file.bin", &dest)
            .unwrap();

        assert_eq!(report.strategy, expected_strategy);
        assert_eq!(report.bytes_written, len as u64);
        assert_eq!(fs::metadata(&dest).unwrap().len(), len as u64);
        assert_eq!(fs::read(&dest).unwrap(), data);
    }
}

#[test]
fn server_without_ranges_gets_one_plain_get() {
    let data = payload(50_000);
    let mut origin = MemoryOrigin::new(data.clone());
    origin.accept_ranges = None;
    origin.honor_ranges = false;
    let origin = Arc::new(origin);

    struct Shared(Arc<MemoryOrigin>);
    impl NetClient for Shared {
        fn head(&self, req: &DownloadRequest) -> CoreResult<HeadResponse> {
            self.0.head(req)
        }
        fn get(&self, req: &DownloadRequest) -> CoreResult<Bytes> {
            assert!(req.range.is_none(), "range sent to a server without range support");
            self.0.get(req)
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("plain.bin");
    let report = Downloader::new(test_config())
        .unwrap()
        .with_net_client(Box::new(Shared(Arc::clone(&origin))))
        .download_to("http://origin/plain.bin", &dest)
        .unwrap();

    assert!(!report.range.supports_range);
    assert_eq!(report.chunks, 1);
    assert_eq!(origin.gets.load(Ordering::SeqCst), 1);
    assert_eq!(fs::read(&dest).unwrap(), data);
}

#[test]
fn transient_transport_errors_are_retried() {
    let data = payload(20_000);
    let origin = MemoryOrigin::new(data.clone());
    origin.failing_gets.store(2, Ordering::SeqCst);

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("flaky.bin");
    downloader(origin, test_config())
        .download_to("http://origin/flaky.bin", &dest)
        .unwrap();
    assert_eq!(fs::read(&dest).unwrap(), data);
}

#[test]
fn exhausted_retries_fail_and_leave_partial_file() {
    let mut origin = MemoryOrigin::new(payload(20_000));
    origin.truncate_gets = true;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("short.bin");
    let err = downloader(origin, test_config())
        .download_to("http://origin/short.bin", &dest)
        .unwrap_err();

    match err {
        CoreError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(fs::metadata(&dest).unwrap().len(), 20_000);
}

#[test]
fn unreachable_resource_creates_no_file() {
    let mut origin = MemoryOrigin::new(payload(10));
    origin.status = 404;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("missing.bin");
    let err = downloader(origin, test_config())
        .download_to("http://origin/missing.bin", &dest)
        .unwrap_err();
    assert!(matches!(err, CoreError::UnreachableResource { status: 404, .. }));
    assert!(!dest.exists());
}

#[test]
fn empty_resource_produces_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("empty.bin");
    let report = downloader(MemoryOrigin::new(Vec::new()), test_config())
        .download_to("http://origin/empty.bin", &dest)
        .unwrap();
    assert_eq!(report.chunks, 0);
    assert_eq!(fs::metadata(&dest).unwrap().len(), 0);
}

#[test]
fn progress_reaches_total_monotonically() {
    let data = payload(30_000);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let sink: Arc<dyn ProgressSink> = Arc::new(move |done: u64, total: u64| {
        record.lock().unwrap().push((done, total));
    });

    let dir = tempfile::tempdir().unwrap();
    downloader(MemoryOrigin::new(data), test_config())
        .with_progress(sink)
        .download_to("http://origin/file.bin", dir.path().join("p.bin"))
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 8);
    assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(*seen.last().unwrap(), (30_000, 30_000));
}

#[test]
fn checksum_mismatch_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let checksum = ChecksumRequest {
        checksum_type: ChecksumType::Sha256,
        expected_hex: "00".repeat(32),
    };
    let err = downloader(MemoryOrigin::new(payload(2048)), test_config())
        .with_checksum(checksum)
        .download_to("http://origin/file.bin", dir.path().join("c.bin"))
        .unwrap_err();
    assert!(matches!(err, CoreError::ChecksumMismatch { .. }));
}

#[test]
fn canceled_downloader_refuses_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let downloader = downloader(MemoryOrigin::new(payload(2048)), test_config());
    downloader.cancel_handle().cancel();
    let err = downloader
        .download_to("http://origin/file.bin", dir.path().join("x.bin"))
        .unwrap_err();
    assert!(matches!(err, CoreError::Canceled));
}

#[test]
fn invalid_config_is_rejected() {
    let config = DownloaderConfig {
        max_workers: 0,
        ..DownloaderConfig::default()
    };
    assert!(matches!(
        Downloader::new(config),
        Err(CoreError::InvalidConfig(_))
    ));
}

/// Serves `body` over HTTP, honoring single `bytes=a-b` ranges when asked to.
struct RangeResponder {
    body: Vec<u8>,
    honor_ranges: bool,
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let (begin, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((begin.parse().ok()?, end.parse().ok()?))
}

impl Respond for RangeResponder {
    fn respond(&self, req: &Request) -> ResponseTemplate {
        let range = req
            .headers
            .get("range")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_range)
            .filter(|_| self.honor_ranges);
        let (status, body): (u16, Vec<u8>) = match range {
            Some((begin, end)) => (206, self.body[begin..=end].to_vec()),
            None => (200, self.body.clone()),
        };
        let mut template = ResponseTemplate::new(status)
            .insert_header("Content-Length", body.len().to_string().as_str());
        if self.honor_ranges {
            template = template.insert_header("Accept-Ranges", "bytes");
        }
        template.set_body_bytes(body)
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn http_probe_reads_accept_ranges() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(RangeResponder {
            body: payload(1000),
            honor_ranges: true,
        })
        .mount(&server)
        .await;

    let url = format!("{}/file.bin", server.uri());
    let range = tokio::task::spawn_blocking(move || {
        let net = ReqwestNetClient::new(&test_config())?;
        probe(&net, &url)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(
        range,
        FileRange {
            supports_range: true,
            content_length: 1000
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn http_probe_detects_ignored_range() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(header("range", "bytes=0-10"))
        .respond_with(RangeResponder {
            body: payload(1000),
            honor_ranges: false,
        })
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .respond_with(RangeResponder {
            body: payload(1000),
            honor_ranges: false,
        })
        .mount(&server)
        .await;

    let url = format!("{}/file.bin", server.uri());
    let range = tokio::task::spawn_blocking(move || {
        let net = ReqwestNetClient::new(&test_config())?;
        probe(&net, &url)
    })
    .await
    .unwrap()
    .unwrap();

    assert!(!range.supports_range);
    assert_eq!(range.content_length, 1000);
}

#[tokio::test(flavor = "multi_thread")]
async fn http_download_end_to_end() {
    let data = payload(40_000);
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(RangeResponder {
            body: data.clone(),
            honor_ranges: true,
        })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(RangeResponder {
            body: data.clone(),
            honor_ranges: true,
        })
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("e2e.bin");
    let url = format!("{}/e2e.bin", server.uri());
    let target = dest.clone();
    let report = tokio::task::spawn_blocking(move || {
        Downloader::new(test_config())?.download_to(&url, &target)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(report.strategy, Strategy::FixedChunkSize { chunk_size: 4096 });
    assert_eq!(report.chunks, 10);
    assert_eq!(fs::read(&dest).unwrap(), data);
}

/// Mounts a server without range support whose GET answers after `delay`.
async fn slow_plain_server(data: &[u8], delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(RangeResponder {
            body: data.to_vec(),
            honor_ranges: false,
        })
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Length", data.len().to_string().as_str())
                .set_body_bytes(data.to_vec())
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_whole_file_get_is_not_cut_off_by_default() {
    let data = payload(2000);
    let server = slow_plain_server(&data, Duration::from_millis(2500)).await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("slow.bin");
    let url = format!("{}/slow.bin", server.uri());
    let target = dest.clone();
    let report = tokio::task::spawn_blocking(move || {
        let config = DownloaderConfig {
            max_retries: 0,
            ..test_config()
        };
        Downloader::new(config)?.download_to(&url, &target)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(report.strategy, Strategy::Single);
    assert_eq!(fs::read(&dest).unwrap(), data);
}

#[tokio::test(flavor = "multi_thread")]
async fn configured_request_timeout_fails_slow_get() {
    let data = payload(2000);
    let server = slow_plain_server(&data, Duration::from_millis(2500)).await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("{}/slow.bin", server.uri());
    let target = dir.path().join("slow.bin");
    let err = tokio::task::spawn_blocking(move || {
        let config = DownloaderConfig {
            max_retries: 0,
            request_timeout_secs: Some(1),
            ..test_config()
        };
        Downloader::new(config)?.download_to(&url, &target)
    })
    .await
    .unwrap()
    .unwrap_err();

    match err {
        CoreError::RetryExhausted { begin, end, attempts, .. } => {
            assert_eq!((begin, end, attempts), (0, 1999, 1));
        }
        other => panic!("unexpected error: {}", other),
    }
}
