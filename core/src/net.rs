use bytes::Bytes;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, RANGE};

use crate::config::DownloaderConfig;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub range: Option<(u64, u64)>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            range: None,
        }
    }

    pub fn with_range(mut self, begin: u64, end: u64) -> Self {
        self.range = Some((begin, end));
        self
    }
}

/// Header-level view of a HEAD response.
#[derive(Debug, Clone, Default)]
pub struct HeadResponse {
    pub status_code: u16,
    pub content_length: Option<u64>,
    /// Raw `Accept-Ranges` value, `None` when the header is absent.
    pub accept_ranges: Option<String>,
}

impl HeadResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

pub trait NetClient: Send + Sync {
    fn head(&self, req: &DownloadRequest) -> CoreResult<HeadResponse>;
    /// Fetches the whole body. Non-success statuses are transport errors.
    fn get(&self, req: &DownloadRequest) -> CoreResult<Bytes>;
}

#[derive(Clone)]
pub struct ReqwestNetClient {
    client: Client,
}

impl ReqwestNetClient {
    pub fn new(config: &DownloaderConfig) -> CoreResult<Self> {
        // the blocking client defaults to a 30 s limit on the whole transfer
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| CoreError::Transport(err.to_string()))?;
        Ok(Self { client })
    }

    fn request_headers(&self, req: &DownloadRequest) -> CoreResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some((begin, end)) = req.range {
            let value = format!("bytes={}-{}", begin, end);
            headers.insert(
                RANGE,
                HeaderValue::from_str(&value)
                    .map_err(|err| CoreError::Transport(err.to_string()))?,
            );
        }
        Ok(headers)
    }
}

impl NetClient for ReqwestNetClient {
    fn head(&self, req: &DownloadRequest) -> CoreResult<HeadResponse> {
        let resp = self
            .client
            .head(&req.url)
            .headers(self.request_headers(req)?)
            .send()
            .map_err(|err| CoreError::Transport(err.to_string()))?;
        let headers = resp.headers();
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let accept_ranges = headers
            .get(ACCEPT_RANGES)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string());

        Ok(HeadResponse {
            status_code: resp.status().as_u16(),
            content_length,
            accept_ranges,
        })
    }

    fn get(&self, req: &DownloadRequest) -> CoreResult<Bytes> {
        let resp = self
            .client
            .get(&req.url)
            .headers(self.request_headers(req)?)
            .send()
            .map_err(|err| CoreError::Transport(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::Transport(format!(
                "download failed with status {}",
                status.as_u16()
            )));
        }
        resp.bytes()
            .map_err(|err| CoreError::Transport(err.to_string()))
    }
}
