use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

pub const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    pub max_workers: usize,
    pub fanout: u64,
    pub chunk_size_bytes: u64,
    pub very_small_file_bytes: u64,
    pub large_file_bytes: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub connect_timeout_secs: u64,
    /// Whole-request limit including the body. `None` lets a transfer run as
    /// long as the connection stays alive.
    pub request_timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            fanout: 10,
            chunk_size_bytes: MIB,
            very_small_file_bytes: 5 * MIB,
            large_file_bytes: 10 * MIB,
            max_retries: 3,
            retry_backoff_ms: 500,
            connect_timeout_secs: 30,
            request_timeout_secs: None,
            user_agent: concat!("rangeget/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl DownloaderConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_workers == 0 {
            return Err(CoreError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.fanout == 0 {
            return Err(CoreError::InvalidConfig(
                "fanout must be at least 1".to_string(),
            ));
        }
        if self.chunk_size_bytes == 0 {
            return Err(CoreError::InvalidConfig(
                "chunk_size_bytes must be positive".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 || self.request_timeout_secs == Some(0) {
            return Err(CoreError::InvalidConfig(
                "timeouts must be at least one second".to_string(),
            ));
        }
        if self.large_file_bytes < self.very_small_file_bytes {
            return Err(CoreError::InvalidConfig(format!(
                "large_file_bytes ({}) is below very_small_file_bytes ({})",
                self.large_file_bytes, self.very_small_file_bytes
            )));
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
