use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("resource unreachable: {url} returned status {status}")]
    UnreachableResource { url: String, status: u16 },
    #[error("server did not report a content length for {0}")]
    MissingLength(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("range {begin}-{end}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        begin: u64,
        end: u64,
        expected: u64,
        actual: u64,
    },
    #[error("range {begin}-{end} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        begin: u64,
        end: u64,
        attempts: u32,
        last_error: String,
    },
    #[error("write error: {0}")]
    Write(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("download canceled")]
    Canceled,
}

impl CoreError {
    /// Errors a chunk fetch may recover from by trying again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Transport(_) | CoreError::LengthMismatch { .. }
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
