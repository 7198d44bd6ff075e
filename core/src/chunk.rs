use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Active => "active",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inclusive `[begin, end]` byte interval of the remote resource.
///
/// Chunks are values: a dispatched chunk is never mutated, retries and
/// completion produce new chunks. `content` is empty until the chunk is
/// `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub index: u32,
    pub begin: u64,
    pub end: u64,
    pub status: ChunkStatus,
    pub retry_count: u32,
    #[serde(skip)]
    pub content: Bytes,
}

impl Chunk {
    pub fn new(index: u32, begin: u64, end: u64) -> Self {
        Self {
            index,
            begin,
            end,
            status: ChunkStatus::Pending,
            retry_count: 0,
            content: Bytes::new(),
        }
    }

    pub fn size(&self) -> u64 {
        if self.end >= self.begin {
            self.end - self.begin + 1
        } else {
            0
        }
    }

    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.begin, self.end)
    }

    pub fn activated(&self) -> Self {
        Self {
            status: ChunkStatus::Active,
            content: Bytes::new(),
            ..self.clone()
        }
    }

    pub fn completed(&self, content: Bytes) -> Self {
        Self {
            status: ChunkStatus::Completed,
            content,
            ..self.clone()
        }
    }

    /// The pending chunk to enqueue after a failed attempt.
    pub fn retried(&self) -> Self {
        Self {
            status: ChunkStatus::Pending,
            retry_count: self.retry_count + 1,
            content: Bytes::new(),
            ..self.clone()
        }
    }

    pub fn failed(&self) -> Self {
        Self {
            status: ChunkStatus::Failed,
            content: Bytes::new(),
            ..self.clone()
        }
    }
}
