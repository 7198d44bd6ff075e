use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chunk::Chunk;
use crate::config::DownloaderConfig;
use crate::error::{CoreError, CoreResult};
use crate::probe::FileRange;

/// Chunk indices are `u32`.
const MAX_CHUNKS: u64 = u32::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    Single,
    FixedFanout { fanout: u64 },
    FixedChunkSize { chunk_size: u64 },
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Single => f.write_str("single"),
            Strategy::FixedFanout { fanout } => write!(f, "fanout({})", fanout),
            Strategy::FixedChunkSize { chunk_size } => write!(f, "chunk-size({})", chunk_size),
        }
    }
}

pub fn choose_strategy(range: &FileRange, config: &DownloaderConfig) -> Strategy {
    let len = range.content_length;
    if !range.supports_range || len < config.very_small_file_bytes {
        Strategy::Single
    } else if len < config.large_file_bytes {
        Strategy::FixedFanout {
            fanout: config.fanout,
        }
    } else {
        Strategy::FixedChunkSize {
            chunk_size: config.chunk_size_bytes,
        }
    }
}

/// Ordered chunks covering `[0, content_length - 1]` exactly once.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    range: FileRange,
    strategy: Strategy,
    chunks: Vec<Chunk>,
}

impl DownloadPlan {
    pub fn range(&self) -> &FileRange {
        &self.range
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.chunks.iter().map(Chunk::size).sum()
    }
}

pub fn plan(range: &FileRange, strategy: Strategy) -> CoreResult<DownloadPlan> {
    match strategy {
        Strategy::FixedFanout { fanout: 0 } => {
            return Err(CoreError::InvalidConfig("fanout must be at least 1".to_string()))
        }
        Strategy::FixedChunkSize { chunk_size: 0 } => {
            return Err(CoreError::InvalidConfig(
                "chunk size must be positive".to_string(),
            ))
        }
        _ => {}
    }

    let total = range.content_length;
    let max_chunks = match strategy {
        Strategy::Single => 1,
        Strategy::FixedFanout { fanout } => fanout.saturating_add(1),
        Strategy::FixedChunkSize { chunk_size } => total.div_ceil(chunk_size),
    };
    if max_chunks > MAX_CHUNKS {
        return Err(CoreError::InvalidConfig(format!(
            "{} splits {} bytes into more than {} chunks",
            strategy, total, MAX_CHUNKS
        )));
    }

    let chunks = if total == 0 {
        Vec::new()
    } else if !range.supports_range {
        single(total)
    } else {
        match strategy {
            Strategy::Single => single(total),
            Strategy::FixedFanout { fanout } => fanout_chunks(total, fanout),
            Strategy::FixedChunkSize { chunk_size } => sized_chunks(total, chunk_size),
        }
    };

    Ok(DownloadPlan {
        range: *range,
        strategy,
        chunks,
    })
}

fn single(total: u64) -> Vec<Chunk> {
    vec![Chunk::new(0, 0, total - 1)]
}

fn fanout_chunks(total: u64, fanout: u64) -> Vec<Chunk> {
    let part = total / fanout;
    if part == 0 {
        return single(total);
    }

    let mut chunks = Vec::with_capacity(fanout as usize + 1);
    for index in 0..fanout {
        let begin = index * part;
        chunks.push(Chunk::new(index as u32, begin, begin + part - 1));
    }
    // remainder left by the integer division
    let tail = fanout * part;
    if tail < total {
        chunks.push(Chunk::new(fanout as u32, tail, total - 1));
    }
    chunks
}

fn sized_chunks(total: u64, chunk_size: u64) -> Vec<Chunk> {
    let count = total.div_ceil(chunk_size);
    let mut chunks = Vec::with_capacity(count as usize);
    let mut begin = 0u64;
    let mut index = 0u32;
    while begin < total {
        let end = begin.saturating_add(chunk_size - 1).min(total - 1);
        chunks.push(Chunk::new(index, begin, end));
        begin = end + 1;
        index += 1;
    }
    chunks
}
