pub mod checksum;
pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod naming;
pub mod net;
pub mod plan;
pub mod pool;
pub mod probe;
pub mod progress;
pub mod writer;

#[cfg(test)]
mod tests;

pub use crate::chunk::{Chunk, ChunkStatus};
pub use crate::config::DownloaderConfig;
pub use crate::engine::{DownloadReport, Downloader};
pub use crate::error::{CoreError, CoreResult};
pub use crate::plan::{DownloadPlan, Strategy};
pub use crate::pool::CancelHandle;
pub use crate::probe::FileRange;
pub use crate::progress::ProgressSink;
