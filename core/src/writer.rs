use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::chunk::{Chunk, ChunkStatus};
use crate::error::{CoreError, CoreResult};
use crate::progress::ProgressCounter;

/// Sole owner of the output file while a download runs.
///
/// `submit` may be called from any thread. The mutex only guards the file
/// cursor; chunk ranges never overlap, so writes never race logically.
pub struct FileWriter {
    path: PathBuf,
    file: Mutex<File>,
    content_length: u64,
    progress: Arc<ProgressCounter>,
    chunks_written: AtomicUsize,
}

impl FileWriter {
    /// Creates (or truncates) `path` and extends it to `content_length` bytes so
    /// out-of-order seeks never grow the file mid-download.
    pub fn create(
        path: impl AsRef<Path>,
        content_length: u64,
        progress: Arc<ProgressCounter>,
    ) -> CoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| CoreError::Io(err.to_string()))?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|err| CoreError::Io(err.to_string()))?;
        file.set_len(content_length)
            .map_err(|err| CoreError::Io(err.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            content_length,
            progress,
            chunks_written: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn submit(&self, chunk: Chunk) -> CoreResult<()> {
        if chunk.status != ChunkStatus::Completed {
            return Err(CoreError::Write(format!(
                "chunk {} submitted in state {}",
                chunk.index, chunk.status
            )));
        }
        let len = chunk.content.len() as u64;
        if len != chunk.size() || chunk.end >= self.content_length {
            return Err(CoreError::Write(format!(
                "chunk {} ({}-{}) carries {} bytes and does not fit a {} byte file",
                chunk.index, chunk.begin, chunk.end, len, self.content_length
            )));
        }

        {
            let mut file = self
                .file
                .lock()
                .map_err(|_| CoreError::Write("file lock poisoned".to_string()))?;
            file.seek(SeekFrom::Start(chunk.begin))
                .map_err(|err| CoreError::Write(err.to_string()))?;
            file.write_all(&chunk.content)
                .map_err(|err| CoreError::Write(err.to_string()))?;
        }

        self.progress.add(len);
        self.chunks_written.fetch_add(1, Ordering::SeqCst);
        debug!(index = chunk.index, begin = chunk.begin, end = chunk.end, "chunk written");
        Ok(())
    }

    pub fn chunks_written(&self) -> usize {
        self.chunks_written.load(Ordering::SeqCst)
    }

    pub fn bytes_written(&self) -> u64 {
        self.progress.completed()
    }

    /// Flushes and syncs the file, returning the number of bytes written.
    pub fn finish(self) -> CoreResult<u64> {
        let mut file = self
            .file
            .into_inner()
            .map_err(|_| CoreError::Write("file lock poisoned".to_string()))?;
        file.flush().map_err(|err| CoreError::Write(err.to_string()))?;
        file.sync_all()
            .map_err(|err| CoreError::Write(err.to_string()))?;
        Ok(self.progress.completed())
    }
}
