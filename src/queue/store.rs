//! Backing stores for the durable queue
//!
//! The on-disk format is one payload per line, newline-delimited.

use crate::queue::error::{QueueError, QueueResult};
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stable storage for pending payloads
pub trait QueueStore {
    /// Read back everything saved last time; an absent store is empty
    fn load(&self) -> QueueResult<Vec<Bytes>>;

    /// Replace the stored contents with `entries`
    fn save(&self, entries: &[Bytes]) -> QueueResult<()>;
}

/// Newline-delimited text file, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "queue".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl QueueStore for FileQueueStore {
    fn load(&self) -> QueueResult<Vec<Bytes>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let text = String::from_utf8(raw)
            .map_err(|e| QueueError::CorruptStore(format!("{}: {}", self.path.display(), e)))?;

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| Bytes::copy_from_slice(line.as_bytes()))
            .collect())
    }

    fn save(&self, entries: &[Bytes]) -> QueueResult<()> {
        let tmp = self.temp_path();

        {
            let mut file = fs::File::create(&tmp)?;
            for entry in entries {
                file.write_all(entry)?;
                file.write_all(b"\n")?;
            }
            file.sync_all()?;
        }

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory store; clones share contents
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueStore {
    entries: Arc<Mutex<Vec<Bytes>>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<Bytes>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    /// Snapshot of what was last saved
    pub fn saved(&self) -> Vec<Bytes> {
        self.entries.lock().clone()
    }
}

impl QueueStore for MemoryQueueStore {
    fn load(&self) -> QueueResult<Vec<Bytes>> {
        Ok(self.entries.lock().clone())
    }

    fn save(&self, entries: &[Bytes]) -> QueueResult<()> {
        *self.entries.lock() = entries.to_vec();
        Ok(())
    }
}
