#![forbid(unsafe_code)]

//! A Persistence Store that fails on demand.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use qflow_runtime::{PersistenceStore, StorageError, StorageResult};

/// Store whose reads and writes fail while the matching switch is on.
///
/// Reads return `initial` when they succeed; writes are counted either way.
#[derive(Debug, Default)]
pub struct FailingStore {
    initial: Option<Vec<u8>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    attempts: AtomicU64,
}

impl FailingStore {
    /// A store where every read and write fails.
    #[must_use]
    pub fn broken() -> Self {
        Self {
            initial: None,
            fail_reads: AtomicBool::new(true),
            fail_writes: AtomicBool::new(true),
            attempts: AtomicU64::new(0),
        }
    }

    /// A store that reads `bytes` and fails every write.
    #[must_use]
    pub fn read_only(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            initial: Some(bytes.into()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(true),
            attempts: AtomicU64::new(0),
        }
    }

    /// Toggle write failures.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Write attempts so far.
    #[must_use]
    pub fn write_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl PersistenceStore for FailingStore {
    fn name(&self) -> &str {
        "FailingStore"
    }

    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(StorageError::Io(std::io::Error::other("read refused")));
        }
        Ok(self.initial.clone())
    }

    fn save(&self, _bytes: &[u8]) -> StorageResult<()> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StorageError::Unavailable("write refused".into()));
        }
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        Ok(())
    }
}
