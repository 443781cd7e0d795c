#![forbid(unsafe_code)]

//! Persistence Store backends for answer records.
//!
//! A store holds one opaque blob: the serialized answer collection. Encoding
//! and tolerant decoding live in [`AnswerStore`](crate::AnswerStore); a store
//! only moves bytes.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `StorageError::Io` | File I/O failure | Logged, flow continues without persistence |
//! | `StorageError::Serialization` | JSON encode failure | Logged, write skipped |
//! | `StorageError::Corruption` | Stored blob is not JSON | Logged, flow starts empty |
//! | `StorageError::Unavailable` | Backend cannot be used | Logged, flow continues without persistence |
//!
//! Writes are never retried.
//!
//! # Feature Gates
//!
//! - `state-persistence`: Enables [`FileStore`]. Without it, only
//!   [`NullStore`] and [`MemoryStore`] are available.

use std::fmt;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from a Persistence Store.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error during file operations.
    Io(std::io::Error),
    /// Serialization or deserialization error.
    Serialization(String),
    /// Stored data is not in the expected format.
    Corruption(String),
    /// Backend is not available.
    Unavailable(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {e}"),
            StorageError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            StorageError::Corruption(msg) => write!(f, "storage corruption: {msg}"),
            StorageError::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            StorageError::Serialization(_)
            | StorageError::Corruption(_)
            | StorageError::Unavailable(_) => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// ─────────────────────────────────────────────────────────────────────────────
// Store Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Where answer records are persisted.
///
/// Implementations use interior mutability and must be `Send + Sync`.
pub trait PersistenceStore: Send + Sync {
    /// Human-readable backend name for logging.
    fn name(&self) -> &str;

    /// Load the stored blob. `Ok(None)` means nothing has been stored yet.
    fn load(&self) -> StorageResult<Option<Vec<u8>>>;

    /// Replace the stored blob.
    fn save(&self, bytes: &[u8]) -> StorageResult<()>;

    /// Remove the stored blob.
    fn clear(&self) -> StorageResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Null Store
// ─────────────────────────────────────────────────────────────────────────────

/// Store that keeps nothing. The default when no store is supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl PersistenceStore for NullStore {
    fn name(&self) -> &str {
        "NullStore"
    }

    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn save(&self, _bytes: &[u8]) -> StorageResult<()> {
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Store
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    bytes: RwLock<Option<Vec<u8>>>,
    saves: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `bytes`.
    #[must_use]
    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: RwLock::new(Some(bytes.into())),
            saves: AtomicU64::new(0),
        }
    }

    /// Number of successful `save` calls.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Current contents.
    #[must_use]
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.bytes.read().ok().and_then(|b| b.clone())
    }
}

impl PersistenceStore for MemoryStore {
    fn name(&self) -> &str {
        "MemoryStore"
    }

    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        let guard = self
            .bytes
            .read()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        Ok(guard.clone())
    }

    fn save(&self, bytes: &[u8]) -> StorageResult<()> {
        let mut guard = self
            .bytes
            .write()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        *guard = Some(bytes.to_vec());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        let mut guard = self
            .bytes
            .write()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        *guard = None;
        Ok(())
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.contents().map(|b| b.len());
        f.debug_struct("MemoryStore")
            .field("bytes", &len)
            .field("saves", &self.save_count())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Store (feature-gated)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "state-persistence")]
mod file_store {
    use super::*;
    use std::fs::{self, File};
    use std::io::{BufWriter, Write};
    use std::path::{Path, PathBuf};

    /// JSON file store.
    ///
    /// # Atomic Writes
    ///
    /// 1. Write to `{path}.tmp`
    /// 2. Flush and sync
    /// 3. Rename `{path}.tmp` -> `{path}`
    pub struct FileStore {
        path: PathBuf,
    }

    impl FileStore {
        /// Create a store at `path`. The file is created on first save.
        #[must_use]
        pub fn new(path: impl AsRef<Path>) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
            }
        }

        /// Store at `$XDG_STATE_HOME/qflow/{app_name}/answers.json`, falling
        /// back to `~/.local/state` and then the current directory.
        #[must_use]
        pub fn default_for_app(app_name: &str) -> Self {
            let base = state_dir();
            Self {
                path: base.join("qflow").join(app_name).join("answers.json"),
            }
        }

        /// File path.
        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }

        fn temp_path(&self) -> PathBuf {
            let mut tmp = self.path.clone();
            tmp.set_extension("json.tmp");
            tmp
        }
    }

    fn state_dir() -> PathBuf {
        if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(state_home);
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local").join("state");
        }
        PathBuf::from(".")
    }

    impl PersistenceStore for FileStore {
        fn name(&self) -> &str {
            "FileStore"
        }

        fn load(&self) -> StorageResult<Option<Vec<u8>>> {
            if !self.path.exists() {
                return Ok(None);
            }
            Ok(Some(fs::read(&self.path)?))
        }

        fn save(&self, bytes: &[u8]) -> StorageResult<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }

            let tmp_path = self.temp_path();
            {
                let file = File::create(&tmp_path)?;
                let mut writer = BufWriter::new(file);
                writer.write_all(bytes)?;
                writer.flush()?;
                writer.get_ref().sync_all()?;
            }
            fs::rename(&tmp_path, &self.path)?;

            tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "saved answers");
            Ok(())
        }

        fn clear(&self) -> StorageResult<()> {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            Ok(())
        }
    }

    impl fmt::Debug for FileStore {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("FileStore").field("path", &self.path).finish()
        }
    }
}

#[cfg(feature = "state-persistence")]
pub use file_store::FileStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_store_keeps_nothing() {
        let store = NullStore;
        store.save(b"[]").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn memory_store_round_trip_and_count() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(b"[1]").unwrap();
        store.save(b"[2]").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some(&b"[2]"[..]));
        assert_eq!(store.save_count(), 2);
        store.clear().unwrap();
        assert!(store.contents().is_none());
    }

    #[test]
    fn storage_error_display() {
        let io = StorageError::from(std::io::Error::other("disk gone"));
        assert!(io.to_string().contains("disk gone"));
        assert!(std::error::Error::source(&io).is_some());
        assert_eq!(
            StorageError::Corruption("bad".into()).to_string(),
            "storage corruption: bad"
        );
    }

    #[cfg(feature = "state-persistence")]
    mod file {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn missing_file_loads_none() {
            let tmp = TempDir::new().unwrap();
            let store = FileStore::new(tmp.path().join("absent.json"));
            assert!(store.load().unwrap().is_none());
        }

        #[test]
        fn save_creates_parent_dirs_and_leaves_no_temp() {
            let tmp = TempDir::new().unwrap();
            let path = tmp.path().join("nested").join("answers.json");
            let store = FileStore::new(&path);
            store.save(b"[]").unwrap();

            assert!(path.exists());
            assert!(!path.with_extension("json.tmp").exists());
            assert_eq!(store.load().unwrap().as_deref(), Some(&b"[]"[..]));

            store.clear().unwrap();
            assert!(!path.exists());
        }
    }
}
