//! Durable storage for the single active session identifier.
//!
//! Only the id is persisted; session attributes live in memory with the controller. Absence of
//! a stored value means no session.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Well-known key under which the active session id is stored.
pub const SESSION_STORAGE_KEY: &str = "resumelens_session_id";

/// Errors raised by session storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("Failed to access session storage at {path}: {source}")]
    Io {
        /// File that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Get/set/clear capability for the persisted session id.
pub trait SessionStorage: Send + Sync {
    /// Return the stored session id, if any.
    fn get_session_id(&self) -> Result<Option<String>, StorageError>;
    /// Persist `session_id`, replacing any previous value.
    fn set_session_id(&self, session_id: &str) -> Result<(), StorageError>;
    /// Remove the stored session id. Clearing an empty store succeeds.
    fn clear_session_id(&self) -> Result<(), StorageError>;
}

/// Stores the session id in a single file named [`SESSION_STORAGE_KEY`] inside a directory.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    /// Use `dir` as the storage directory. The directory is created on first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SESSION_STORAGE_KEY),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SessionStorage for FileSessionStorage {
    fn get_session_id(&self) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let trimmed = contents.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(trimmed.to_string()))
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self.io_error(err)),
        }
    }

    fn set_session_id(&self, session_id: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        std::fs::write(&self.path, session_id).map_err(|err| self.io_error(err))
    }

    fn clear_session_id(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

/// Process-local storage, useful for tests and embedders without a filesystem.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    value: Mutex<Option<String>>,
}

impl MemorySessionStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `session_id`.
    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(session_id.into())),
        }
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get_session_id(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set_session_id(&self, session_id: &str) -> Result<(), StorageError> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(session_id.to_string());
        Ok(())
    }

    fn clear_session_id(&self) -> Result<(), StorageError> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("resumelens-storage-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn file_storage_round_trips_and_clears() {
        let dir = scratch_dir();
        let storage = FileSessionStorage::new(&dir);
        assert_eq!(storage.get_session_id().unwrap(), None);

        storage.set_session_id("session-1").unwrap();
        assert_eq!(storage.get_session_id().unwrap().as_deref(), Some("session-1"));
        assert!(storage.path().ends_with(SESSION_STORAGE_KEY));

        storage.set_session_id("session-2").unwrap();
        assert_eq!(storage.get_session_id().unwrap().as_deref(), Some("session-2"));

        storage.clear_session_id().unwrap();
        assert_eq!(storage.get_session_id().unwrap(), None);
        storage.clear_session_id().expect("clearing twice is fine");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn file_storage_treats_blank_file_as_absent() {
        let dir = scratch_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(SESSION_STORAGE_KEY), "  \n").unwrap();
        let storage = FileSessionStorage::new(&dir);
        assert_eq!(storage.get_session_id().unwrap(), None);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn memory_storage_starts_with_seed() {
        let storage = MemorySessionStorage::with_session_id("seeded");
        assert_eq!(storage.get_session_id().unwrap().as_deref(), Some("seeded"));
        storage.clear_session_id().unwrap();
        assert_eq!(storage.get_session_id().unwrap(), None);
    }
}
