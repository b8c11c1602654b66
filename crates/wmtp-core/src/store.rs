//! Session persistence
//!
//! The session record is kept as JSON under [`SESSION_KEY`] in any
//! [`KeyValueStore`]. [`FileStore`] keeps one file per key in a directory;
//! [`MemoryStore`] is for tests and short-lived processes.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::session::{SavedSession, Session};
use crate::traits::KeyValueStore;

/// Key the session record is stored under
pub const SESSION_KEY: &str = "wmtp_session";

/// Persist the session if it holds a token. Returns whether a write happened.
pub fn save_session(store: &dyn KeyValueStore, session: &Session) -> Result<bool, StoreError> {
    let Some(record) = session.to_saved() else {
        return Ok(false);
    };
    let json = serde_json::to_string(&record)?;
    store.set(SESSION_KEY, &json)?;
    debug!("Saved session");
    Ok(true)
}

/// Read the saved session
///
/// Absent, unreadable and malformed records all count as "no saved
/// session".
pub fn load_session(store: &dyn KeyValueStore) -> Option<SavedSession> {
    let json = match store.get(SESSION_KEY) {
        Ok(Some(json)) => json,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to read saved session: {}", e);
            return None;
        }
    };

    match serde_json::from_str::<SavedSession>(&json) {
        Ok(record) if !record.token.is_empty() => Some(record),
        Ok(_) => {
            debug!("Ignoring saved session with empty token");
            None
        }
        Err(e) => {
            debug!("Ignoring malformed saved session: {}", e);
            None
        }
    }
}

/// Delete the saved session unconditionally
pub fn clear_session(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store.delete(SESSION_KEY)
}

/// Directory-backed store: each key is `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Write then rename
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .values
            .lock()
            .ok()
            .and_then(|values| values.get(key).cloned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
        Ok(())
    }
}
