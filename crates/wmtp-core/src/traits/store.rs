//! Persistent key-value store contract

use crate::error::StoreError;

/// Small string store used to keep the session record across runs
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `Ok(None)` when the key is absent
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write or replace a value
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value; deleting a missing key is not an error
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}
