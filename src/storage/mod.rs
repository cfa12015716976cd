//! Session-scoped key/value storage.
//!
//! Holds state that must survive a reload within one session but is never
//! synced anywhere. The store only ever writes the current holder record.

mod json_file;
mod memory;

pub use json_file::JsonFileSessionStorage;
pub use memory::MemorySessionStorage;

use anyhow::Result;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageKeyError {
    #[error("storage key is empty")]
    Empty,
    #[error("Invalid storage key path segment: {0:?}")]
    NotPathSafe(String),
}

/// Reject keys that cannot be used as a single file name.
pub fn validate_key(key: &str) -> Result<(), StorageKeyError> {
    if key.is_empty() {
        return Err(StorageKeyError::Empty);
    }
    if key == "." || key == ".." || key.chars().any(|c| c == '/' || c == '\\' || c == '\0') {
        return Err(StorageKeyError::NotPathSafe(key.to_string()));
    }
    Ok(())
}

/// Synchronous string storage keyed by name. Values are opaque (JSON text in practice).
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}
