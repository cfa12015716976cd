use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{validate_key, SessionStorage};

/// File-backed session storage: one `<key>.json` file per key.
///
/// ```text
/// sessions/
///   lethex_holder.json
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileSessionStorage {
    dir: PathBuf,
}

impl JsonFileSessionStorage {
    /// Uses `~/.cache/lethex/sessions/` by default.
    pub fn new() -> Result<Self> {
        let dir = dirs::cache_dir()
            .context("Could not find cache directory")?
            .join("lethex")
            .join("sessions");
        Self::with_path(dir)
    }

    pub fn with_path(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create session dir: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_file(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl SessionStorage for JsonFileSessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_file(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        Ok(Some(content))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.entry_file(key)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .with_context(|| format!("Failed to write session file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace session file: {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.entry_file(key)?;
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete session file: {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_one_file_per_key() -> Result<()> {
        let dir = TempDir::new()?;
        let storage = JsonFileSessionStorage::with_path(dir.path().join("sessions"))?;

        storage.set("lethex_holder", r#"{"id":"h1","name":"Aziz"}"#)?;
        assert!(dir.path().join("sessions/lethex_holder.json").exists());
        assert_eq!(
            storage.get("lethex_holder")?.as_deref(),
            Some(r#"{"id":"h1","name":"Aziz"}"#)
        );

        storage.remove("lethex_holder")?;
        assert_eq!(storage.get("lethex_holder")?, None);
        Ok(())
    }

    #[test]
    fn traversal_keys_are_rejected() -> Result<()> {
        let dir = TempDir::new()?;
        let storage = JsonFileSessionStorage::with_path(dir.path())?;

        let err = storage.set("../escape", "{}").unwrap_err();
        assert!(err.to_string().contains("Invalid storage key path segment"));
        assert!(!dir.path().parent().unwrap().join("escape.json").exists());
        Ok(())
    }
}
