//! File-backed key-value store.
//!
//! Each slot is one file named after its key inside the data directory.
//! Writes go to a temporary sibling first and are renamed into place.

use quote_core::store::{KeyValueStore, Result, StoreError};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Native key-value store for the daemon
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `base_path`. The directory is created on first write.
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.slot_path(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(format!("{}: {}", path.display(), e))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.slot_path(key)?;
        fs::create_dir_all(&self.base_path).map_err(|e| StoreError::Io(e.to_string()))?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value).map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::Io(e.to_string()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.slot_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote_core::store::{FILTER_KEY, QUOTES_KEY};
    use tempfile::TempDir;

    #[test]
    fn test_missing_slot_reads_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("data"));

        assert_eq!(store.get(QUOTES_KEY).unwrap(), None);
    }

    #[test]
    fn test_set_creates_directory_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir = temp_dir.path().join("nested/data");

        {
            let store = FileStore::new(data_dir.clone());
            store.set(QUOTES_KEY, "[]").unwrap();
            store.set(FILTER_KEY, "Humor").unwrap();
        }

        // A second store over the same directory sees the slots
        let store = FileStore::new(data_dir.clone());
        assert_eq!(store.get(QUOTES_KEY).unwrap().as_deref(), Some("[]"));
        assert_eq!(store.get(FILTER_KEY).unwrap().as_deref(), Some("Humor"));
        assert!(!data_dir.join("quotes.tmp").exists());
    }

    #[test]
    fn test_remove_slot() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().to_path_buf());
        store.set(QUOTES_KEY, "[]").unwrap();

        store.remove(QUOTES_KEY).unwrap();
        store.remove(QUOTES_KEY).unwrap();

        assert_eq!(store.get(QUOTES_KEY).unwrap(), None);
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().to_path_buf());

        assert!(matches!(
            store.set("../escape", "x"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(store.get(""), Err(StoreError::InvalidKey(_))));
    }
}
