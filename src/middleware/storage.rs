use crate::error::PersistError;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Key-value backend used by [`persist`](super::persist).
///
/// Values are opaque strings; the decorator owns the encoding.
pub trait StateStorage: Send + Sync {
    /// Read the value stored under `name`, if any.
    fn get_item(&self, name: &str) -> Result<Option<String>, PersistError>;

    /// Store `value` under `name`, overwriting any previous value.
    fn set_item(&self, name: &str, value: &str) -> Result<(), PersistError>;

    /// Delete the value stored under `name`. Missing keys are not an error.
    fn remove_item(&self, name: &str) -> Result<(), PersistError>;
}

/// In-process storage. Contents live as long as the value does.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStorage for MemoryStorage {
    fn get_item(&self, name: &str) -> Result<Option<String>, PersistError> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(name).cloned())
    }

    fn set_item(&self, name: &str, value: &str) -> Result<(), PersistError> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, name: &str) -> Result<(), PersistError> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.remove(name);
        Ok(())
    }
}

/// Storage backed by a directory, one `<name>.json` file per key.
///
/// Writes go to a temporary file that is renamed into place, so a reader
/// never sees a partially written value.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Store files under `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> Result<PathBuf, PersistError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(PersistError::InvalidKey(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

impl StateStorage for FileStorage {
    fn get_item(&self, name: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.path(name)?) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, name: &str, value: &str) -> Result<(), PersistError> {
        let path = self.path(name)?;
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove_item(&self, name: &str) -> Result<(), PersistError> {
        match fs::remove_file(self.path(name)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
