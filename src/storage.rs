use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;

/// String key/value backend the session lives in.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    /// Writes every entry or none of them.
    ///
    /// The default falls back to one `set` per entry and gives no such
    /// guarantee; backends that can batch should override it.
    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Removes every key, even when removing one of them fails. The first
    /// error is returned after all keys were attempted.
    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.remove(key) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut current = lock(&self.entries);
        for (key, value) in entries {
            current.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut current = lock(&self.entries);
        for key in keys {
            current.remove(*key);
        }
        Ok(())
    }
}

/// JSON object on disk, rewritten in full on every mutation.
///
/// Writes only reach memory once the file was replaced. Removals always
/// apply in memory, so a process that fails to persist a logout still
/// acts signed out. There is no coordination between processes sharing
/// the same file: the last writer wins.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = Self::read_entries(&path)?;

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn read_entries(path: &Path) -> Result<BTreeMap<String, String>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = fs::read_to_string(path)?;
        match serde_json::from_str(&contents) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable storage file {}: {}",
                    path.display(),
                    e
                );
                Ok(BTreeMap::new())
            }
        }
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(entries)?)?;
        fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_all(&[(key, value)])
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.remove_all(&[key])
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut current = lock(&self.entries);
        let mut updated = current.clone();
        for (key, value) in entries {
            updated.insert(key.to_string(), value.to_string());
        }

        self.persist(&updated)?;
        *current = updated;
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut current = lock(&self.entries);
        let before = current.len();
        for key in keys {
            current.remove(*key);
        }

        if current.len() != before {
            self.persist(&current)?;
        }
        Ok(())
    }
}
