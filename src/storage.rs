//! Best-effort key/value persistence for UI state (theme, history).
//!
//! Reads never fail: a missing key, corrupt document or absent backend yields the caller's
//! fallback. Writes never fail either; the in-memory value is always updated first and the
//! write-through error is only logged.

use directories::ProjectDirs;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use tracing::{debug, warn};

use crate::error::Error;

/// A synchronous string-keyed store.
pub trait Backend: Send + Sync {
  fn read(&self, key: &str) -> Result<Option<String>, Error>;
  fn write(&self, key: &str, value: &str) -> Result<(), Error>;
}

/// One JSON document per key inside a directory.
pub struct FileBackend {
  dir: PathBuf,
}

impl FileBackend {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  /// Backend rooted at the per-user data directory, if the platform has one.
  pub fn from_project_dirs() -> Option<Self> {
    ProjectDirs::from("", "", "uyatube").map(|dirs| Self::new(dirs.data_dir()))
  }

  fn path(&self, key: &str) -> PathBuf {
    self.dir.join(format!("{}.json", key))
  }
}

impl Backend for FileBackend {
  fn read(&self, key: &str) -> Result<Option<String>, Error> {
    match std::fs::read_to_string(self.path(key)) {
      Ok(content) => Ok(Some(content)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(Error::StorageUnavailable(e.to_string())),
    }
  }

  fn write(&self, key: &str, value: &str) -> Result<(), Error> {
    std::fs::create_dir_all(&self.dir).map_err(|e| Error::StorageUnavailable(e.to_string()))?;
    std::fs::write(self.path(key), value).map_err(|e| Error::StorageUnavailable(e.to_string()))
  }
}

/// Process-local backend, used when no data directory can be resolved.
#[derive(Default)]
pub struct MemoryBackend {
  items: StdMutex<HashMap<String, String>>,
}

impl Backend for MemoryBackend {
  fn read(&self, key: &str) -> Result<Option<String>, Error> {
    let items = self.items.lock().map_err(|_| Error::StorageUnavailable("memory store poisoned".into()))?;
    Ok(items.get(key).cloned())
  }

  fn write(&self, key: &str, value: &str) -> Result<(), Error> {
    let mut items = self.items.lock().map_err(|_| Error::StorageUnavailable("memory store poisoned".into()))?;
    items.insert(key.to_string(), value.to_string());
    Ok(())
  }
}

/// Typed access over an optional backend.
#[derive(Clone, Default)]
pub struct Store {
  backend: Option<Arc<dyn Backend>>,
}

impl Store {
  pub fn new(backend: impl Backend + 'static) -> Self {
    Self { backend: Some(Arc::new(backend)) }
  }

  /// A store with nothing behind it; every read returns the fallback.
  pub fn detached() -> Self {
    Self { backend: None }
  }

  pub fn get<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
    let Some(backend) = &self.backend else { return fallback };
    match backend.read(key) {
      Ok(Some(raw)) => match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
          warn!(key, err = %e, "storage: corrupt value, using fallback");
          fallback
        }
      },
      Ok(None) => fallback,
      Err(e) => {
        warn!(key, err = %e, "storage: read failed, using fallback");
        fallback
      }
    }
  }

  pub fn set<T: Serialize>(&self, key: &str, value: &T) {
    let Some(backend) = &self.backend else { return };
    let raw = match serde_json::to_string(value) {
      Ok(raw) => raw,
      Err(e) => {
        warn!(key, err = %e, "storage: serialization failed");
        return;
      }
    };
    match backend.write(key, &raw) {
      Ok(()) => debug!(key, bytes = raw.len(), "storage: saved"),
      Err(e) => warn!(key, err = %e, "storage: write failed"),
    }
  }
}

/// A value loaded once from the store and written through on every change.
pub struct Persisted<T> {
  key: &'static str,
  value: T,
  store: Store,
}

impl<T: Serialize + DeserializeOwned> Persisted<T> {
  pub fn load(store: Store, key: &'static str, fallback: T) -> Self {
    let value = store.get(key, fallback);
    Self { key, value, store }
  }

  pub fn get(&self) -> &T {
    &self.value
  }

  pub fn set(&mut self, value: T) {
    self.value = value;
    self.store.set(self.key, &self.value);
  }

  pub fn update(&mut self, f: impl FnOnce(&mut T)) {
    f(&mut self.value);
    self.store.set(self.key, &self.value);
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  /// Backend that errors on every call.
  pub(crate) struct BrokenBackend;

  impl Backend for BrokenBackend {
    fn read(&self, _key: &str) -> Result<Option<String>, Error> {
      Err(Error::StorageUnavailable("disk on fire".into()))
    }
    fn write(&self, _key: &str, _value: &str) -> Result<(), Error> {
      Err(Error::StorageUnavailable("disk on fire".into()))
    }
  }

  #[test]
  fn missing_key_returns_fallback() {
    let store = Store::new(MemoryBackend::default());
    assert_eq!(store.get("theme", "dark".to_string()), "dark");
  }

  #[test]
  fn corrupt_value_returns_fallback() {
    let backend = MemoryBackend::default();
    backend.write("history", "{not json").unwrap();
    let store = Store::new(backend);
    let history: Vec<String> = store.get("history", Vec::new());
    assert!(history.is_empty());
  }

  #[test]
  fn detached_store_returns_fallback_and_ignores_writes() {
    let store = Store::detached();
    store.set("n", &3u32);
    assert_eq!(store.get("n", 7u32), 7);
  }

  #[test]
  fn broken_backend_never_escapes() {
    let store = Store::new(BrokenBackend);
    assert_eq!(store.get("n", 1u32), 1);

    let mut value = Persisted::load(store, "n", 1u32);
    value.set(2);
    assert_eq!(*value.get(), 2);
    value.update(|v| *v += 10);
    assert_eq!(*value.get(), 12);
  }

  #[test]
  fn persisted_writes_through() {
    let store = Store::new(MemoryBackend::default());
    let mut value = Persisted::load(store.clone(), "names", Vec::<String>::new());
    value.update(|v| v.push("a".into()));
    let reloaded: Vec<String> = store.get("names", Vec::new());
    assert_eq!(reloaded, vec!["a".to_string()]);
  }

  #[test]
  fn file_backend_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(FileBackend::new(dir.path().join("nested")));
    assert_eq!(store.get("theme", "dark".to_string()), "dark");
    store.set("theme", &"light");

    let reopened = Store::new(FileBackend::new(dir.path().join("nested")));
    assert_eq!(reopened.get("theme", "dark".to_string()), "light");
    assert!(dir.path().join("nested").join("theme.json").exists());
  }
}
