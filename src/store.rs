//! Byte-oriented object storage for narration artifacts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::NarrationError;

pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// A key/value blob store. Keys are `/`-separated relative paths.
pub trait ObjectStore: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool, NarrationError>;

    fn read(&self, key: &str) -> Result<Vec<u8>, NarrationError>;

    fn write(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), NarrationError>;

    fn write_text(&self, key: &str, text: &str) -> Result<(), NarrationError> {
        self.write(key, text.as_bytes(), CONTENT_TYPE_TEXT)
    }

    fn read_text(&self, key: &str) -> Result<String, NarrationError> {
        Ok(String::from_utf8_lossy(&self.read(key)?).into_owned())
    }
}

/// Serialize `value` as pretty JSON under `key`.
pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn ObjectStore,
    key: &str,
    value: &T,
) -> Result<(), NarrationError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.write(key, &bytes, CONTENT_TYPE_JSON)
}

/// Read JSON from `key`, or `None` when the key does not exist.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    key: &str,
) -> Result<Option<T>, NarrationError> {
    if !store.exists(key)? {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&store.read(key)?)?))
}

/// Strip leading slashes, use `/` separators and refuse parent references.
pub fn clean_key(key: &str) -> Result<String, NarrationError> {
    let cleaned = key.replace('\\', "/");
    let cleaned = cleaned.trim_start_matches('/');
    if cleaned.is_empty() || cleaned.split('/').any(|part| part == "..") {
        return Err(NarrationError::InvalidKey(key.to_string()));
    }
    Ok(cleaned.to_string())
}

/// Stores objects as files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf, NarrationError> {
        Ok(self.root.join(clean_key(key)?))
    }
}

impl ObjectStore for LocalStore {
    fn exists(&self, key: &str) -> Result<bool, NarrationError> {
        Ok(self.path(key)?.exists())
    }

    fn read(&self, key: &str) -> Result<Vec<u8>, NarrationError> {
        let path = self.path(key)?;
        if !path.exists() {
            return Err(NarrationError::NotFound(key.to_string()));
        }
        Ok(std::fs::read(path)?)
    }

    fn write(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<(), NarrationError> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write beside the target and rename, so readers never see a torn file.
        let dir = path.parent().unwrap_or(self.root.as_path());
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, bytes)?;
        tmp.persist(&path).map_err(|e| NarrationError::Io(e.error))?;
        log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

/// An in-process store, keyed by cleaned key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type recorded for `key`, if present.
    pub fn content_type(&self, key: &str) -> Option<String> {
        let key = clean_key(key).ok()?;
        self.lock().get(&key).map(|(_, ct)| ct.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Vec<u8>, String)>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ObjectStore for MemoryStore {
    fn exists(&self, key: &str) -> Result<bool, NarrationError> {
        Ok(self.lock().contains_key(&clean_key(key)?))
    }

    fn read(&self, key: &str) -> Result<Vec<u8>, NarrationError> {
        self.lock()
            .get(&clean_key(key)?)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| NarrationError::NotFound(key.to_string()))
    }

    fn write(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), NarrationError> {
        self.lock()
            .insert(clean_key(key)?, (bytes.to_vec(), content_type.to_string()));
        Ok(())
    }
}
