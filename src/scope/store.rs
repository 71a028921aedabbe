use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use log::warn;

use crate::synth::ScopeError;

pub const VIEW_SETTINGS_KEY: &str = "view_settings";
pub const UI_SELECTION_KEY: &str = "ui_selection";

/// Durable key/value storage for serialized settings blobs.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, ScopeError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), ScopeError>;
}

/// Keeps every key in one pretty-printed JSON object on disk.
pub struct JsonFileStore {
    path: PathBuf,
}
impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
    fn read_all(&self) -> Result<BTreeMap<String, String>, ScopeError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }
}
impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, ScopeError> {
        Ok(self.read_all()?.remove(key))
    }
    fn set(&mut self, key: &str, value: &str) -> Result<(), ScopeError> {
        // a corrupt file is replaced rather than blocking every later write;
        // any other read failure could drop the keys we failed to read
        let mut all = match self.read_all() {
            Ok(all) => all,
            Err(ScopeError::Serialization(err)) => {
                warn!("{} is corrupt ({err}); rewriting it", self.path.display());
                BTreeMap::new()
            }
            Err(err) => return Err(err),
        };
        all.insert(key.to_owned(), value.to_owned());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(&all)?)?;
        Ok(())
    }
}

/// In-memory store. `failing()` builds one whose every call errors.
#[derive(Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    fail: bool,
    writes: usize,
}
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
    pub fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_owned(), value.to_owned());
        self
    }
    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}
impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, ScopeError> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::Other, "store unavailable").into());
        }
        Ok(self.entries.get(key).cloned())
    }
    fn set(&mut self, key: &str, value: &str) -> Result<(), ScopeError> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::Other, "store unavailable").into());
        }
        self.entries.insert(key.to_owned(), value.to_owned());
        self.writes += 1;
        Ok(())
    }
}
