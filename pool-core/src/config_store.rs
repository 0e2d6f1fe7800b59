//! The external configuration store collaborator (spec §6).
//!
//! Paths are of the form `⟨instance⟩/⟨property⟩`. This crate treats the
//! store as opaque key-value text storage; typed (de)serialization of
//! property values happens in `crate::property`, one layer up.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A key-value store for persisted property text, keyed by
/// `⟨instance⟩/⟨property⟩` paths.
pub trait ConfigStore: Send + Sync {
    fn get(&self, path: &str) -> Option<String>;
    fn set(&mut self, path: &str, value: String);
}

fn path_for(instance: &str, property: &str) -> String {
    format!("{instance}/{property}")
}

/// `HashMap`-backed store used by tests and as the daemon's default when no
/// external store is configured.
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    values: HashMap<String, String>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_property(&self, instance: &str, property: &str) -> Option<String> {
        self.get(&path_for(instance, property))
    }

    pub fn set_property(&mut self, instance: &str, property: &str, value: String) {
        self.set(&path_for(instance, property), value);
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn get(&self, path: &str) -> Option<String> {
        self.values.get(path).cloned()
    }

    fn set(&mut self, path: &str, value: String) {
        self.values.insert(path.to_string(), value);
    }
}

/// On-disk TOML document backing a `ConfigStore`, plus the §6 environment
/// knobs (`pool_path`, `tmpElement_MaxInactTime`,
/// `defaultMotPos_AbsChange`, `defaultCtVal_AbsChange`).
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct PoolEnvironment {
    #[serde(default)]
    pub pool_path: Vec<PathBuf>,
    #[serde(default = "default_tmp_inact_time")]
    pub tmp_element_max_inact_time_secs: u64,
    #[serde(default)]
    pub default_mot_pos_abs_change: f64,
    #[serde(default)]
    pub default_ct_val_abs_change: f64,
}

fn default_tmp_inact_time() -> u64 {
    600
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct TomlDocument {
    #[serde(default)]
    environment: PoolEnvironment,
    #[serde(default)]
    properties: HashMap<String, String>,
}

/// A `ConfigStore` backed by a single TOML file, written back on every
/// `set` so property edits survive a restart.
pub struct TomlConfigStore {
    path: PathBuf,
    doc: Mutex<TomlDocument>,
}

impl TomlConfigStore {
    /// Load `path` if it exists, otherwise start from an empty document.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => TomlDocument::default(),
            Err(e) => return Err(e),
        };
        Ok(TomlConfigStore {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn environment(&self) -> PoolEnvironment {
        let doc = self.doc.lock().unwrap();
        PoolEnvironment {
            pool_path: doc.environment.pool_path.clone(),
            tmp_element_max_inact_time_secs: doc.environment.tmp_element_max_inact_time_secs,
            default_mot_pos_abs_change: doc.environment.default_mot_pos_abs_change,
            default_ct_val_abs_change: doc.environment.default_ct_val_abs_change,
        }
    }

    fn flush(&self, doc: &TomlDocument) -> io::Result<()> {
        let text = toml::to_string_pretty(doc)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.path, text)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for TomlConfigStore {
    fn get(&self, path: &str) -> Option<String> {
        self.doc.lock().unwrap().properties.get(path).cloned()
    }

    fn set(&mut self, path: &str, value: String) {
        let mut doc = self.doc.lock().unwrap();
        doc.properties.insert(path.to_string(), value);
        if let Err(e) = self.flush(&doc) {
            log::warn!("failed to persist config store {:?}: {e}", self.path());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_round_trips_by_instance_and_property() {
        let mut store = InMemoryConfigStore::new();
        store.set_property("mot01", "Axis", "3".into());
        assert_eq!(store.get_property("mot01", "Axis").as_deref(), Some("3"));
        assert_eq!(store.get_property("mot01", "Id"), None);
    }
}
