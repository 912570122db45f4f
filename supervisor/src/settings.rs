//! Persisted configuration collaborator
//!
//! The host application owns configuration persistence; the supervisor only
//! needs string get/set. `JsonFileSettings` is the standalone backend used
//! by the CLI, `MemorySettings` serves tests and embedding.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{SupervisorError, SupervisorResult};

/// Opaque key-value string store
pub trait SettingsStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;

    fn set_string(&mut self, key: &str, value: &str) -> SupervisorResult<()>;

    /// All keys with the given prefix, sorted
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: BTreeMap<String, String>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set_string(&mut self, key: &str, value: &str) -> SupervisorResult<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.values
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// Flat JSON object on disk, rewritten on every set
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileSettings {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> SupervisorResult<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text).map_err(|e| SupervisorError::SettingsError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> SupervisorResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        // Atomic replace via rename
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&self.values)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set_string(&mut self, key: &str, value: &str) -> SupervisorResult<()> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.values
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSettings::open(dir.path().join("settings.json")).unwrap();
        assert!(store.get_string("roles.rpc.port").is_none());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut store = JsonFileSettings::open(&path).unwrap();
        store.set_string("roles.rpc.port", "9876").unwrap();
        store.set_string("roles.rpc.host", "0.0.0.0").unwrap();

        let reopened = JsonFileSettings::open(&path).unwrap();
        assert_eq!(reopened.get_string("roles.rpc.port").as_deref(), Some("9876"));
        assert_eq!(
            reopened.keys_with_prefix("roles.rpc."),
            vec!["roles.rpc.host".to_string(), "roles.rpc.port".to_string()]
        );
    }

    #[test]
    fn test_corrupt_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = JsonFileSettings::open(&path).unwrap_err();
        assert!(matches!(err, SupervisorError::SettingsError { .. }));
        assert!(err.to_string().contains("settings.json"));
    }
}
