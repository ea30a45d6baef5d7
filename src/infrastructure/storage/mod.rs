//! Permission table persistence

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::application::errors::StorageError;
use crate::domain::traits::{PermissionStore, PermissionTable};

/// JSON file holding `{ "<actor id>": "<level>" }`
pub struct JsonPermissionStore {
    path: PathBuf,
}

impl JsonPermissionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PermissionStore for JsonPermissionStore {
    fn load(&self) -> Result<PermissionTable, StorageError> {
        if !self.path.exists() {
            tracing::info!("No permission file at {}, starting empty", self.path.display());
            return Ok(PermissionTable::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(PermissionTable::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            StorageError::Serialization(format!("{}: {}", self.path.display(), e))
        })
    }

    fn save(&self, table: &PermissionTable) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(table)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Write to a sibling file first so a crash never leaves half a table
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!("Wrote {} permission record(s) to {}", table.len(), self.path.display());
        Ok(())
    }
}

/// Volatile store, for dev mode and tests
#[derive(Default)]
pub struct MemoryPermissionStore {
    table: Mutex<PermissionTable>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: PermissionTable) -> Self {
        Self {
            table: Mutex::new(table),
        }
    }

    /// Copy of what was last saved.
    pub fn snapshot(&self) -> PermissionTable {
        self.table.lock().clone()
    }
}

impl PermissionStore for MemoryPermissionStore {
    fn load(&self) -> Result<PermissionTable, StorageError> {
        Ok(self.table.lock().clone())
    }

    fn save(&self, table: &PermissionTable) -> Result<(), StorageError> {
        *self.table.lock() = table.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::CommandRegistry;
    use crate::domain::entities::PermissionLevel;
    use std::sync::Arc;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonPermissionStore::new(dir.path().join("permissions.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_grant_is_written_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("permissions.json");
        let store = Arc::new(JsonPermissionStore::new(&path));

        let registry = CommandRegistry::with_store(store.clone()).unwrap();
        registry.grant_permission("42", PermissionLevel::Owner).unwrap();
        registry.grant_permission("7", PermissionLevel::Mod).unwrap();
        registry.grant_permission("7", PermissionLevel::User).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("42"), Some(&PermissionLevel::Owner));
        assert_eq!(reloaded.get("7"), Some(&PermissionLevel::User));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"owner\""));

        // A fresh registry sees the persisted table
        let second = CommandRegistry::with_store(store).unwrap();
        assert_eq!(second.permission_of("42"), PermissionLevel::Owner);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("permissions.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = JsonPermissionStore::new(&path);
        assert!(matches!(store.load(), Err(StorageError::Serialization(_))));
    }

    #[test]
    fn test_memory_store_snapshot() {
        let store = Arc::new(MemoryPermissionStore::new());
        let registry = CommandRegistry::with_store(store.clone()).unwrap();
        registry.grant_permission("1", PermissionLevel::Admin).unwrap();
        assert_eq!(store.snapshot().get("1"), Some(&PermissionLevel::Admin));
    }
}
