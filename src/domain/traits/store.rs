use std::collections::HashMap;

use crate::application::errors::StorageError;
use crate::domain::entities::PermissionLevel;

/// Actor id to permission level.
pub type PermissionTable = HashMap<String, PermissionLevel>;

/// Persistence for the actor permission table.
///
/// Calls happen while the registry lock is held, so implementations are
/// synchronous and must not block for long.
pub trait PermissionStore: Send + Sync {
    fn load(&self) -> Result<PermissionTable, StorageError>;

    /// Replace the stored table wholesale.
    fn save(&self, table: &PermissionTable) -> Result<(), StorageError>;
}
