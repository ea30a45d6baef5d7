use serde::{Deserialize, Serialize};
use std::fmt;

use crate::application::registry::CommandRegistry;

/// Where a module came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// Built into the bot. Reinstalled on every reload and never disabled.
    Internal,
    /// Loaded from a plugin library.
    External,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Internal => f.write_str("internal"),
            ModuleKind::External => f.write_str("external"),
        }
    }
}

/// A named bundle of commands that can be enabled or disabled as a unit.
///
/// A module registers its commands through [`CommandRegistry::add_command`]
/// from `install`; it never touches the registry maps directly.
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::External
    }

    /// Register this module's commands.
    fn install(&self, registry: &CommandRegistry);

    /// Called when the module leaves the registry (uninstall, reload or exit).
    fn shutdown(&self, _registry: &CommandRegistry) {}
}

impl fmt::Debug for dyn Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// Read-only snapshot of an installed module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub description: String,
    pub kind: ModuleKind,
    pub enabled: bool,
    pub commands: Vec<String>,
}
