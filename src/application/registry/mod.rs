//! Command and module registry
//!
//! The registry owns three maps: command name to entry, installed modules with
//! their enabled flag, and actor permissions. All of them sit behind one
//! exclusive lock. Handlers are never run while the lock is held: dispatch
//! copies the resolved entry out, releases the lock, then invokes the handler
//! on its own task.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::HashMap;

use crate::application::errors::{CommandError, StorageError};
use crate::application::messaging::{split_command, CommandContext};
use crate::domain::entities::{
    CommandEntry, Message, Module, ModuleInfo, ModuleKind, PermissionLevel, Trigger,
};
use crate::domain::traits::{Bot, PermissionStore, PermissionTable};
use crate::infrastructure::plugins::PluginLoader;

#[cfg(test)]
mod tests;

struct ModuleRecord {
    name: String,
    description: String,
    kind: ModuleKind,
    enabled: bool,
    commands: Vec<String>,
    instance: Option<Arc<dyn Module>>,
}

impl ModuleRecord {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            kind: self.kind,
            enabled: self.enabled,
            commands: self.commands.clone(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    commands: HashMap<String, CommandEntry>,
    modules: Vec<ModuleRecord>,
    permissions: PermissionTable,
}

impl RegistryState {
    fn module_index(&self, name: &str) -> Option<usize> {
        self.modules
            .iter()
            .position(|m| m.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Drop a module and every command that points back at it.
    fn remove_module(&mut self, name: &str) -> Option<(ModuleRecord, usize)> {
        let index = self.module_index(name)?;
        let record = self.modules.remove(index);
        let before = self.commands.len();
        self.commands.retain(|_, entry| {
            !entry
                .module
                .as_deref()
                .map(|owner| owner.eq_ignore_ascii_case(&record.name))
                .unwrap_or(false)
        });
        let removed = before - self.commands.len();
        Some((record, removed))
    }
}

/// Command resolved for execution, copied out of the registry
struct Resolved {
    entry: CommandEntry,
    args: Vec<String>,
}

/// Shared handle to the live command/module registry.
///
/// Cloning is cheap; all clones see the same state.
#[derive(Clone)]
pub struct CommandRegistry {
    state: Arc<Mutex<RegistryState>>,
    /// Held across a whole install, uninstall or swap so that a module's
    /// `install` never interleaves with another change to the module set.
    /// Reentrant because `install` and `shutdown` hooks may call back in.
    membership: Arc<ReentrantMutex<()>>,
    store: Option<Arc<dyn PermissionStore>>,
}

impl CommandRegistry {
    /// In-memory registry with no permission persistence.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            membership: Arc::new(ReentrantMutex::new(())),
            store: None,
        }
    }

    /// Registry backed by a permission store, seeded from its contents.
    pub fn with_store(store: Arc<dyn PermissionStore>) -> Result<Self, StorageError> {
        let permissions = store.load()?;
        tracing::info!("Loaded {} permission record(s)", permissions.len());
        Ok(Self {
            state: Arc::new(Mutex::new(RegistryState {
                permissions,
                ..RegistryState::default()
            })),
            membership: Arc::new(ReentrantMutex::new(())),
            store: Some(store),
        })
    }

    // ---- commands -------------------------------------------------------

    /// Register a command on behalf of `module`.
    ///
    /// A command with the same name is overwritten; the collision is logged.
    /// The module is recorded as enabled if it is new to the registry.
    pub fn add_command(&self, mut entry: CommandEntry, module: &dyn Module) {
        let module_name = module.name().to_string();
        entry.module = Some(module_name.clone());
        let name = entry.name.clone();

        let mut state = self.state.lock();

        if let Some(previous) = state.commands.insert(name.clone(), entry) {
            let previous_owner = previous.module.unwrap_or_default();
            if !previous_owner.eq_ignore_ascii_case(&module_name) {
                tracing::warn!(
                    "Command {} from module {} replaces the one from module {}",
                    name,
                    module_name,
                    previous_owner
                );
                if let Some(index) = state.module_index(&previous_owner) {
                    state.modules[index].commands.retain(|c| c != &name);
                }
            }
        }

        let index = match state.module_index(&module_name) {
            Some(index) => index,
            None => {
                state.modules.push(ModuleRecord {
                    name: module_name,
                    description: module.description().to_string(),
                    kind: module.kind(),
                    enabled: true,
                    commands: Vec::new(),
                    instance: None,
                });
                state.modules.len() - 1
            }
        };

        let record = &mut state.modules[index];
        if !record.commands.contains(&name) {
            record.commands.push(name);
        }
    }

    /// Remove a single command by exact name.
    pub fn remove_command(&self, name: &str) -> Option<CommandEntry> {
        let mut state = self.state.lock();
        let entry = state.commands.remove(name)?;
        if let Some(owner) = entry.module.as_deref() {
            if let Some(index) = state.module_index(owner) {
                state.modules[index].commands.retain(|c| c != name);
            }
        }
        Some(entry)
    }

    pub fn command(&self, name: &str) -> Option<CommandEntry> {
        self.state.lock().commands.get(name).cloned()
    }

    /// Snapshot of every command, sorted by name.
    pub fn commands(&self) -> Vec<CommandEntry> {
        let mut commands: Vec<CommandEntry> = self.state.lock().commands.values().cloned().collect();
        commands.sort_by(|a, b| a.name.cmp(&b.name));
        commands
    }

    pub fn command_count(&self) -> usize {
        self.state.lock().commands.len()
    }

    // ---- modules --------------------------------------------------------

    /// Install a module, replacing any installed module with the same name.
    ///
    /// Installs are serialised end to end: a concurrent install of a module
    /// with the same name waits until this one has registered its commands,
    /// then replaces it.
    pub fn install_module(&self, module: Arc<dyn Module>) {
        let _membership = self.membership.lock();
        let replaced = {
            let mut state = self.state.lock();
            let replaced = state.remove_module(module.name());
            state.modules.push(ModuleRecord {
                name: module.name().to_string(),
                description: module.description().to_string(),
                kind: module.kind(),
                enabled: true,
                commands: Vec::new(),
                instance: Some(module.clone()),
            });
            replaced
        };

        if let Some((old, removed)) = replaced {
            tracing::info!("Replacing module {} ({} command(s) dropped)", old.name, removed);
            if let Some(instance) = old.instance {
                instance.shutdown(self);
            }
        }

        module.install(self);
        tracing::debug!("Installed module {}", module.name());
    }

    /// Remove a module and all commands it contributed.
    ///
    /// Returns the number of commands removed.
    pub fn uninstall_module(&self, name: &str) -> Result<usize, CommandError> {
        let _membership = self.membership.lock();
        let (record, removed) = self
            .state
            .lock()
            .remove_module(name)
            .ok_or_else(|| CommandError::ModuleNotFound(name.to_string()))?;

        if let Some(instance) = record.instance {
            instance.shutdown(self);
        }
        tracing::info!("Uninstalled module {} ({} command(s))", record.name, removed);
        Ok(removed)
    }

    pub fn enable_module(&self, name: &str) -> Result<(), CommandError> {
        self.set_module_enabled(name, true)
    }

    /// Disable a module. Its commands stay registered but refuse to run.
    pub fn disable_module(&self, name: &str) -> Result<(), CommandError> {
        self.set_module_enabled(name, false)
    }

    fn set_module_enabled(&self, name: &str, enabled: bool) -> Result<(), CommandError> {
        let mut state = self.state.lock();
        let index = state
            .module_index(name)
            .ok_or_else(|| CommandError::ModuleNotFound(name.to_string()))?;

        let record = &mut state.modules[index];
        if !enabled && record.kind == ModuleKind::Internal {
            return Err(CommandError::ModuleLocked(record.name.clone()));
        }
        record.enabled = enabled;
        tracing::info!(
            "Module {} {}",
            record.name,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Case-insensitive enabled lookup.
    pub fn module_enabled(&self, name: &str) -> Result<bool, CommandError> {
        let state = self.state.lock();
        state
            .module_index(name)
            .map(|index| state.modules[index].enabled)
            .ok_or_else(|| CommandError::ModuleNotFound(name.to_string()))
    }

    pub fn module(&self, name: &str) -> Option<ModuleInfo> {
        let state = self.state.lock();
        state.module_index(name).map(|index| state.modules[index].info())
    }

    /// Snapshot of installed modules in installation order.
    pub fn modules(&self) -> Vec<ModuleInfo> {
        self.state.lock().modules.iter().map(ModuleRecord::info).collect()
    }

    /// Empty the command and module maps. Permissions are kept.
    pub fn clear_modules_and_commands(&self) {
        let _membership = self.membership.lock();
        let modules = {
            let mut state = self.state.lock();
            state.commands.clear();
            std::mem::take(&mut state.modules)
        };
        self.shutdown_records(modules);
    }

    /// Swap in the commands and modules of `staging` in one critical section.
    ///
    /// Dispatches that look up after this returns see only the new set.
    /// `staging` is left empty.
    pub fn replace_with(&self, staging: &CommandRegistry) {
        let _membership = self.membership.lock();
        let (commands, modules) = {
            let mut staged = staging.state.lock();
            (
                std::mem::take(&mut staged.commands),
                std::mem::take(&mut staged.modules),
            )
        };

        let old_modules = {
            let mut state = self.state.lock();
            state.commands = commands;
            std::mem::replace(&mut state.modules, modules)
        };
        self.shutdown_records(old_modules);
    }

    fn shutdown_records(&self, records: Vec<ModuleRecord>) {
        for record in records {
            if let Some(instance) = record.instance {
                instance.shutdown(self);
            }
        }
    }

    /// Load every plugin in `directory` and install the modules found.
    ///
    /// Returns the number of modules installed. Failures are logged by the
    /// loader and skipped.
    pub fn load_all_plugins(&self, loader: &mut PluginLoader, directory: &Path) -> usize {
        let mut installed = 0;
        for module in loader.load_all(directory) {
            tracing::debug!("Installing module {} from plugin", module.name());
            self.install_module(module);
            installed += 1;
        }
        installed
    }

    // ---- permissions ----------------------------------------------------

    /// Upsert an actor's level and persist the whole table.
    ///
    /// If persisting fails the previous record is restored, so the table in
    /// memory never holds a grant the store rejected.
    pub fn grant_permission(&self, actor_id: &str, level: PermissionLevel) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let previous = state.permissions.insert(actor_id.to_string(), level);
        self.save_or_restore(&mut state, actor_id, previous)?;
        tracing::info!("Granted {} to {}", level, actor_id);
        Ok(())
    }

    /// Grant `owner_id` Owner when no permission has been recorded yet.
    ///
    /// Returns whether the grant happened.
    pub fn claim_owner(&self, owner_id: &str) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        if !state.permissions.is_empty() {
            return Ok(false);
        }
        state.permissions.insert(owner_id.to_string(), PermissionLevel::Owner);
        self.save_or_restore(&mut state, owner_id, None)?;
        tracing::info!("No permissions on record, granted Owner to {}", owner_id);
        Ok(true)
    }

    /// Save the table; on failure put `actor_id` back to `previous`.
    fn save_or_restore(
        &self,
        state: &mut RegistryState,
        actor_id: &str,
        previous: Option<PermissionLevel>,
    ) -> Result<(), StorageError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Err(e) = store.save(&state.permissions) {
            tracing::warn!("Failed to persist permission for {}: {}", actor_id, e);
            match previous {
                Some(level) => state.permissions.insert(actor_id.to_string(), level),
                None => state.permissions.remove(actor_id),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Level of an actor; `None` when no record exists.
    pub fn permission_of(&self, actor_id: &str) -> PermissionLevel {
        self.state
            .lock()
            .permissions
            .get(actor_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn permissions(&self) -> PermissionTable {
        self.state.lock().permissions.clone()
    }

    /// Write the permission table to the store, if any.
    pub fn persist_permissions(&self) -> Result<(), StorageError> {
        let state = self.state.lock();
        match &self.store {
            Some(store) => store.save(&state.permissions),
            None => Ok(()),
        }
    }

    // ---- dispatch -------------------------------------------------------

    /// Resolve routed text against the registry under the lock.
    ///
    /// `Ok(None)` means the text is not a command this trigger can reach.
    fn resolve(&self, raw_text: &str, trigger: Trigger, actor_id: &str) -> Result<Option<Resolved>, CommandError> {
        let Some(parsed) = split_command(raw_text) else {
            return Ok(None);
        };

        let state = self.state.lock();
        let Some(entry) = state.commands.get(&parsed.name) else {
            return Ok(None);
        };

        if let Some(owner) = entry.module.as_deref() {
            if let Some(index) = state.module_index(owner) {
                let record = &state.modules[index];
                if !record.enabled {
                    return Err(CommandError::ModuleDisabled(record.name.clone()));
                }
            }
        }

        if !entry.triggers.contains(trigger) {
            return Ok(None);
        }

        if parsed.args.len() < entry.required_args {
            tracing::debug!(
                "{} expects {} argument(s), got {}; running anyway",
                entry.name,
                entry.required_args,
                parsed.args.len()
            );
        }

        let level = state.permissions.get(actor_id).copied().unwrap_or_default();
        if !level.satisfies(entry.min_permission) {
            return Err(CommandError::Unauthorized {
                command: entry.name.clone(),
                required: entry.min_permission,
            });
        }

        Ok(Some(Resolved {
            entry: entry.clone(),
            args: parsed.args,
        }))
    }

    /// Resolve `raw_text` and run the matching handler.
    ///
    /// Returns the name of the command that ran, `None` if the text did not
    /// resolve to a command reachable by `trigger`. Handler failures, panics
    /// included, come back as `CommandError::HandlerExecution` or whatever
    /// typed error the handler returned; the registry is untouched by them.
    pub async fn resolve_and_dispatch(
        &self,
        raw_text: &str,
        trigger: Trigger,
        message: Message,
        bot: Arc<dyn Bot>,
    ) -> Result<Option<String>, CommandError> {
        let Some(resolved) = self.resolve(raw_text, trigger, message.author_id())? else {
            return Ok(None);
        };

        let name = resolved.entry.name.clone();
        let ctx = CommandContext::new(message, name.clone(), resolved.args, trigger, bot);
        let handler = resolved.entry.handler;

        match tokio::spawn(async move { handler.call(ctx).await }).await {
            Ok(result) => result.map(|_| Some(name)),
            Err(join_err) if join_err.is_panic() => {
                tracing::error!("Handler for {} panicked", name);
                Err(CommandError::HandlerExecution(format!("{} panicked", name)))
            }
            Err(join_err) => Err(CommandError::HandlerExecution(join_err.to_string())),
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
