//! Module lifecycle: startup install, reload, prefix changes and shutdown

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::application::errors::CommandError;
use crate::application::messaging::SharedPrefix;
use crate::application::registry::CommandRegistry;
use crate::domain::entities::Module;
use crate::infrastructure::config::Config;
use crate::infrastructure::plugins::PluginLoader;

/// Builds a fresh instance of an internal module for each install
pub type ModuleFactory = Arc<dyn Fn(&ModuleService) -> Arc<dyn Module> + Send + Sync>;

/// Reload state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    Running,
    Reloading,
}

struct Inner {
    registry: CommandRegistry,
    loader: Arc<Mutex<PluginLoader>>,
    plugin_dir: PathBuf,
    auto_load: bool,
    internal: Vec<ModuleFactory>,
    reloading: AtomicBool,
    started_at: DateTime<Utc>,
    prefix: SharedPrefix,
    config_path: Option<PathBuf>,
    shutdown: watch::Sender<bool>,
}

/// Owns the live registry's module set.
///
/// Cloning is cheap. Modules that need to call back into the service hold a
/// [`WeakModuleService`] so the registry never keeps the service alive.
#[derive(Clone)]
pub struct ModuleService {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`ModuleService`]
#[derive(Clone)]
pub struct WeakModuleService {
    inner: Weak<Inner>,
}

impl WeakModuleService {
    pub fn upgrade(&self) -> Result<ModuleService, CommandError> {
        self.inner
            .upgrade()
            .map(|inner| ModuleService { inner })
            .ok_or_else(|| CommandError::HandlerExecution("bot is shutting down".to_string()))
    }
}

/// Clears the reloading flag when a reload ends, however it ends
struct ReloadGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ReloadGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct ModuleServiceBuilder {
    registry: CommandRegistry,
    loader: PluginLoader,
    plugin_dir: PathBuf,
    auto_load: bool,
    internal: Vec<ModuleFactory>,
    prefix: String,
    config_path: Option<PathBuf>,
}

impl ModuleServiceBuilder {
    pub fn plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = dir.into();
        self
    }

    pub fn auto_load(mut self, auto_load: bool) -> Self {
        self.auto_load = auto_load;
        self
    }

    pub fn loader(mut self, loader: PluginLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Config file that `set_prefix` writes back to.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Register an internal module, installed on start and after every reload.
    pub fn internal_module<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ModuleService) -> Arc<dyn Module> + Send + Sync + 'static,
    {
        self.internal.push(Arc::new(factory));
        self
    }

    /// Take plugin settings from the loaded config.
    pub fn with_config(self, config: &Config) -> Self {
        self.plugin_dir(config.plugins.directory.clone())
            .auto_load(config.plugins.auto_load)
            .loader(PluginLoader::with_extension(config.plugins.extension.clone()))
            .prefix(config.bot.prefix.clone())
    }

    pub fn build(self) -> ModuleService {
        let (shutdown, _) = watch::channel(false);
        ModuleService {
            inner: Arc::new(Inner {
                registry: self.registry,
                loader: Arc::new(Mutex::new(self.loader)),
                plugin_dir: self.plugin_dir,
                auto_load: self.auto_load,
                internal: self.internal,
                reloading: AtomicBool::new(false),
                started_at: Utc::now(),
                prefix: Arc::new(RwLock::new(self.prefix)),
                config_path: self.config_path,
                shutdown,
            }),
        }
    }
}

impl ModuleService {
    pub fn builder(registry: CommandRegistry) -> ModuleServiceBuilder {
        ModuleServiceBuilder {
            registry,
            loader: PluginLoader::new(),
            plugin_dir: PathBuf::from("./modules"),
            auto_load: true,
            internal: Vec::new(),
            prefix: "!".to_string(),
            config_path: None,
        }
    }

    pub fn downgrade(&self) -> WeakModuleService {
        WeakModuleService {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.inner.registry
    }

    pub fn shared_prefix(&self) -> SharedPrefix {
        self.inner.prefix.clone()
    }

    pub fn prefix(&self) -> String {
        self.inner.prefix.read().clone()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn uptime(&self) -> Duration {
        Utc::now() - self.inner.started_at
    }

    pub fn state(&self) -> ReloadState {
        if self.inner.reloading.load(Ordering::Acquire) {
            ReloadState::Reloading
        } else {
            ReloadState::Running
        }
    }

    /// Install the internal modules and, when auto-load is on, the plugins.
    ///
    /// Returns the number of plugin modules installed.
    pub async fn start(&self) -> Result<usize, CommandError> {
        let loaded = self.reload(self.inner.auto_load).await?;
        tracing::info!(
            "{} module(s), {} command(s) ready",
            self.inner.registry.modules().len(),
            self.inner.registry.command_count()
        );
        Ok(loaded)
    }

    /// Rebuild the module set and swap it into the live registry.
    ///
    /// The replacement is assembled in a staging registry, so dispatches keep
    /// resolving against the old set until the swap. Every module of the new
    /// set starts enabled; permissions are kept.
    /// Returns the number of plugin modules installed.
    pub async fn reload(&self, load_plugins: bool) -> Result<usize, CommandError> {
        let _guard = self.begin_reload()?;
        tracing::info!("Reloading modules (plugins: {})", load_plugins);

        let staging = CommandRegistry::new();
        for factory in &self.inner.internal {
            staging.install_module(factory(self));
        }

        let mut loaded = 0;
        if load_plugins {
            let loader = self.inner.loader.clone();
            let dir = self.inner.plugin_dir.clone();
            let target = staging.clone();
            loaded = tokio::task::spawn_blocking(move || {
                let mut loader = loader.lock();
                target.load_all_plugins(&mut loader, &dir)
            })
            .await
            .map_err(|e| CommandError::HandlerExecution(format!("plugin scan failed: {}", e)))?;
        }

        self.inner.registry.replace_with(&staging);
        tracing::info!(
            "Reload complete: {} plugin module(s), {} command(s)",
            loaded,
            self.inner.registry.command_count()
        );
        Ok(loaded)
    }

    fn begin_reload(&self) -> Result<ReloadGuard<'_>, CommandError> {
        self.inner
            .reloading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CommandError::ReloadInProgress)?;
        Ok(ReloadGuard {
            flag: &self.inner.reloading,
        })
    }

    /// Change the command prefix, writing it back to the config file.
    ///
    /// On a failed write the old prefix is restored and the error returned.
    pub fn set_prefix(&self, prefix: &str) -> Result<(), CommandError> {
        let prefix = prefix.trim();
        if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
            return Err(CommandError::InvalidArgs(format!("`{}` is not a usable prefix", prefix)));
        }

        let old = std::mem::replace(&mut *self.inner.prefix.write(), prefix.to_string());

        if let Some(path) = &self.inner.config_path {
            let persisted = Config::load(path).and_then(|mut config| {
                config.bot.prefix = prefix.to_string();
                config.save(path)
            });
            if let Err(e) = persisted {
                *self.inner.prefix.write() = old;
                return Err(CommandError::HandlerExecution(e.to_string()));
            }
        }

        tracing::info!("Command prefix changed from {} to {}", old, prefix);
        Ok(())
    }

    /// Ask the message loop to stop.
    pub fn shutdown(&self) {
        tracing::info!("Shutdown requested");
        self.inner.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Receiver that flips to `true` once shutdown is requested.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    /// Run module shutdown hooks and persist permissions.
    pub fn teardown(&self) {
        self.inner.registry.clear_modules_and_commands();
        if let Err(e) = self.inner.registry.persist_permissions() {
            tracing::error!("Failed to persist permissions: {}", e);
        }
    }
}
