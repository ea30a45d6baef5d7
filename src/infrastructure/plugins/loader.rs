//! Plugin loader - Dynamically loads modules from shared libraries

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};

use crate::application::errors::PluginError;
use crate::domain::entities::{Module, ModuleKind};
use crate::plugins::{ModuleFactoryFn, ABI_SYMBOL, ENTRY_SYMBOL, PLUGIN_ABI_VERSION};

/// Plugin loader
///
/// Libraries stay mapped for the life of the loader: a module's handlers
/// point into library code, and entries resolved before a reload may still
/// be running after it. Unloading a module only removes its commands.
pub struct PluginLoader {
    extension: String,
    libraries: HashMap<PathBuf, Library>,
}

impl PluginLoader {
    /// Loader for the platform's dynamic library extension.
    pub fn new() -> Self {
        Self::with_extension(std::env::consts::DLL_EXTENSION)
    }

    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into().trim_start_matches('.').to_string(),
            libraries: HashMap::new(),
        }
    }

    /// Number of distinct library files currently held.
    pub fn loaded_libraries(&self) -> usize {
        self.libraries.len()
    }

    /// Regular files in `dir` with the plugin extension, sorted by path.
    ///
    /// A missing directory yields no candidates.
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>, PluginError> {
        if !dir.exists() {
            tracing::warn!("Plugin directory does not exist: {}", dir.display());
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            // Skip hidden files
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    continue;
                }
            }

            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(&self.extension))
                .unwrap_or(false);
            if matches {
                candidates.push(path);
            }
        }

        candidates.sort();
        Ok(candidates)
    }

    /// Whether `path` holds a loadable External module.
    ///
    /// The module is constructed and dropped straight away; nothing is
    /// logged above debug. The library itself stays mapped like any other
    /// this loader has opened, since code it ran may have left thread-local
    /// destructors behind.
    pub fn validate(&mut self, path: &Path) -> bool {
        match self.open(path) {
            Ok(module) => {
                tracing::debug!("{} holds module {}", path.display(), module.name());
                true
            }
            Err(e) => {
                tracing::debug!("{} is not a valid module: {}", path.display(), e);
                false
            }
        }
    }

    /// Load the library at `path` and construct the module it exports.
    pub fn load(&mut self, path: &Path) -> Result<Arc<dyn Module>, PluginError> {
        let module = self.open(path)?;
        tracing::info!(
            "Module loaded successfully! {}: {}",
            module.name(),
            module.description()
        );
        Ok(module)
    }

    /// Map the library, check its ABI, construct its module and insist the
    /// module is External.
    fn open(&mut self, path: &Path) -> Result<Arc<dyn Module>, PluginError> {
        tracing::debug!("Opening plugin at {}", path.display());

        // Loading runs the library's initialisers; plugins are fully trusted.
        let library = unsafe {
            Library::new(path)
                .map_err(|e| PluginError::Load(format!("{}: {}", path.display(), e)))?
        };

        let module = Self::instantiate(&library, path);

        // Reopening the same file hands back the existing mapping, so only
        // the first handle needs keeping.
        self.libraries.entry(path.to_path_buf()).or_insert(library);

        let module = module?;
        if module.kind() != ModuleKind::External {
            return Err(PluginError::WrongKind(module.name().to_string()));
        }
        Ok(module)
    }

    fn instantiate(library: &Library, path: &Path) -> Result<Arc<dyn Module>, PluginError> {
        let missing = |symbol: &str| PluginError::MissingSymbol {
            symbol: symbol.to_string(),
            path: path.display().to_string(),
        };

        let found = unsafe {
            let abi: Symbol<*const u32> = library
                .get(ABI_SYMBOL.as_bytes())
                .map_err(|_| missing(ABI_SYMBOL))?;
            **abi
        };
        if found != PLUGIN_ABI_VERSION {
            return Err(PluginError::AbiMismatch {
                expected: PLUGIN_ABI_VERSION,
                found,
            });
        }

        let raw = unsafe {
            let factory: Symbol<ModuleFactoryFn> = library
                .get(ENTRY_SYMBOL.as_bytes())
                .map_err(|_| missing(ENTRY_SYMBOL))?;
            factory()
        };
        if raw.is_null() {
            return Err(PluginError::Instantiation(format!(
                "{} returned no module",
                path.display()
            )));
        }

        // The factory hands over a Box allocated with `Box::into_raw`.
        let entry = unsafe { Box::from_raw(raw) };
        Ok(entry.into_module())
    }

    /// Load every candidate in `dir`, skipping the ones that fail.
    pub fn load_all(&mut self, dir: &Path) -> Vec<Arc<dyn Module>> {
        let candidates = match self.discover(dir) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("Failed to scan plugin directory {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut modules = Vec::new();
        for path in candidates {
            match self.load(&path) {
                Ok(module) => modules.push(module),
                Err(e) => {
                    tracing::warn!("Failed to load plugin from {}: {}", path.display(), e);
                }
            }
        }
        modules
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}
