//! Plugin loading
//! 
//! Plugins are dynamically loaded shared libraries found in one well-known
//! directory. Each must export the entry points described in
//! [`crate::plugins`]; anything else is logged and skipped.

pub mod loader;

pub use loader::PluginLoader;
