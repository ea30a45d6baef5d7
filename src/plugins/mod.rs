//! Plugin authoring surface
//! 
//! Plugins are dynamic libraries that contribute one External module each.
//! They link against this crate, implement [`Module`](crate::domain::entities::Module)
//! and export it with [`declare_module!`](crate::declare_module).

pub mod entry;

pub use entry::{ModuleEntryPoint, ModuleFactoryFn, ABI_SYMBOL, ENTRY_SYMBOL, PLUGIN_ABI_VERSION};
