//! Plugin entry point definitions
//!
//! A plugin library exports two symbols:
//! - [`ABI_SYMBOL`]: a `u32` static equal to [`PLUGIN_ABI_VERSION`]
//! - [`ENTRY_SYMBOL`]: an `extern "C"` factory returning a heap-allocated
//!   [`ModuleEntryPoint`], or null when construction failed
//!
//! [`declare_module!`](crate::declare_module) generates both.

use std::sync::Arc;

use crate::domain::entities::Module;

/// Bumped whenever `Module`, `CommandRegistry` or `ModuleEntryPoint` change
/// in a way that breaks already-built plugins.
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Name of the exported ABI version static.
pub const ABI_SYMBOL: &str = "KELOLA_PLUGIN_ABI";

/// Name of the exported module factory.
pub const ENTRY_SYMBOL: &str = "kelola_module_entry";

/// Signature of the exported module factory.
pub type ModuleFactoryFn = unsafe extern "C" fn() -> *mut ModuleEntryPoint;

/// Owned handle to the module a plugin constructs
pub struct ModuleEntryPoint {
    module: Arc<dyn Module>,
}

impl ModuleEntryPoint {
    pub fn new<M: Module + 'static>(module: M) -> Self {
        Self {
            module: Arc::new(module),
        }
    }

    pub fn into_module(self) -> Arc<dyn Module> {
        self.module
    }
}

/// Export a module constructor from a plugin library.
///
/// ```rust,ignore
/// use kelola_bot::declare_module;
///
/// declare_module!(WeatherModule::new());
/// ```
///
/// A panic inside the constructor is caught and reported to the host as a
/// failed instantiation.
#[macro_export]
macro_rules! declare_module {
    ($constructor:expr) => {
        #[no_mangle]
        pub static KELOLA_PLUGIN_ABI: u32 = $crate::plugins::PLUGIN_ABI_VERSION;

        #[no_mangle]
        pub extern "C" fn kelola_module_entry() -> *mut $crate::plugins::ModuleEntryPoint {
            let built = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                $crate::plugins::ModuleEntryPoint::new($constructor)
            }));
            match built {
                Ok(entry) => ::std::boxed::Box::into_raw(::std::boxed::Box::new(entry)),
                Err(_) => ::std::ptr::null_mut(),
            }
        }
    };
}
