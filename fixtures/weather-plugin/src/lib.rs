//! Weather plugin
//!
//! Built as a cdylib by the loader tests. Cargo features pick which broken
//! variant, if any, the library exports.

use kelola_bot::application::messaging::CommandContext;
use kelola_bot::application::registry::CommandRegistry;
use kelola_bot::domain::entities::{CommandEntry, Module, ModuleKind, PermissionLevel};

pub struct WeatherModule;

impl WeatherModule {
    #[cfg(feature = "broken-constructor")]
    fn broken() -> Self {
        panic!("weather station offline");
    }
}

impl Module for WeatherModule {
    fn name(&self) -> &str {
        "Weather"
    }

    fn description(&self) -> &str {
        "Forecasts for the chat"
    }

    fn kind(&self) -> ModuleKind {
        if cfg!(feature = "internal") {
            ModuleKind::Internal
        } else {
            ModuleKind::External
        }
    }

    fn install(&self, registry: &CommandRegistry) {
        registry.add_command(
            CommandEntry::new("forecast", |ctx: CommandContext| async move {
                let city = ctx.arg(0).unwrap_or("here").to_string();
                ctx.reply(format!("Sunny in {}", city)).await
            })
            .with_description("Tomorrow's weather")
            .with_permission(PermissionLevel::User)
            .with_args(1),
            self,
        );
        registry.add_command(
            CommandEntry::new("radar", |ctx: CommandContext| async move {
                ctx.reply("No rain on radar").await
            })
            .with_description("Rain radar"),
            self,
        );
    }
}

#[cfg(not(any(feature = "stale-abi", feature = "broken-constructor")))]
kelola_bot::declare_module!(WeatherModule);

#[cfg(feature = "broken-constructor")]
kelola_bot::declare_module!(WeatherModule::broken());

#[cfg(feature = "stale-abi")]
mod stale {
    use kelola_bot::plugins::{ModuleEntryPoint, PLUGIN_ABI_VERSION};

    #[no_mangle]
    pub static KELOLA_PLUGIN_ABI: u32 = PLUGIN_ABI_VERSION + 1;

    #[no_mangle]
    pub extern "C" fn kelola_module_entry() -> *mut ModuleEntryPoint {
        Box::into_raw(Box::new(ModuleEntryPoint::new(super::WeatherModule)))
    }
}
