//! kelola-bot - a chat bot built around a command and module registry
//!
//! Commands are grouped into modules that can be enabled, disabled and
//! reloaded while the bot keeps serving messages. Modules are either built
//! in or loaded from plugin libraries at runtime.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod plugins;
