//! Infrastructure layer - External concerns
//! 
//! This layer contains:
//! - Config: Configuration loading
//! - Storage: Permission persistence
//! - Plugins: Dynamic library loading
//! - Adapters: Platform integrations (Telegram, console)

pub mod config;
pub mod storage;
pub mod plugins;
pub mod adapters;
