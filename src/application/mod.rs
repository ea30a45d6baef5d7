//! Application layer - Use cases and business logic
//! 
//! This layer contains:
//! - Registry: Commands, modules and permissions
//! - Messaging: Message classification, execution context, dispatching
//! - Services: Module lifecycle and reload
//! - Modules: Built-in command sets
//! - Errors: Domain-specific errors

pub mod errors;
pub mod registry;
pub mod messaging;
pub mod services;
pub mod modules;
