//! Domain layer - Core types shared by every other layer
//! 
//! This layer contains:
//! - Entities: Commands, modules, messages, actors and permission levels
//! - Traits: Abstractions for infrastructure (Bot, PermissionStore)

pub mod entities;
pub mod traits;
