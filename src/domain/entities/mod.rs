//! Domain entities - Core objects of the command registry

pub mod command;
pub mod message;
pub mod module;
pub mod permission;
pub mod user;

pub use command::{CommandEntry, CommandHandler, HandlerResult, Trigger, TriggerMask};
pub use message::{Attachment, Message};
pub use module::{Module, ModuleInfo, ModuleKind};
pub use permission::PermissionLevel;
pub use user::User;
