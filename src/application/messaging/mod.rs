//! Message handling - Trigger classification and dispatch

pub mod context;
pub mod dispatcher;
pub mod parser;

pub use context::CommandContext;
pub use dispatcher::{DispatchOutcome, MessageDispatcher, DRAIN_TIMEOUT};
pub use parser::{split_command, MessageParser, ParsedCommand, SharedPrefix};
