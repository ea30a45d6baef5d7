//! Application layer errors

use thiserror::Error;

use crate::domain::entities::PermissionLevel;

/// General bot errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures raised while resolving or running a command.
///
/// Every variant is recoverable: the dispatcher turns it into exactly one
/// reply in the originating chat.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Not enough permission to run {command} (requires {required})")]
    Unauthorized {
        command: String,
        required: PermissionLevel,
    },

    #[error("Module {0} is disabled")]
    ModuleDisabled(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Module {0} is built in and cannot be disabled")]
    ModuleLocked(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Execution failed: {0}")]
    HandlerExecution(String),

    #[error("A reload is already in progress")]
    ReloadInProgress,
}

impl CommandError {
    /// Text sent back to the chat for this failure.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Unauthorized { command, required } => format!(
                "You don't have permission to use `{}` (needs {}).",
                command, required
            ),
            CommandError::ModuleDisabled(module) => {
                format!("The module `{}` is currently disabled.", module)
            }
            CommandError::ModuleNotFound(module) => format!("No module named `{}`.", module),
            CommandError::ModuleLocked(module) => {
                format!("The module `{}` is built in and can't be disabled.", module)
            }
            CommandError::InvalidArgs(reason) => format!("Invalid arguments: {}", reason),
            CommandError::HandlerExecution(reason) => format!(
                "Exception occurred while running command:\n```\n{}\n```",
                reason
            ),
            CommandError::ReloadInProgress => "I'm already reloading, hang on!".to_string(),
        }
    }
}

impl From<BotError> for CommandError {
    fn from(err: BotError) -> Self {
        match err {
            BotError::Command(inner) => inner,
            other => CommandError::HandlerExecution(other.to_string()),
        }
    }
}

/// Plugin loading errors
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Failed to load library: {0}")]
    Load(String),

    #[error("Missing entry point `{symbol}` in {path}")]
    MissingSymbol { symbol: String, path: String },

    #[error("Plugin ABI version {found} does not match host version {expected}")]
    AbiMismatch { expected: u32, found: u32 },

    #[error("Plugin factory failed: {0}")]
    Instantiation(String),

    #[error("Module {0} is not an external module")]
    WrongKind(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
