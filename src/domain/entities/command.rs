use std::fmt;
use std::future::Future;
use std::ops::BitOr;
use std::sync::Arc;

use async_trait::async_trait;

use super::PermissionLevel;
use crate::application::errors::CommandError;
use crate::application::messaging::CommandContext;

/// How an inbound message qualified as a command attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The bot's own identity was referenced in the message.
    DirectMention,
    /// The message text starts with the configured prefix.
    PrefixedMessage,
}

/// Set of triggers a command accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TriggerMask(u8);

impl TriggerMask {
    pub const NONE: TriggerMask = TriggerMask(0);
    pub const DIRECT_MENTION: TriggerMask = TriggerMask(0b01);
    pub const PREFIXED: TriggerMask = TriggerMask(0b10);
    pub const ALL: TriggerMask = TriggerMask(0b11);

    pub fn contains(self, trigger: Trigger) -> bool {
        self.0 & TriggerMask::from(trigger).0 != 0
    }
}

impl Default for TriggerMask {
    fn default() -> Self {
        TriggerMask::PREFIXED
    }
}

impl From<Trigger> for TriggerMask {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::DirectMention => TriggerMask::DIRECT_MENTION,
            Trigger::PrefixedMessage => TriggerMask::PREFIXED,
        }
    }
}

impl BitOr for TriggerMask {
    type Output = TriggerMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        TriggerMask(self.0 | rhs.0)
    }
}

/// Handler result
pub type HandlerResult = Result<(), CommandError>;

/// Capability invoked when a command runs
///
/// Implemented for any `Fn(CommandContext) -> impl Future<Output = HandlerResult>`,
/// so plain async closures can be registered directly.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn call(&self, ctx: CommandContext) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, ctx: CommandContext) -> HandlerResult {
        (self)(ctx).await
    }
}

/// Registered description and handler for one invocable action
#[derive(Clone)]
pub struct CommandEntry {
    pub name: String,
    pub description: String,
    pub help_text: String,
    pub id: Option<String>,
    /// Name of the owning module. Set by the registry on registration.
    pub module: Option<String>,
    pub min_permission: PermissionLevel,
    /// Advisory minimum number of arguments after the command name.
    pub required_args: usize,
    pub triggers: TriggerMask,
    pub handler: Arc<dyn CommandHandler>,
}

impl CommandEntry {
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::from_handler(name, Arc::new(handler))
    }

    /// Build an entry around an already shared handler.
    pub fn from_handler(name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            help_text: String::new(),
            id: None,
            module: None,
            min_permission: PermissionLevel::None,
            required_args: 0,
            triggers: TriggerMask::default(),
            handler,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help_text = help.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_permission(mut self, level: PermissionLevel) -> Self {
        self.min_permission = level;
        self
    }

    pub fn with_args(mut self, count: usize) -> Self {
        self.required_args = count;
        self
    }

    pub fn with_triggers(mut self, triggers: TriggerMask) -> Self {
        self.triggers = triggers;
        self
    }
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("min_permission", &self.min_permission)
            .field("required_args", &self.required_args)
            .field("triggers", &self.triggers)
            .finish_non_exhaustive()
    }
}
