//! Execution context handed to every command handler

use std::fmt;
use std::sync::Arc;

use crate::application::errors::CommandError;
use crate::domain::entities::{Message, Trigger, User};
use crate::domain::traits::Bot;

/// What a handler can see and do: the origin chat, the invoking actor, the
/// original message, the parsed arguments and a way to reply.
#[derive(Clone)]
pub struct CommandContext {
    pub message: Message,
    pub command: String,
    pub args: Vec<String>,
    pub trigger: Trigger,
    bot: Arc<dyn Bot>,
}

impl CommandContext {
    pub fn new(
        message: Message,
        command: impl Into<String>,
        args: Vec<String>,
        trigger: Trigger,
        bot: Arc<dyn Bot>,
    ) -> Self {
        Self {
            message,
            command: command.into(),
            args,
            trigger,
            bot,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.message.chat_id
    }

    pub fn author(&self) -> Option<&User> {
        self.message.sender.as_ref()
    }

    pub fn author_id(&self) -> &str {
        self.message.author_id()
    }

    /// Argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(|s| s.as_str())
    }

    /// Everything after the command name, joined back with single spaces.
    pub fn rest(&self) -> String {
        self.args.join(" ")
    }

    pub fn bot(&self) -> &Arc<dyn Bot> {
        &self.bot
    }

    /// Send a message to the chat the command came from.
    pub async fn reply(&self, text: impl AsRef<str>) -> Result<(), CommandError> {
        self.bot
            .send_message(&self.message.chat_id, text.as_ref())
            .await
            .map(|_| ())
            .map_err(|e| CommandError::HandlerExecution(format!("failed to send reply: {}", e)))
    }

    /// Best-effort typing indicator.
    pub async fn typing(&self) {
        if let Err(e) = self.bot.send_typing(&self.message.chat_id).await {
            tracing::debug!("Typing indicator failed in {}: {}", self.message.chat_id, e);
        }
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("chat_id", &self.message.chat_id)
            .field("author", &self.message.author_id())
            .field("command", &self.command)
            .field("args", &self.args)
            .field("trigger", &self.trigger)
            .finish()
    }
}
