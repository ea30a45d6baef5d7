//! Message dispatcher - Routes messages to the command registry

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::application::errors::CommandError;
use crate::application::registry::CommandRegistry;
use crate::domain::entities::Message;
use crate::domain::traits::Bot;
use super::parser::{MessageParser, SharedPrefix};

/// How long [`MessageDispatcher::serve`] waits for running commands after it
/// stops taking messages
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Neither a mention nor prefixed; never reached the registry.
    NotRouted,
    /// Routed, but no command accepted it.
    Ignored,
    /// The named command ran to completion.
    Executed(String),
    /// The command failed; one error reply was sent to the chat.
    Failed(CommandError),
}

/// Host-facing edge: classifies messages and turns command failures into
/// chat replies.
#[derive(Clone)]
pub struct MessageDispatcher {
    parser: Arc<MessageParser>,
    registry: CommandRegistry,
    bot: Arc<dyn Bot>,
}

impl MessageDispatcher {
    pub fn new(registry: CommandRegistry, bot: Arc<dyn Bot>, prefix: SharedPrefix) -> Self {
        let parser = MessageParser::new(prefix, &bot.bot_info());
        Self {
            parser: Arc::new(parser),
            registry,
            bot,
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Process one inbound message.
    ///
    /// Never fails: every recoverable error is reported to the origin chat.
    pub async fn dispatch(&self, message: Message) -> DispatchOutcome {
        let Some((trigger, routed)) = self.parser.classify(&message) else {
            return DispatchOutcome::NotRouted;
        };

        tracing::debug!(
            "[{}] {} ({:?}): {}",
            message.chat_id,
            message.author_id(),
            trigger,
            routed
        );

        let chat_id = message.chat_id.clone();
        match self
            .registry
            .resolve_and_dispatch(&routed, trigger, message, self.bot.clone())
            .await
        {
            Ok(Some(command)) => DispatchOutcome::Executed(command),
            Ok(None) => DispatchOutcome::Ignored,
            Err(err) => {
                tracing::warn!("[{}] Command failed: {}", chat_id, err);
                if let Err(e) = self.bot.send_message(&chat_id, &err.user_message()).await {
                    tracing::error!("Failed to report error to {}: {}", chat_id, e);
                }
                DispatchOutcome::Failed(err)
            }
        }
    }

    /// Dispatch every message from `inbox` on its own task until the inbox
    /// closes or `stop` resolves.
    ///
    /// Commands already running are awaited before this returns, for at most
    /// `drain_timeout`; whatever is left after that is aborted. Tearing the
    /// registry down is safe once this returns.
    pub async fn serve<S>(&self, mut inbox: mpsc::Receiver<Message>, stop: S, drain_timeout: Duration)
    where
        S: Future<Output = ()>,
    {
        let mut tasks = JoinSet::new();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                inbound = inbox.recv() => {
                    let Some(message) = inbound else {
                        tracing::info!("Message source closed");
                        break;
                    };
                    let dispatcher = self.clone();
                    tasks.spawn(async move {
                        if let DispatchOutcome::Executed(command) = dispatcher.dispatch(message).await {
                            tracing::debug!("Ran {}", command);
                        }
                    });
                }
                Some(done) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = done {
                        tracing::error!("Dispatch task failed: {}", e);
                    }
                }
                _ = &mut stop => break,
            }
        }

        if tasks.is_empty() {
            return;
        }

        tracing::info!("Waiting for {} running command(s)", tasks.len());
        let drain = async {
            while let Some(done) = tasks.join_next().await {
                if let Err(e) = done {
                    tracing::error!("Dispatch task failed: {}", e);
                }
            }
        };
        if tokio::time::timeout(drain_timeout, drain).await.is_err() {
            tracing::warn!("Abandoning {} command(s) still running", tasks.len());
            tasks.abort_all();
        }
    }
}
