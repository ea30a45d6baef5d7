//! Console adapter for development/testing

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::application::errors::BotError;
use crate::domain::entities::{Message, User};
use crate::domain::traits::{Bot, BotInfo};

/// Chat id used for every console message
pub const CONSOLE_CHAT: &str = "console";

/// Console bot adapter for local development
pub struct ConsoleAdapter {
    info: BotInfo,
    user_id: String,
}

impl ConsoleAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            info: BotInfo {
                id: "kelola-console".to_string(),
                name: name.into(),
                username: "kelola".to_string(),
            },
            user_id: "console".to_string(),
        }
    }

    /// Actor id attached to typed lines.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Turn one typed line into an inbound message.
    pub fn to_message(&self, line: &str) -> Message {
        Message::new(CONSOLE_CHAT, line.trim())
            .with_sender(User::new(self.user_id.clone()).with_name("console"))
            .with_platform("console")
    }

    /// Forward stdin lines until EOF or until the receiver goes away.
    pub async fn listen(&self, tx: mpsc::Sender<Message>) -> Result<(), BotError> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|e| BotError::Internal(format!("stdin: {}", e)))?;
            let Some(line) = line else {
                tracing::info!("Console input closed");
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }
            if tx.send(self.to_message(&line)).await.is_err() {
                return Ok(());
            }
        }
    }
}

impl Default for ConsoleAdapter {
    fn default() -> Self {
        Self::new("kelola-bot")
    }
}

#[async_trait]
impl Bot for ConsoleAdapter {
    async fn start(&self) -> Result<(), BotError> {
        tracing::info!("Starting console bot (dev mode) as {}", self.user_id);
        Ok(())
    }

    async fn send_message(&self, _chat_id: &str, text: &str) -> Result<String, BotError> {
        println!("[BOT] {}", text);
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn send_typing(&self, _chat_id: &str) -> Result<(), BotError> {
        println!("[BOT] ...");
        Ok(())
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}
