//! Telegram adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::application::errors::BotError;
use crate::domain::entities::{self, Attachment};
use crate::domain::traits::{Bot, BotInfo};

/// Telegram API base URL
const API_BASE: &str = "https://api.telegram.org";

/// Long-poll timeout passed to getUpdates, in seconds
const POLL_TIMEOUT: i64 = 30;

/// Telegram update type
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub entities: Option<Vec<MessageEntity>>,
    pub document: Option<Document>,
    pub reply_to_message: Option<Box<Message>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
}

impl From<&User> for entities::User {
    fn from(user: &User) -> Self {
        entities::User {
            id: user.id.to_string(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            is_bot: user.is_bot,
        }
    }
}

/// Telegram bot adapter
pub struct TelegramAdapter {
    token: String,
    client: Client,
    info: BotInfo,
}

impl TelegramAdapter {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            client: Client::new(),
            info: BotInfo {
                id: "unknown".to_string(),
                name: "kelola-bot".to_string(),
                username: "kelola_bot".to_string(),
            },
        }
    }

    /// Get the API URL for a method
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.token, method)
    }

    /// Fetch bot info from Telegram API
    pub async fn fetch_bot_info(&mut self) -> Result<(), BotError> {
        #[derive(Deserialize)]
        struct Response {
            result: BotInfoResponse,
        }

        #[derive(Deserialize)]
        struct BotInfoResponse {
            id: i64,
            first_name: String,
            username: String,
        }

        let url = self.api_url("getMe");
        let response = self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BotError::Network(format!("Telegram API error: {}", response.status())));
        }

        let data: Response = response
            .json()
            .await
            .map_err(|e| BotError::Parse(e.to_string()))?;

        self.info = BotInfo {
            id: data.result.id.to_string(),
            name: data.result.first_name,
            username: data.result.username,
        };

        Ok(())
    }

    /// Get updates from Telegram using getUpdates API
    pub async fn get_updates(&self, offset: i64, timeout: i64) -> Result<Vec<Update>, BotError> {
        #[derive(Serialize)]
        struct GetUpdatesRequest {
            offset: i64,
            timeout: i64,
            allowed_updates: Vec<String>,
        }

        #[derive(Deserialize)]
        struct Response {
            result: Vec<Update>,
        }

        let url = self.api_url("getUpdates");
        let request = GetUpdatesRequest {
            offset,
            timeout,
            allowed_updates: vec!["message".to_string()],
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BotError::Network(format!("Telegram API error: {}", response.status())));
        }

        let data: Response = response
            .json()
            .await
            .map_err(|e| BotError::Parse(e.to_string()))?;

        Ok(data.result)
    }

    /// Get the next update offset
    pub fn get_next_offset(updates: &[Update]) -> i64 {
        updates.iter()
            .map(|u| u.update_id + 1)
            .max()
            .unwrap_or(0)
    }

    /// Convert a Telegram message into the platform-neutral form.
    ///
    /// Replies to the bot and `text_mention` entities naming the bot count as
    /// mentions; `@username` mentions are left in the text for the parser.
    pub fn to_message(&self, msg: &Message) -> Option<entities::Message> {
        let text = msg.text.as_ref().or(msg.caption.as_ref())?;
        let mut message = entities::Message::new(msg.chat.id.to_string(), text.clone())
            .with_platform("telegram");

        if let Some(from) = &msg.from {
            message = message.with_sender(from.into());
        }

        for entity in msg.entities.iter().flatten() {
            if entity.kind == "text_mention" {
                if let Some(user) = &entity.user {
                    message = message.with_mention(user.id.to_string());
                }
            }
        }

        let replied_to_bot = msg
            .reply_to_message
            .as_ref()
            .and_then(|r| r.from.as_ref())
            .map(|u| u.id.to_string() == self.info.id)
            .unwrap_or(false);
        if replied_to_bot {
            message = message.with_mention(self.info.id.clone());
        }

        if let Some(doc) = &msg.document {
            message = message.with_attachment(Attachment {
                url: doc.file_id.clone(),
                filename: doc.file_name.clone(),
            });
        }

        if let Ok(raw) = serde_json::to_value(msg) {
            message = message.with_raw(raw);
        }

        Some(message)
    }

    /// Long-poll for updates and forward text messages until the receiver
    /// goes away.
    pub async fn listen(&self, tx: mpsc::Sender<entities::Message>) -> Result<(), BotError> {
        let mut offset = 0;
        loop {
            let updates = match self.get_updates(offset, POLL_TIMEOUT).await {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!("Failed to fetch updates: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };

            if !updates.is_empty() {
                offset = Self::get_next_offset(&updates);
            }

            for update in &updates {
                let Some(message) = update.message.as_ref().and_then(|m| self.to_message(m)) else {
                    continue;
                };
                if tx.send(message).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    /// Send a message via Telegram API - try MarkdownV2, fallback to plain
    pub async fn send_message_api(&self, chat_id: &str, text: &str) -> Result<String, BotError> {
        match self.send_message_with_format(chat_id, text, Some("MarkdownV2")).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::debug!("Markdown failed, using plain text: {}", e);
                self.send_message_with_format(chat_id, text, None).await
            }
        }
    }

    /// Send a message with specific parse mode
    pub async fn send_message_with_format(&self, chat_id: &str, text: &str, parse_mode: Option<&str>) -> Result<String, BotError> {
        #[derive(Serialize)]
        struct SendMessageRequest {
            chat_id: String,
            text: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            parse_mode: Option<String>,
        }

        #[derive(Deserialize)]
        struct Response {
            result: MessageResult,
        }

        #[derive(Deserialize)]
        struct MessageResult {
            message_id: i64,
        }

        let url = self.api_url("sendMessage");
        let request = SendMessageRequest {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            parse_mode: parse_mode.map(|s| s.to_string()),
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BotError::Network(format!("Telegram API error: {}", response.status())));
        }

        let data: Response = response
            .json()
            .await
            .map_err(|e| BotError::Parse(e.to_string()))?;

        Ok(data.result.message_id.to_string())
    }

    /// Send chat action (typing, upload_photo, etc.)
    pub async fn send_chat_action(&self, chat_id: &str, action: &str) -> Result<(), BotError> {
        #[derive(Serialize)]
        struct SendChatActionRequest {
            chat_id: String,
            action: String,
        }

        let url = self.api_url("sendChatAction");
        let request = SendChatActionRequest {
            chat_id: chat_id.to_string(),
            action: action.to_string(),
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BotError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BotError::Network(format!("Chat action error: {}", response.status())));
        }

        Ok(())
    }
}

#[async_trait]
impl Bot for TelegramAdapter {
    async fn start(&self) -> Result<(), BotError> {
        tracing::info!("Starting Telegram bot (token: {}...)", &self.token[..8.min(self.token.len())]);
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<String, BotError> {
        tracing::debug!("Sending to {}: {}", chat_id, text);
        match self.send_message_api(chat_id, text).await {
            Ok(msg_id) => Ok(msg_id),
            Err(e) => {
                tracing::error!("Failed to send message: {}", e);
                Err(e)
            }
        }
    }

    async fn send_typing(&self, chat_id: &str) -> Result<(), BotError> {
        self.send_chat_action(chat_id, "typing").await
    }

    fn bot_info(&self) -> BotInfo {
        self.info.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> TelegramAdapter {
        let mut adapter = TelegramAdapter::new("123456:token");
        adapter.info.id = "999".to_string();
        adapter
    }

    fn update(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_next_offset() {
        let updates = vec![
            update(r#"{"update_id": 10}"#),
            update(r#"{"update_id": 12}"#),
        ];
        assert_eq!(TelegramAdapter::get_next_offset(&updates), 13);
        assert_eq!(TelegramAdapter::get_next_offset(&[]), 0);
    }

    #[test]
    fn test_converts_text_message() {
        let u = update(
            r#"{"update_id": 1, "message": {"message_id": 5, "chat": {"id": -100},
                "from": {"id": 42, "username": "alice", "first_name": "Alice"},
                "text": "!uptime"}}"#,
        );
        let msg = adapter().to_message(u.message.as_ref().unwrap()).unwrap();
        assert_eq!(msg.chat_id, "-100");
        assert_eq!(msg.author_id(), "42");
        assert_eq!(msg.text, "!uptime");
        assert!(msg.mentions.is_empty());
    }

    #[test]
    fn test_reply_to_bot_counts_as_mention() {
        let u = update(
            r#"{"update_id": 1, "message": {"message_id": 6, "chat": {"id": 1},
                "from": {"id": 42}, "text": "uptime",
                "reply_to_message": {"message_id": 4, "chat": {"id": 1},
                    "from": {"id": 999, "is_bot": true}, "text": "hi"}}}"#,
        );
        let msg = adapter().to_message(u.message.as_ref().unwrap()).unwrap();
        assert!(msg.mentions_user("999"));
    }

    #[test]
    fn test_non_text_message_is_skipped() {
        let u = update(r#"{"update_id": 1, "message": {"message_id": 7, "chat": {"id": 1}}}"#);
        assert!(adapter().to_message(u.message.as_ref().unwrap()).is_none());
    }
}
