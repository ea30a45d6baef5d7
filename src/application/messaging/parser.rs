//! Message parser - Decides whether a message is a command attempt

use std::sync::Arc;

use parking_lot::RwLock;
use regex_lite::Regex;

use crate::domain::entities::{Message, Trigger};
use crate::domain::traits::BotInfo;

/// Command prefix shared between the parser and the `changeprefix` command.
pub type SharedPrefix = Arc<RwLock<String>>;

/// A command name with its whitespace-delimited arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// Split routed text into the command name and its arguments.
///
/// Returns `None` when the text holds no tokens at all.
pub fn split_command(raw: &str) -> Option<ParsedCommand> {
    let mut parts = raw.split_whitespace();
    let name = parts.next()?.to_string();
    let args = parts.map(|s| s.to_string()).collect();
    Some(ParsedCommand { name, args })
}

/// Classifies inbound messages by trigger and strips the routing syntax
pub struct MessageParser {
    prefix: SharedPrefix,
    bot_id: String,
    mention: Option<Regex>,
}

impl MessageParser {
    pub fn new(prefix: SharedPrefix, bot: &BotInfo) -> Self {
        let mut pattern = format!(r"<@!?{}>", regex_lite::escape(&bot.id));
        if !bot.username.is_empty() {
            pattern.push_str(&format!(r"|(?i:@{})\b", regex_lite::escape(&bot.username)));
        }

        let mention = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Mention pattern for {} rejected: {}", bot.username, e);
                None
            }
        };

        Self {
            prefix,
            bot_id: bot.id.clone(),
            mention,
        }
    }

    pub fn prefix(&self) -> String {
        self.prefix.read().clone()
    }

    /// Decide the trigger class of a message and return the routed text.
    ///
    /// A mention of the bot wins over the prefix. That includes the Telegram
    /// group form `/cmd@bot`, which is routed as a `DirectMention` and so
    /// never reaches commands that only accept the prefix. Messages that are
    /// neither mentions nor prefixed, and the bot's own messages, yield `None`.
    pub fn classify(&self, message: &Message) -> Option<(Trigger, String)> {
        if message.author_id() == self.bot_id {
            return None;
        }

        let text = message.text.trim();
        let mentioned_in_text = self
            .mention
            .as_ref()
            .map(|re| re.is_match(text))
            .unwrap_or(false);

        if mentioned_in_text || message.mentions_user(&self.bot_id) {
            let routed = match &self.mention {
                Some(re) => re.replace_all(text, " ").trim().to_string(),
                None => text.to_string(),
            };
            // `/uptime@bot` style: the prefix rides along with the mention
            let prefix = self.prefix.read();
            let routed = match routed.strip_prefix(prefix.as_str()) {
                Some(rest) if !prefix.is_empty() => rest.to_string(),
                _ => routed,
            };
            return Some((Trigger::DirectMention, routed));
        }

        let prefix = self.prefix.read();
        if !prefix.is_empty() && text.starts_with(prefix.as_str()) {
            return Some((Trigger::PrefixedMessage, text[prefix.len()..].to_string()));
        }

        None
    }
}
