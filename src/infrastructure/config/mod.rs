//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::application::errors::ConfigError;

/// Bot configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub plugins: PluginConfig,
    pub storage: StorageConfig,
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
    /// Command prefix. Owner commands answer to the prefix only; a Telegram
    /// `/cmd@bot` counts as a mention and is ignored by them.
    pub prefix: String,
    /// Actor granted Owner when the permission table starts out empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "kelola-bot".to_string(),
            prefix: "!".to_string(),
            owner_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PluginConfig {
    pub directory: PathBuf,
    pub auto_load: bool,
    /// Dynamic library extension, without the dot
    pub extension: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./modules"),
            auto_load: true,
            extension: std::env::consts::DLL_EXTENSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    pub permissions_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            permissions_path: PathBuf::from("permissions.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AdaptersConfig {
    pub telegram: Option<TelegramConfig>,
    pub console: Option<ConsoleConfig>,
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            telegram: Some(TelegramConfig::default()),
            console: Some(ConsoleConfig::default()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Actor id attached to lines typed at the console
    pub user_id: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_id: "console".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config {}: {}", path.display(), e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let yaml = self.to_yaml()?;
        std::fs::write(path.as_ref(), yaml)
            .map_err(|e| ConfigError::Parse(format!("Failed to write config: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))
    }

    /// Defaults with environment overrides applied.
    pub fn load_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Overlay `BOT_TOKEN`, `BOT_PREFIX` and `BOT_OWNER_ID` when set.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("BOT_TOKEN") {
            self.set_token(token);
        }

        if let Ok(prefix) = std::env::var("BOT_PREFIX") {
            self.bot.prefix = prefix;
        }

        if let Ok(owner) = std::env::var("BOT_OWNER_ID") {
            if !owner.trim().is_empty() {
                self.bot.owner_id = Some(owner.trim().to_string());
            }
        }
    }

    /// Set the Telegram token and enable the adapter.
    pub fn set_token(&mut self, token: impl Into<String>) {
        let tg = self.adapters.telegram.get_or_insert_with(TelegramConfig::default);
        tg.token = Some(token.into());
        tg.enabled = true;
    }

    /// Token of the Telegram adapter when it is enabled.
    pub fn telegram_token(&self) -> Option<&str> {
        self.adapters
            .telegram
            .as_ref()
            .filter(|tg| tg.enabled)
            .and_then(|tg| tg.token.as_deref())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.prefix.is_empty() {
            return Err(ConfigError::InvalidValue("bot.prefix: prefix must not be empty".to_string()));
        }

        if self.bot.prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue("bot.prefix: prefix must not contain whitespace".to_string()));
        }

        if let Some(tg) = &self.adapters.telegram {
            let has_token = tg.token.as_deref().map(|t| !t.trim().is_empty()).unwrap_or(false);
            if tg.enabled && !has_token {
                return Err(ConfigError::MissingField("adapters.telegram.token".to_string()));
            }
        }

        if self.plugins.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::InvalidValue("plugins.extension: extension must not be empty".to_string()));
        }

        Ok(())
    }
}
