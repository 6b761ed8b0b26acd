use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::replay::OVERSIZE_NOTE;

pub const SETTINGS_FILE: &str = "settings.toml";

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 2000;
pub const DEFAULT_THROTTLE_MS: u64 = 1000;
pub const DEFAULT_THREAD_NAME: &str = "Replies";
pub const DEFAULT_DATE_FORMAT: &str = "%y/%m/%d %H:%M:%S";

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub export: ExportSettings,
    #[serde(default)]
    pub discord: DiscordSettings,
    /// Slack channel name or id -> Discord channel id
    #[serde(default)]
    pub channels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportSettings {
    #[serde(default, rename = "data-dir")]
    pub data_dir: Option<String>,
    #[serde(default, rename = "files-dir")]
    pub files_dir: Option<String>,
    #[serde(default, rename = "slack-token")]
    pub slack_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordSettings {
    #[serde(default = "default_api_base", rename = "api-base")]
    pub api_base: String,
    #[serde(default = "default_max_message_length", rename = "max-message-length")]
    pub max_message_length: usize,
    #[serde(default = "default_throttle_ms", rename = "throttle-ms")]
    pub throttle_ms: u64,
    #[serde(default = "default_thread_name", rename = "thread-name")]
    pub thread_name: String,
    #[serde(default = "default_date_format", rename = "date-format")]
    pub date_format: String,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_max_message_length() -> usize {
    DEFAULT_MAX_MESSAGE_LENGTH
}

fn default_throttle_ms() -> u64 {
    DEFAULT_THROTTLE_MS
}

fn default_thread_name() -> String {
    DEFAULT_THREAD_NAME.to_string()
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            max_message_length: default_max_message_length(),
            throttle_ms: default_throttle_ms(),
            thread_name: default_thread_name(),
            date_format: default_date_format(),
        }
    }
}

impl DiscordSettings {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// Smallest accepted `max-message-length`: the oversize note must fit twice
    /// into one segment.
    pub fn min_message_length() -> usize {
        2 * OVERSIZE_NOTE.chars().count() + 1
    }

    fn validate(&self) -> Result<()> {
        let minimum = Self::min_message_length();
        if self.max_message_length < minimum {
            return Err(AppError::InvalidSetting(format!(
                "max-message-length must be at least {}, got {}",
                minimum, self.max_message_length
            )));
        }
        Ok(())
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| AppError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(content).map_err(|e| AppError::TomlParse(e.to_string()))?;
        settings.discord.validate()?;
        Ok(settings)
    }
}
