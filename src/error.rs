use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("DISCORD_TOKEN environment variable not set")]
    MissingToken,

    #[error("failed to read file at {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file at {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to list directory {path}: {message}")]
    ListDir { path: String, message: String },

    #[error("JSON parse error in {path}: {message}")]
    JsonParse { path: String, message: String },

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("failed to download {url}: {message}")]
    Download { url: String, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Discord API error ({status}): {message}")]
    DiscordApi { status: u16, message: String },

    #[error("Discord rejected the payload as too large")]
    PayloadTooLarge,

    #[error("Discord rate limit error: retry after {retry_after_secs}s")]
    DiscordRateLimit { retry_after_secs: u64 },

    #[error("no channel named or identified by '{0}' in the export")]
    UnknownChannel(String),

    #[error("missing configuration: {0}")]
    MissingSetting(String),

    #[error("invalid configuration: {0}")]
    InvalidSetting(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Whether the replay engine may retry the send without attachments.
    pub fn is_payload_too_large(&self) -> bool {
        matches!(self, AppError::PayloadTooLarge)
    }
}
