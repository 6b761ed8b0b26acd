//! Replays a Slack workspace export into Discord.
//!
//! [`export::ExportData`] turns the export's JSON files into the [`model`]
//! types, downloading hosted attachments on the way. [`replay::ReplayEngine`]
//! then posts a channel's history, threads included, through a
//! [`discord::ChatTarget`].

pub mod cli;
pub mod commands;
pub mod discord;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod logger;
pub mod model;
pub mod references;
pub mod replay;
pub mod settings;

pub use cli::{Cli, Commands};
pub use error::{AppError, Result};

/// Reports `(current, total, item)` while a long operation advances.
pub type ProgressCallback<'a> = Option<&'a dyn Fn(usize, usize, &str)>;

pub fn load_token() -> Result<String> {
    std::env::var("DISCORD_TOKEN")
        .ok()
        .filter(|t| !t.is_empty())
        .ok_or(AppError::MissingToken)
}
