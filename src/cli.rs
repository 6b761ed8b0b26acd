use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::settings::SETTINGS_FILE;

#[derive(Parser)]
#[command(name = "slack2discord")]
#[command(about = "Replay a Slack export into Discord channels")]
#[command(version)]
pub struct Cli {
    /// Directory holding users.json, channels.json and one folder per channel
    #[arg(long, env = "EXPORTED_DATA_DIR", global = true)]
    pub data_dir: Option<String>,

    /// Directory where attachments are downloaded before upload
    #[arg(long, env = "FILES_DIR", global = true)]
    pub files_dir: Option<String>,

    /// Slack token used to download hosted attachments
    #[arg(long, env = "SLACK_TOKEN", hide_env_values = true, global = true)]
    pub slack_token: Option<String>,

    /// Settings file path
    #[arg(long, default_value = SETTINGS_FILE, global = true)]
    pub config: String,

    /// Log verbosity (error, warn, info, debug, trace, off)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LevelFilter>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the users and channels found in the export
    List,

    /// Replay one Slack channel into a Discord channel
    Restore {
        /// Slack channel name or id
        #[arg(short, long)]
        channel: String,

        /// Discord channel id
        #[arg(short, long)]
        destination: String,
    },

    /// Replay every channel mapped in the [channels] section of the settings file
    RestoreAll,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_restore() {
        let cli = Cli::try_parse_from([
            "slack2discord",
            "--data-dir",
            "/export",
            "restore",
            "--channel",
            "general",
            "--destination",
            "1234",
        ])
        .unwrap();

        assert_eq!(cli.data_dir.as_deref(), Some("/export"));
        assert_eq!(cli.config, SETTINGS_FILE);
        match cli.command {
            Commands::Restore {
                channel,
                destination,
            } => {
                assert_eq!(channel, "general");
                assert_eq!(destination, "1234");
            }
            _ => panic!("expected restore command"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "slack2discord",
            "list",
            "--files-dir",
            "/files",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::List));
        assert_eq!(cli.files_dir.as_deref(), Some("/files"));
        assert_eq!(cli.log_level, Some(LevelFilter::Debug));
    }

    #[test]
    fn test_restore_requires_destination() {
        let result = Cli::try_parse_from(["slack2discord", "restore", "--channel", "general"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_slack_token_flag() {
        let cli = Cli::try_parse_from(["slack2discord", "list", "--slack-token", "xoxp-1"]).unwrap();
        assert_eq!(cli.slack_token.as_deref(), Some("xoxp-1"));
    }

    #[test]
    fn test_parse_restore_all() {
        let cli = Cli::try_parse_from(["slack2discord", "restore-all", "--config", "other.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::RestoreAll));
        assert_eq!(cli.config, "other.toml");
    }
}
