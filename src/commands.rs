use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::discord::{ChatTarget, Destination, DiscordClient};
use crate::error::{AppError, Result};
use crate::export::ExportData;
use crate::fetcher::{FileFetcher, HttpFetcher};
use crate::load_token;
use crate::model::Channel;
use crate::replay::{ReplayEngine, ReplayOptions, ReplaySummary, ThreadSleep};
use crate::settings::Settings;

const DEFAULT_FILES_DIR: &str = "files";

/// Settings and export locations resolved from flags, environment and settings file.
#[derive(Debug)]
pub struct RunContext {
    pub settings: Settings,
    pub data_dir: PathBuf,
    pub files_dir: PathBuf,
    pub slack_token: Option<String>,
}

impl RunContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let settings = Settings::load(Path::new(&cli.config))?;

        let data_dir = cli
            .data_dir
            .clone()
            .or_else(|| settings.export.data_dir.clone())
            .map(PathBuf::from)
            .ok_or_else(|| {
                AppError::MissingSetting(
                    "export directory (--data-dir, EXPORTED_DATA_DIR or [export] data-dir)"
                        .to_string(),
                )
            })?;

        let files_dir = cli
            .files_dir
            .clone()
            .or_else(|| settings.export.files_dir.clone())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FILES_DIR));

        let slack_token = cli
            .slack_token
            .clone()
            .or_else(|| settings.export.slack_token.clone());

        Ok(Self {
            settings,
            data_dir,
            files_dir,
            slack_token,
        })
    }
}

pub fn run_list(ctx: &RunContext) -> Result<()> {
    let export = ExportData::load(&ctx.data_dir, &ctx.files_dir)?;

    println!("USERS");
    for (i, user) in export.users.iter().enumerate() {
        println!("{}. {}", i + 1, user.display_name);
    }

    println!("CHANNELS");
    for (i, channel) in export.channels.iter().enumerate() {
        println!("{}. {} {}", i + 1, channel.id, channel.name);
    }
    Ok(())
}

pub fn run_restore(ctx: &RunContext, channel_key: &str, destination: &str) -> Result<()> {
    let client = DiscordClient::new(&ctx.settings.discord.api_base, &load_token()?)?;
    let fetcher = HttpFetcher::new(ctx.slack_token.clone())?;

    let plan = vec![(channel_key.to_string(), Destination(destination.to_string()))];
    restore_channels(ctx, &client, &fetcher, &plan)?;
    Ok(())
}

pub fn run_restore_all(ctx: &RunContext) -> Result<()> {
    if ctx.settings.channels.is_empty() {
        return Err(AppError::MissingSetting(
            "no channels mapped in the [channels] section of the settings file".to_string(),
        ));
    }

    let client = DiscordClient::new(&ctx.settings.discord.api_base, &load_token()?)?;
    let fetcher = HttpFetcher::new(ctx.slack_token.clone())?;

    let plan: Vec<(String, Destination)> = ctx
        .settings
        .channels
        .iter()
        .map(|(key, destination)| (key.clone(), Destination(destination.clone())))
        .collect();
    restore_channels(ctx, &client, &fetcher, &plan)?;
    Ok(())
}

/// Builds the model for the planned channels, then replays them in export order.
/// `plan` pairs a Slack channel name or id with its destination.
pub fn restore_channels(
    ctx: &RunContext,
    target: &dyn ChatTarget,
    fetcher: &dyn FileFetcher,
    plan: &[(String, Destination)],
) -> Result<Vec<ReplaySummary>> {
    let mut export = ExportData::load(&ctx.data_dir, &ctx.files_dir)?;

    let mut selected: Vec<(String, Destination)> = Vec::new();
    for (key, destination) in plan {
        let channel = export
            .channels
            .find(key)
            .ok_or_else(|| AppError::UnknownChannel(key.clone()))?;
        selected.push((channel.id.clone(), destination.clone()));
    }
    let order: Vec<String> = export.channels.ids();
    selected.sort_by_key(|(id, _)| order.iter().position(|o| o == id));

    let mut parsed: HashSet<&str> = HashSet::new();
    for (channel_id, _) in &selected {
        if !parsed.insert(channel_id.as_str()) {
            continue;
        }
        let count = export.parse_channel(
            channel_id,
            fetcher,
            Some(&|current, total, name| {
                log::info!("  [{}/{}] {}", current, total, name);
            }),
        )?;
        log::info!("Parsed {} messages", count);
    }

    let throttle = ThreadSleep(ctx.settings.discord.throttle());
    let options = ReplayOptions::from(&ctx.settings.discord);

    let mut summaries = Vec::new();
    for (channel_id, destination) in &selected {
        let channel = export
            .channels
            .get(channel_id)
            .ok_or_else(|| AppError::UnknownChannel(channel_id.clone()))?;
        summaries.push(replay_channel(
            target,
            &throttle,
            options.clone(),
            channel,
            destination,
        )?);
    }
    Ok(summaries)
}

fn replay_channel(
    target: &dyn ChatTarget,
    throttle: &ThreadSleep,
    options: ReplayOptions,
    channel: &Channel,
    destination: &Destination,
) -> Result<ReplaySummary> {
    log::info!("Restore slack/#{} -> discord/{}", channel.name, destination);

    let summary = ReplayEngine::new(target, throttle, options).replay(channel, destination)?;

    log::info!("Restore of #{} completed: {}", channel.name, summary);
    Ok(summary)
}
