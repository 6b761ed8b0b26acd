use clap::Parser;
use slack2discord::commands::{self, RunContext};
use slack2discord::{Cli, Commands};

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    slack2discord::logger::init_logger(cli.log_level);

    let result = RunContext::from_cli(&cli).and_then(|ctx| match &cli.command {
        Commands::List => commands::run_list(&ctx),
        Commands::Restore {
            channel,
            destination,
        } => commands::run_restore(&ctx, channel, destination),
        Commands::RestoreAll => commands::run_restore_all(&ctx),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
