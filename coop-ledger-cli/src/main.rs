use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{
    seed_identity, AccrueCommand, ConfigCommand, DataCommand, FlockCommand, InventoryCommand,
    StoreCommand, WhoamiCommand,
};
use config::Config;
use coop_ledger_core::{Context, FileStore};

#[derive(Parser)]
#[command(name = "coop")]
#[command(version)]
#[command(about = "Flock and feed records for a small poultry farm", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage flock members
    Flock(FlockCommand),

    /// Manage inventory and auto-feed
    Inventory(InventoryCommand),

    /// Deduct feed eaten since the last pass
    Accrue(AccrueCommand),

    /// Show or set who changes are recorded as
    Whoami(WhoamiCommand),

    /// Inspect raw stored values
    Store(StoreCommand),

    /// Reset farm data
    Data(DataCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for config commands
    let cli_config_path = cli.config.clone();

    let config = Config::load(cli.config)?;

    execute_command(&cli.command, &config, cli_config_path)
}

fn execute_command(
    command: &Option<Commands>,
    config: &Config,
    cli_config_path: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::new(config.data_dir.value.clone());
    let open_context = || {
        let context = Context::standalone(store.clone());
        seed_identity(&context, config);
        context
    };

    match command {
        Some(Commands::Flock(cmd)) => {
            cmd.run(&open_context())?;
        }
        Some(Commands::Inventory(cmd)) => {
            cmd.run(&open_context())?;
        }
        Some(Commands::Accrue(cmd)) => {
            cmd.run(&open_context(), config)?;
        }
        Some(Commands::Whoami(cmd)) => {
            cmd.run(&open_context())?;
        }
        Some(Commands::Store(cmd)) => {
            cmd.run(&store)?;
        }
        Some(Commands::Data(cmd)) => {
            cmd.run(&open_context())?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(config, cli_config_path)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
