//! Binary entry point: parse CLI args, load config, wire up logging and the
//! database connection, then dispatch to the command handlers.

use abathur_queue::adapters::sqlite::initialize_database;
use abathur_queue::cli::commands::{mem, swarm, task};
use abathur_queue::cli::{Cli, Commands};
use abathur_queue::infrastructure::{Config, ConfigLoader, LoggerImpl};
use anyhow::{Context, Result};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load().context("failed to load configuration")?;
    let _logger = LoggerImpl::init(&config.log).context("failed to initialize logging")?;

    let database_url = format!("sqlite://{}", config.database_path);
    let pool = initialize_database(&database_url)
        .await
        .context("failed to initialize database")?;

    run_command(cli, pool, &config).await
}

async fn run_command(cli: Cli, pool: sqlx::SqlitePool, config: &Config) -> Result<()> {
    match cli.command {
        Commands::Swarm(args) => swarm::execute(args, pool, config, cli.json).await,
        Commands::Task(args) => task::execute(args, pool, config, cli.json).await,
        Commands::Mem(args) => mem::execute(args, pool, cli.json).await,
    }
}
