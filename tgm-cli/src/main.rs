//! CLI entry point for tgm

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use tgm_channels::{mumble, telegram, MumbleSide, TelegramBot, TelegramSide};
use tgm_core::config::{Config, ConfigLoader};
use tgm_core::logging::init_logging;
use tgm_core::Bridge;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tgm")]
#[command(about = "Bridge between a Telegram group and a Mumble server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short = 'd', long, global = true)]
    config_dir: Option<PathBuf>,

    /// Configuration file, takes precedence over --config-dir
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge until Ctrl+C or a fatal error
    Run,
    /// Validate the configuration and print a summary
    Check,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    fn config_loader(&self) -> ConfigLoader {
        match (&self.config, &self.config_dir) {
            (Some(file), _) => ConfigLoader::with_file(file),
            (None, Some(dir)) => ConfigLoader::with_dir(dir),
            (None, None) => ConfigLoader::new(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loader = cli.config_loader();

    match cli.command {
        Commands::Run => run_bridge(&loader).await,
        Commands::Check => run_check(&loader),
        Commands::Init { force } => run_init(&loader, force),
    }
}

/// Connect both sides and run the bridge
///
/// A fatal source error is returned, which makes the process exit with a
/// non-zero code after the log writer has been flushed.
async fn run_bridge(loader: &ConfigLoader) -> Result<()> {
    let config = loader.load()?;
    let _log_guard = init_logging(&config.logging);

    println!("{}", style("Starting tgm bridge...").bold().cyan());

    let bot = TelegramBot::new(&config.telegram.bot_key);
    let username = bot.verify().await?;
    let (voice, events) = mumble::connect(&config.mumble).await?;

    println!("Telegram bot: @{}", username);
    println!(
        "Mumble server: {} ({})",
        voice.server_id(),
        config.mumble.grpc_address
    );

    let bridge = Bridge::from_config(&config.bridge);
    let cancel = bridge.cancellation_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Shutdown requested");
        cancel.cancel();
    });

    let mut polling = bot.polling();
    let updates = telegram::update_stream(&mut polling);
    let telegram_side = TelegramSide::new(bot.clone(), &config.telegram, &username);
    let mumble_side = MumbleSide::new(voice);

    println!(
        "\n{}",
        style("Bridge is running. Press Ctrl+C to stop.").green()
    );

    match bridge
        .run(telegram_side, updates, mumble_side, events)
        .await
    {
        Ok(()) => {
            println!("\n{}", style("Bridge stopped.").green());
            Ok(())
        }
        Err(e) => {
            error!("Bridge failed: {}", e);
            Err(e.into())
        }
    }
}

fn run_check(loader: &ConfigLoader) -> Result<()> {
    let config = loader.load()?;

    println!("{}", style("Configuration OK").bold().green());
    println!("  File: {}", loader.config_path().display());
    println!();

    println!("{}", style("Telegram:").bold());
    println!("  Owner chat: {}", config.telegram.owner_id);
    println!("  Group chat: {}", config.telegram.group_id);
    println!(
        "  Request timeout: {}s",
        config.telegram.request_timeout_secs
    );
    println!();

    println!("{}", style("Mumble:").bold());
    println!("  gRPC address: {}", config.mumble.grpc_address);
    match config.mumble.server_id {
        Some(id) => println!("  Server: {}", id),
        None => println!("  Server: {}", style("first available").dim()),
    }
    println!();

    println!("{}", style("Bridge:").bold());
    println!("  Queue capacity: {}", config.bridge.queue_capacity);
    println!(
        "  Logs: {} ({})",
        config.logging.dir, config.logging.level
    );

    Ok(())
}

fn run_init(loader: &ConfigLoader, force: bool) -> Result<()> {
    let path = loader.config_path();
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, use --force to overwrite",
            path.display()
        );
    }

    loader.save(&Config::default())?;

    println!(
        "{} Wrote {}",
        style("✓").green().bold(),
        path.display()
    );
    println!(
        "Fill in telegram.bot_key, telegram.owner_id and telegram.group_id, then run {}",
        style("tgm check").cyan()
    );
    Ok(())
}
