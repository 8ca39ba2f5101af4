//! Parley CLI: the main entry point.
//!
//! Commands:
//! - `discord`: Run the Discord bot until Ctrl-C
//! - `chat`   : Talk to the agent from the terminal
//! - `ask`    : One-shot question, no memory or tools
//! - `config` : Show or initialize the configuration
//! - `doctor` : Check credentials and model health

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Parley: a Discord chat agent with per-channel memory and tools",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.parley/config.toml)
    #[arg(short, long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Discord bot
    Discord,

    /// Interactive chat in the terminal
    Chat,

    /// Ask a single question
    Ask {
        /// The question
        #[arg(required = true, trailing_var_arg = true)]
        message: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose configuration and connectivity
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration with secrets redacted
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config_path = cli.config.unwrap_or_else(commands::default_config_path);

    match cli.command {
        Commands::Discord => commands::discord::run(&config_path).await?,
        Commands::Chat => commands::chat::run(&config_path).await?,
        Commands::Ask { message } => commands::ask::run(&config_path, &message.join(" ")).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&config_path)?,
            ConfigAction::Init { force } => commands::config_cmd::init(&config_path, force)?,
            ConfigAction::Path => commands::config_cmd::path(&config_path),
        },
        Commands::Doctor => commands::doctor::run(&config_path).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
