pub mod commands;
pub mod io;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colloquy_core::config::{AppConfig, EngineMode, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "colloquy",
    about = "Colloquy dialogue runner CLI",
    long_about = "Run slot-filling dialogues against a dialogue tree, lint tree definitions, and inspect effective configuration.",
    after_help = "Examples:\n  colloquy run demos/birth-date.json\n  colloquy run --mode remote demos/onboarding.json\n  colloquy check demos/onboarding.json\n  colloquy config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run a dialogue tree interactively on stdin/stdout")]
    Run {
        #[arg(help = "Path to the dialogue tree JSON file")]
        tree: PathBuf,
        #[arg(long, help = "Path to the config file (defaults to colloquy.toml)")]
        config: Option<PathBuf>,
        #[arg(long, help = "Engine mode: local or remote")]
        mode: Option<EngineMode>,
        #[arg(long, help = "Log level override")]
        log_level: Option<String>,
    },
    #[command(about = "Lint a dialogue tree definition without running it")]
    Check {
        #[arg(help = "Path to the dialogue tree JSON file")]
        tree: PathBuf,
    },
    #[command(about = "Inspect effective configuration values with secrets redacted")]
    Config {
        #[arg(long, help = "Path to the config file (defaults to colloquy.toml)")]
        config: Option<PathBuf>,
    },
}

pub fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { tree, config, mode, log_level } => {
            commands::run::run(commands::run::RunArgs { tree, config, mode, log_level }).await
        }
        Command::Check { tree } => commands::check::run(&tree),
        Command::Config { config } => commands::config::run(config),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
