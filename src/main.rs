//! Regime trader - main entry point
//!
//! This binary provides two subcommands:
//! - paper: Run the adaptive trading loop against a paper connector
//! - classify: One-shot regime report from stored history

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "regime-trader")]
#[command(about = "Regime-switching trader with kill-switch gating and adaptive scheduling", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the trading loop with simulated fills until Ctrl+C
    Paper {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Directory holding one {symbol}.csv file per instrument
        #[arg(short, long, default_value = "data")]
        data_dir: String,

        /// Starting paper balance
        #[arg(long, default_value = "100000")]
        balance: f64,
    },

    /// Print the current kill-switch status, Z-score and regime
    Classify {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Directory holding one {symbol}.csv file per instrument
        #[arg(short, long, default_value = "data")]
        data_dir: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // Same format without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Paper { .. } => "paper",
        Commands::Classify { .. } => "classify",
    };
    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Paper {
            config,
            data_dir,
            balance,
        } => commands::paper::run(config, data_dir, balance),
        Commands::Classify { config, data_dir } => commands::classify::run(config, data_dir),
    }
}
