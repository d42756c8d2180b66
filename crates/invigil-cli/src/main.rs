//! invigil - Proctored Interview Engine CLI
//!
//! Offline tooling for the proctoring engine: event-trace replay against a
//! scripted interview and configuration checking.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;
mod hosts;

/// invigil - Proctored Interview Engine
#[derive(Parser, Debug)]
#[command(name = "invigil")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded event trace through the engine
    Replay {
        /// Path to the trace file (one JSON event per line)
        trace: PathBuf,

        /// Path to the question script (one question per line)
        #[arg(short, long)]
        questions: PathBuf,

        /// Path to a proctor configuration file (defaults apply if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file and print the resolved form
    CheckConfig {
        /// Path to the configuration file
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Replay {
            trace,
            questions,
            config,
        } => commands::replay::run(&trace, &questions, config.as_deref()),
        Commands::CheckConfig { config } => commands::config::run(&config),
    }
}
