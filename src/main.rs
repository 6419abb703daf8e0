//! Centinela CLI - guardrail inference server
//!
//! # Commands
//!
//! - `serve` - Load the model and start the HTTP server
//! - `info` - Show version and defaults

use centinela::{
    cli::{handle_serve, info_text, init_tracing},
    config::ServeConfig,
    error::Result,
};
use clap::{Parser, Subcommand};

/// Centinela - guardrail-scoped text generation
#[derive(Parser)]
#[command(name = "centinela")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the inference server
    ///
    /// Examples:
    ///   centinela serve
    ///   BASE_MODEL=./models/gemma-3-270m centinela serve --port 9000
    ///   centinela serve --no-adapter --cpu
    Serve(ServeConfig),
    /// Show version and configuration info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(config) => {
            init_tracing();
            handle_serve(config).await?;
        },
        Commands::Info => {
            print!("{}", info_text());
        },
    }

    Ok(())
}
