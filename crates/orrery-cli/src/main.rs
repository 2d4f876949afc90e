//! Orrery CLI - reactive notebook server.

mod colors;
mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "orrery")]
#[command(about = "Reactive notebook server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive notebook server
    Serve {
        /// Directory holding the notebook files
        #[arg(default_value = "notebooks")]
        dir: String,

        /// Host address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Per-cell execution timeout in seconds
        #[arg(long, default_value = "15")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Serve {
            dir,
            host,
            port,
            timeout,
        } => serve::execute(&dir, &host, port, timeout).await,
    }
}
