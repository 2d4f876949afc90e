//! Serve command implementation for the Orrery CLI.
//!
//! Starts the interactive WebSocket server over a notebooks directory.

use std::time::Duration;

use orrery_server::ServerConfig;

use crate::colors;

/// Start the interactive notebook server.
pub async fn execute(dir: &str, host: &str, port: u16, timeout: u64) -> anyhow::Result<()> {
    let config = ServerConfig {
        host: host.to_string(),
        port,
        execution_timeout: Duration::from_secs(timeout),
    };

    println!(
        "\n{}Orrery Server{} - Reactive Notebook",
        colors::BOLD,
        colors::RESET
    );
    println!("{}", "─".repeat(50));
    println!("{}  ◆ Notebooks:{} {}", colors::CYAN, colors::RESET, dir);
    println!(
        "{}  ◆ Server:{} http://{}:{}",
        colors::CYAN,
        colors::RESET,
        config.host,
        config.port
    );
    println!(
        "{}  ◆ WebSocket:{} ws://{}:{}/ws",
        colors::CYAN,
        colors::RESET,
        config.host,
        config.port
    );
    println!("{}", "─".repeat(50));
    println!("{}Press Ctrl+C to stop{}", colors::GREEN, colors::RESET);
    println!();

    orrery_server::serve(dir, config).await?;

    Ok(())
}
