//! Orrery interactive notebook server.
//!
//! A WebSocket server for reactive notebooks: edits stream in, the
//! dependency graph decides what re-runs, and execution events stream
//! back out.
//!
//! # Architecture
//!
//! - **Protocol**: client/server message types (JSON over WebSocket)
//! - **Store**: on-disk notebook files plus the index
//! - **Manager**: lazily instantiated per-notebook runtimes
//! - **Session**: the reactive engine plus its broadcast channel
//! - **Supervisor**: drives execution plans with cancel-and-replace
//! - **Routes**: HTTP and WebSocket handlers

pub mod error;
pub mod manager;
pub mod protocol;
pub mod routes;
pub mod session;
pub mod store;
pub mod supervisor;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

pub use error::{ServerError, ServerResult};
pub use manager::{NotebookManager, NotebookRuntime};
pub use protocol::{Cell, ClientMessage, ServerMessage};
pub use routes::{AppState, create_router};
pub use session::{NotebookSession, SessionHandle};
pub use store::{NotebookMeta, NotebookStore};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Per-cell execution deadline.
    pub execution_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            execution_timeout: Duration::from_secs(15),
        }
    }
}

/// Start the Orrery server over a notebooks directory.
pub async fn serve(notebooks_dir: impl AsRef<Path>, config: ServerConfig) -> ServerResult<()> {
    let store = NotebookStore::open(notebooks_dir)?;
    let manager = NotebookManager::new(store, config.execution_timeout);

    let state = Arc::new(AppState {
        manager: RwLock::new(manager),
    });

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ServerError::InvalidOperation(format!(
            "invalid address: {}:{}",
            config.host, config.port
        )))?;

    tracing::info!("starting Orrery server at http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on ctrl-c.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.execution_timeout, Duration::from_secs(15));
    }
}
