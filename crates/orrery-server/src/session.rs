//! Per-notebook session: the reactive engine plus the broadcast channel
//! its events stream through.

use std::sync::Arc;
use std::time::Duration;

use orrery_core::engine::ReactiveEngine;
use tokio::sync::{RwLock, broadcast};

use crate::protocol::{Cell, ServerMessage};

/// Capacity for the broadcast channel. Enough for normal notebook
/// operation; clients that fall behind drop the oldest messages.
const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// Thread-safe session handle.
pub type SessionHandle = Arc<RwLock<NotebookSession>>;

/// A live notebook session.
pub struct NotebookSession {
    id: String,
    engine: ReactiveEngine,
    tx: broadcast::Sender<ServerMessage>,
}

impl NotebookSession {
    /// Create a session for a notebook. The engine starts empty; the
    /// caller restores persisted cells. No worker process is spawned
    /// until the first execution.
    pub fn new(id: impl Into<String>, timeout: Duration) -> Self {
        let (tx, _rx) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        Self {
            id: id.into(),
            engine: ReactiveEngine::with_timeout(timeout),
            tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn engine(&self) -> &ReactiveEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ReactiveEngine {
        &mut self.engine
    }

    /// Subscribe to this notebook's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all subscribers, ignoring send failures
    /// (no connected clients is fine).
    pub fn broadcast(&self, msg: ServerMessage) {
        let _ = self.tx.send(msg);
    }

    /// Wire-format snapshot of all cells in display order.
    pub fn cells_snapshot(&self) -> Vec<Cell> {
        self.engine.cells_in_order().into_iter().map(Cell::from).collect()
    }

    /// The full-state message sent on open and after resets.
    pub fn state_message(&self) -> ServerMessage {
        ServerMessage::NotebookState {
            notebook_id: self.id.clone(),
            cells: self.cells_snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_preserves_display_order() {
        let mut session = NotebookSession::new("nb-test", Duration::from_secs(15));
        session.engine_mut().add_cell(Some("b".into()), "y = 2", None);
        session
            .engine_mut()
            .add_cell(Some("a".into()), "x = 1", Some(0));

        let cells = session.cells_snapshot();
        let ids: Vec<&str> = cells.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_broadcast_without_subscribers_is_ok() {
        let session = NotebookSession::new("nb-test", Duration::from_secs(15));
        session.broadcast(session.state_message());
    }

    #[test]
    fn test_subscribers_receive_events() {
        let session = NotebookSession::new("nb-test", Duration::from_secs(15));
        let mut rx = session.subscribe();
        session.broadcast(ServerMessage::NotebookDeleted {
            notebook_id: "nb-test".to_string(),
        });
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::NotebookDeleted { .. }
        ));
    }
}
