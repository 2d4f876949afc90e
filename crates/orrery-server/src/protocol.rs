//! WebSocket protocol messages for the Orrery server.
//!
//! Defines the message types exchanged between client and server. All
//! messages are JSON objects tagged with a snake_case `type` field.

use orrery_core::engine::{CellData, CellStatus};
use orrery_core::graph::CellId;
use serde::{Deserialize, Serialize};

pub use crate::store::NotebookMeta;

/// A cell as it appears on the wire (and in the persisted notebook file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// Stable cell identifier.
    pub id: CellId,
    /// Source text.
    #[serde(default)]
    pub code: String,
    /// Captured output of the last execution.
    #[serde(default)]
    pub output: String,
    /// Structured output for table/array shaped results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_output: Option<serde_json::Value>,
    /// Error text of the last execution.
    #[serde(default)]
    pub error: String,
    /// Execution status.
    #[serde(default)]
    pub status: CellStatus,
}

impl From<&CellData> for Cell {
    fn from(cell: &CellData) -> Self {
        Self {
            id: cell.id.clone(),
            code: cell.code.clone(),
            output: cell.output.clone(),
            rich_output: cell.rich_output.clone(),
            error: cell.error.clone(),
            status: cell.status,
        }
    }
}

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// List available notebooks.
    ListNotebooks,

    /// Create a new empty notebook.
    CreateNotebook {
        /// Display name.
        name: String,
    },

    /// Open a notebook: subscribes this connection to its events and
    /// returns the full state. Starts the notebook's worker lazily.
    OpenNotebook { notebook_id: String },

    /// Delete a notebook and tear down its worker.
    DeleteNotebook { notebook_id: String },

    /// Rename a notebook.
    RenameNotebook { notebook_id: String, name: String },

    /// A cell was edited; triggers reactive re-execution.
    CellUpdated {
        notebook_id: String,
        cell_id: CellId,
        /// New source code.
        code: String,
    },

    /// Manually execute a cell (re-plans from its current code).
    ExecuteCell {
        notebook_id: String,
        cell_id: CellId,
    },

    /// Add a new empty cell.
    AddCell {
        notebook_id: String,
        /// Insert position; appends when absent.
        #[serde(default)]
        position: Option<usize>,
    },

    /// Delete a cell. Unknown cells are ignored.
    DeleteCell {
        notebook_id: String,
        cell_id: CellId,
    },

    /// Interrupt the running execution.
    Interrupt { notebook_id: String },

    /// Reset the notebook kernel: clear the namespace and all outputs.
    ResetNotebook { notebook_id: String },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The notebook index.
    NotebookList { notebooks: Vec<NotebookMeta> },

    /// A notebook was created.
    NotebookCreated { notebook: NotebookMeta },

    /// A notebook was deleted.
    NotebookDeleted { notebook_id: String },

    /// A notebook was renamed.
    NotebookRenamed { notebook: NotebookMeta },

    /// Full notebook state (sent on open and after resets).
    NotebookState {
        notebook_id: String,
        cells: Vec<Cell>,
    },

    /// A cell was added.
    CellAdded {
        notebook_id: String,
        cell: Cell,
        position: usize,
    },

    /// A cell was deleted.
    CellDeleted {
        notebook_id: String,
        cell_id: CellId,
    },

    /// The cells queued by a new execution plan, in order.
    ExecutionQueue {
        notebook_id: String,
        cell_ids: Vec<CellId>,
    },

    /// A cell started executing.
    ExecutionStarted {
        notebook_id: String,
        cell_id: CellId,
    },

    /// A cell finished executing.
    ExecutionResult {
        notebook_id: String,
        cell_id: CellId,
        status: CellStatus,
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rich_output: Option<serde_json::Value>,
        error: String,
    },

    /// Execution was interrupted by the user.
    ExecutionInterrupted {
        notebook_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cell_id: Option<CellId>,
        message: String,
    },

    /// Generic error (graph violations, unknown notebooks, bad messages).
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notebook_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cell_id: Option<CellId>,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_serialization() {
        let msg = ClientMessage::CellUpdated {
            notebook_id: "nb-12345678".to_string(),
            cell_id: CellId::from("cell-abcd1234"),
            code: "x = 1".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"cell_updated\""));

        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        match parsed {
            ClientMessage::CellUpdated { cell_id, code, .. } => {
                assert_eq!(cell_id.as_str(), "cell-abcd1234");
                assert_eq!(code, "x = 1");
            }
            other => panic!("wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_server_message_serialization() {
        let msg = ServerMessage::ExecutionStarted {
            notebook_id: "nb-12345678".to_string(),
            cell_id: CellId::from("cell-1"),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"execution_started\""));
    }

    #[test]
    fn test_cell_defaults_on_deserialize() {
        let cell: Cell = serde_json::from_str(r#"{"id": "cell-1"}"#).unwrap();
        assert_eq!(cell.code, "");
        assert_eq!(cell.status, CellStatus::Idle);
        assert!(cell.rich_output.is_none());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&CellStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
