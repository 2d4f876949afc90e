//! Integration tests for protocol message serialization.
//!
//! Every client and server message type must round-trip through the JSON
//! wire format with its snake_case tag.

use orrery_core::engine::CellStatus;
use orrery_core::graph::CellId;
use orrery_server::protocol::*;

fn tag(json: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(json).unwrap();
    value["type"].as_str().unwrap().to_string()
}

#[test]
fn test_all_client_messages_serialize() {
    let messages = vec![
        (ClientMessage::ListNotebooks, "list_notebooks"),
        (
            ClientMessage::CreateNotebook {
                name: "Analysis".to_string(),
            },
            "create_notebook",
        ),
        (
            ClientMessage::OpenNotebook {
                notebook_id: "nb-12345678".to_string(),
            },
            "open_notebook",
        ),
        (
            ClientMessage::DeleteNotebook {
                notebook_id: "nb-12345678".to_string(),
            },
            "delete_notebook",
        ),
        (
            ClientMessage::RenameNotebook {
                notebook_id: "nb-12345678".to_string(),
                name: "Renamed".to_string(),
            },
            "rename_notebook",
        ),
        (
            ClientMessage::CellUpdated {
                notebook_id: "nb-12345678".to_string(),
                cell_id: CellId::from("cell-1"),
                code: "x = 1".to_string(),
            },
            "cell_updated",
        ),
        (
            ClientMessage::ExecuteCell {
                notebook_id: "nb-12345678".to_string(),
                cell_id: CellId::from("cell-1"),
            },
            "execute_cell",
        ),
        (
            ClientMessage::AddCell {
                notebook_id: "nb-12345678".to_string(),
                position: Some(2),
            },
            "add_cell",
        ),
        (
            ClientMessage::DeleteCell {
                notebook_id: "nb-12345678".to_string(),
                cell_id: CellId::from("cell-1"),
            },
            "delete_cell",
        ),
        (
            ClientMessage::Interrupt {
                notebook_id: "nb-12345678".to_string(),
            },
            "interrupt",
        ),
        (
            ClientMessage::ResetNotebook {
                notebook_id: "nb-12345678".to_string(),
            },
            "reset_notebook",
        ),
    ];

    for (message, expected_tag) in messages {
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(tag(&json), expected_tag, "{json}");
        let _parsed: ClientMessage = serde_json::from_str(&json).unwrap();
    }
}

#[test]
fn test_all_server_messages_serialize() {
    let meta = NotebookMeta {
        id: "nb-12345678".to_string(),
        name: "Analysis".to_string(),
        created_at: "2025-01-01T00:00:00+00:00".to_string(),
        updated_at: "2025-01-02T00:00:00+00:00".to_string(),
    };
    let cell = Cell {
        id: CellId::from("cell-1"),
        code: "x = 1".to_string(),
        output: "1".to_string(),
        rich_output: None,
        error: String::new(),
        status: CellStatus::Success,
    };

    let messages = vec![
        (
            ServerMessage::NotebookList {
                notebooks: vec![meta.clone()],
            },
            "notebook_list",
        ),
        (
            ServerMessage::NotebookCreated {
                notebook: meta.clone(),
            },
            "notebook_created",
        ),
        (
            ServerMessage::NotebookDeleted {
                notebook_id: "nb-12345678".to_string(),
            },
            "notebook_deleted",
        ),
        (
            ServerMessage::NotebookRenamed { notebook: meta },
            "notebook_renamed",
        ),
        (
            ServerMessage::NotebookState {
                notebook_id: "nb-12345678".to_string(),
                cells: vec![cell.clone()],
            },
            "notebook_state",
        ),
        (
            ServerMessage::CellAdded {
                notebook_id: "nb-12345678".to_string(),
                cell,
                position: 0,
            },
            "cell_added",
        ),
        (
            ServerMessage::CellDeleted {
                notebook_id: "nb-12345678".to_string(),
                cell_id: CellId::from("cell-1"),
            },
            "cell_deleted",
        ),
        (
            ServerMessage::ExecutionQueue {
                notebook_id: "nb-12345678".to_string(),
                cell_ids: vec![CellId::from("cell-1"), CellId::from("cell-2")],
            },
            "execution_queue",
        ),
        (
            ServerMessage::ExecutionStarted {
                notebook_id: "nb-12345678".to_string(),
                cell_id: CellId::from("cell-1"),
            },
            "execution_started",
        ),
        (
            ServerMessage::ExecutionResult {
                notebook_id: "nb-12345678".to_string(),
                cell_id: CellId::from("cell-1"),
                status: CellStatus::Success,
                output: "42".to_string(),
                rich_output: Some(serde_json::json!({"type": "array", "data": [1]})),
                error: String::new(),
            },
            "execution_result",
        ),
        (
            ServerMessage::ExecutionInterrupted {
                notebook_id: "nb-12345678".to_string(),
                cell_id: None,
                message: "Execution interrupted".to_string(),
            },
            "execution_interrupted",
        ),
        (
            ServerMessage::Error {
                notebook_id: Some("nb-12345678".to_string()),
                cell_id: Some(CellId::from("cell-1")),
                message: "Circular dependency detected: cell 1 → cell 2 → cell 1".to_string(),
            },
            "error",
        ),
    ];

    for (message, expected_tag) in messages {
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(tag(&json), expected_tag, "{json}");
        let _parsed: ServerMessage = serde_json::from_str(&json).unwrap();
    }
}

#[test]
fn test_execution_result_omits_null_rich_output() {
    let msg = ServerMessage::ExecutionResult {
        notebook_id: "nb-1".to_string(),
        cell_id: CellId::from("cell-1"),
        status: CellStatus::Error,
        output: String::new(),
        rich_output: None,
        error: "NameError: name 'x' is not defined".to_string(),
    };
    let json = serde_json::to_string(&msg).unwrap();
    assert!(!json.contains("rich_output"));
}

#[test]
fn test_client_message_from_raw_json() {
    // The shapes clients actually send.
    let msg: ClientMessage = serde_json::from_str(
        r#"{"type": "cell_updated", "notebook_id": "nb-1", "cell_id": "cell-9", "code": "y = x"}"#,
    )
    .unwrap();
    assert!(matches!(msg, ClientMessage::CellUpdated { .. }));

    let msg: ClientMessage =
        serde_json::from_str(r#"{"type": "add_cell", "notebook_id": "nb-1"}"#).unwrap();
    match msg {
        ClientMessage::AddCell { position, .. } => assert!(position.is_none()),
        other => panic!("wrong message: {other:?}"),
    }
}
