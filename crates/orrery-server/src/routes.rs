//! HTTP and WebSocket routes for the Orrery server.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Json},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use orrery_core::graph::CellId;

use crate::manager::{self, NotebookManager, NotebookRuntime};
use crate::protocol::{Cell, ClientMessage, ServerMessage};
use crate::supervisor;

/// Application state shared across handlers.
pub struct AppState {
    /// All notebook runtimes, live and on disk.
    pub manager: RwLock<NotebookManager>,
}

type WsSender = Arc<tokio::sync::Mutex<futures::stream::SplitSink<WebSocket, Message>>>;

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/notebooks", get(notebooks_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Notebook index as plain HTTP.
async fn notebooks_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let manager = state.manager.read().await;
    Json(serde_json::json!({ "notebooks": manager.list() }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Handle one WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(tokio::sync::Mutex::new(sender));

    // Task forwarding the open notebook's broadcast stream to this client;
    // replaced whenever the client opens another notebook.
    let mut forward_task: Option<JoinHandle<()>> = None;

    // Send the notebook index so the client can pick one.
    {
        let manager = state.manager.read().await;
        let list = ServerMessage::NotebookList {
            notebooks: manager.list(),
        };
        send_message(&sender, &list).await;
    }

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => {
                    handle_client_message(msg, &state, &sender, &mut forward_task).await;
                }
                Err(e) => {
                    tracing::warn!("failed to parse client message: {e} (input: {text})");
                    send_message(
                        &sender,
                        &ServerMessage::Error {
                            notebook_id: None,
                            cell_id: None,
                            message: format!("Invalid message format: {e}"),
                        },
                    )
                    .await;
                }
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!("WebSocket error: {e}");
                break;
            }
            _ => {}
        }
    }

    if let Some(task) = forward_task {
        task.abort();
        let _ = task.await;
    }
}

/// Send a server message through the WebSocket.
async fn send_message(sender: &WsSender, msg: &ServerMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        let mut sender = sender.lock().await;
        let _ = sender.send(Message::Text(json.into())).await;
    }
}

async fn send_error(
    sender: &WsSender,
    notebook_id: Option<String>,
    cell_id: Option<CellId>,
    message: String,
) {
    send_message(
        sender,
        &ServerMessage::Error {
            notebook_id,
            cell_id,
            message,
        },
    )
    .await;
}

/// Open (lazily instantiating) a notebook runtime. The manager lock is
/// held only for the lookup — never across supervisor calls.
async fn open_runtime(
    state: &Arc<AppState>,
    notebook_id: &str,
) -> Result<Arc<NotebookRuntime>, String> {
    let mut manager = state.manager.write().await;
    manager.open(notebook_id).map_err(|e| e.to_string())
}

/// Handle a client message.
async fn handle_client_message(
    msg: ClientMessage,
    state: &Arc<AppState>,
    sender: &WsSender,
    forward_task: &mut Option<JoinHandle<()>>,
) {
    match msg {
        ClientMessage::ListNotebooks => {
            let manager = state.manager.read().await;
            let list = ServerMessage::NotebookList {
                notebooks: manager.list(),
            };
            drop(manager);
            send_message(sender, &list).await;
        }

        ClientMessage::CreateNotebook { name } => {
            let created = state.manager.write().await.create(&name);
            match created {
                Ok(notebook) => {
                    send_message(sender, &ServerMessage::NotebookCreated { notebook }).await;
                }
                Err(e) => send_error(sender, None, None, e.to_string()).await,
            }
        }

        ClientMessage::OpenNotebook { notebook_id } => {
            let runtime = match open_runtime(state, &notebook_id).await {
                Ok(runtime) => runtime,
                Err(message) => {
                    send_error(sender, Some(notebook_id), None, message).await;
                    return;
                }
            };

            // Re-point the forward task at the newly opened notebook.
            if let Some(task) = forward_task.take() {
                task.abort();
                let _ = task.await;
            }
            let mut rx = runtime.session.read().await.subscribe();
            let sender_clone = sender.clone();
            *forward_task = Some(tokio::spawn(async move {
                while let Ok(msg) = rx.recv().await {
                    if let Ok(json) = serde_json::to_string(&msg) {
                        let mut sender = sender_clone.lock().await;
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }));

            let state_msg = runtime.session.read().await.state_message();
            send_message(sender, &state_msg).await;
        }

        ClientMessage::DeleteNotebook { notebook_id } => {
            // Cancel any running plan before tearing the runtime down.
            let live = state.manager.read().await.get(&notebook_id);
            if let Some(runtime) = live {
                supervisor::cancel(&runtime, true).await;
            }

            let deleted = state.manager.write().await.delete(&notebook_id).await;
            match deleted {
                Ok(true) => {
                    send_message(sender, &ServerMessage::NotebookDeleted { notebook_id }).await;
                }
                Ok(false) => {
                    send_error(
                        sender,
                        Some(notebook_id.clone()),
                        None,
                        format!("Notebook not found: {notebook_id}"),
                    )
                    .await;
                }
                Err(e) => send_error(sender, Some(notebook_id), None, e.to_string()).await,
            }
        }

        ClientMessage::RenameNotebook { notebook_id, name } => {
            let renamed = state.manager.write().await.rename(&notebook_id, &name);
            match renamed {
                Ok(Some(notebook)) => {
                    send_message(sender, &ServerMessage::NotebookRenamed { notebook }).await;
                }
                Ok(None) => {
                    send_error(
                        sender,
                        Some(notebook_id.clone()),
                        None,
                        format!("Notebook not found: {notebook_id}"),
                    )
                    .await;
                }
                Err(e) => send_error(sender, Some(notebook_id), None, e.to_string()).await,
            }
        }

        ClientMessage::CellUpdated {
            notebook_id,
            cell_id,
            code,
        } => {
            handle_cell_edit(state, sender, notebook_id, cell_id, code).await;
        }

        ClientMessage::ExecuteCell {
            notebook_id,
            cell_id,
        } => {
            // Manual execution replans from the cell's current code.
            let runtime = match open_runtime(state, &notebook_id).await {
                Ok(runtime) => runtime,
                Err(message) => {
                    send_error(sender, Some(notebook_id), None, message).await;
                    return;
                }
            };
            let code = {
                let session = runtime.session.read().await;
                session.engine().get_cell(&cell_id).map(|c| c.code.clone())
            };
            if let Some(code) = code {
                handle_cell_edit(state, sender, notebook_id, cell_id, code).await;
            }
        }

        ClientMessage::AddCell {
            notebook_id,
            position,
        } => {
            let runtime = match open_runtime(state, &notebook_id).await {
                Ok(runtime) => runtime,
                Err(message) => {
                    send_error(sender, Some(notebook_id), None, message).await;
                    return;
                }
            };

            let (cell, position) = {
                let mut session = runtime.session.write().await;
                let cell = session.engine_mut().add_cell(None, "", position);
                let position = session.engine().position(&cell.id).unwrap_or(0);
                (Cell::from(&cell), position)
            };

            {
                let session = runtime.session.read().await;
                session.broadcast(ServerMessage::CellAdded {
                    notebook_id: notebook_id.clone(),
                    cell,
                    position,
                });
            }
            manager::persist(state, &notebook_id).await;
        }

        ClientMessage::DeleteCell {
            notebook_id,
            cell_id,
        } => {
            let runtime = match open_runtime(state, &notebook_id).await {
                Ok(runtime) => runtime,
                Err(message) => {
                    send_error(sender, Some(notebook_id), None, message).await;
                    return;
                }
            };

            // Deleting the cell that is executing right now implies
            // cancelling the plan first.
            if runtime.exec.is_running() && runtime.exec.current_cell().as_ref() == Some(&cell_id)
            {
                supervisor::cancel(&runtime, true).await;
            }

            let deleted = {
                let mut session = runtime.session.write().await;
                session.engine_mut().delete_cell(&cell_id)
            };

            if deleted {
                {
                    let session = runtime.session.read().await;
                    session.broadcast(ServerMessage::CellDeleted {
                        notebook_id: notebook_id.clone(),
                        cell_id,
                    });
                }
                manager::persist(state, &notebook_id).await;
            }
        }

        ClientMessage::Interrupt { notebook_id } => {
            // Interrupting a notebook that was never opened is a no-op.
            let live = state.manager.read().await.get(&notebook_id);
            if let Some(runtime) = live {
                supervisor::cancel(&runtime, false).await;
                manager::persist(state, &notebook_id).await;
            }
        }

        ClientMessage::ResetNotebook { notebook_id } => {
            let runtime = match open_runtime(state, &notebook_id).await {
                Ok(runtime) => runtime,
                Err(message) => {
                    send_error(sender, Some(notebook_id), None, message).await;
                    return;
                }
            };

            supervisor::cancel(&runtime, true).await;
            let result = {
                let mut session = runtime.session.write().await;
                session.engine_mut().reset()
            };

            match result {
                Ok(()) => {
                    let state_msg = runtime.session.read().await.state_message();
                    {
                        let session = runtime.session.read().await;
                        session.broadcast(state_msg);
                    }
                    manager::persist(state, &notebook_id).await;
                }
                Err(e) => {
                    send_error(sender, Some(notebook_id), None, e.to_string()).await;
                }
            }
        }
    }
}

/// Apply an edit and drive the resulting plan: cancel-and-replace, write
/// the new code, rebuild the graph, then either start the plan or report
/// the graph error.
async fn handle_cell_edit(
    state: &Arc<AppState>,
    sender: &WsSender,
    notebook_id: String,
    cell_id: CellId,
    code: String,
) {
    let runtime = match open_runtime(state, &notebook_id).await {
        Ok(runtime) => runtime,
        Err(message) => {
            send_error(sender, Some(notebook_id), None, message).await;
            return;
        }
    };

    // Any new edit implicitly cancels the previous plan, silently.
    supervisor::cancel(&runtime, true).await;

    let plan = {
        let mut session = runtime.session.write().await;
        session.engine_mut().on_cell_changed(&cell_id, &code)
    };

    match plan {
        Ok(plan) => {
            supervisor::start_plan(state.clone(), runtime, plan).await;
        }
        Err(e) => {
            // Duplicate definition or cycle: nothing executes, only the
            // edited cell is stamped.
            {
                let session = runtime.session.read().await;
                session.broadcast(ServerMessage::Error {
                    notebook_id: Some(notebook_id.clone()),
                    cell_id: Some(cell_id),
                    message: e.to_string(),
                });
            }
            manager::persist(state, &notebook_id).await;
        }
    }
}
