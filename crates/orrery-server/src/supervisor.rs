//! Execution supervisor: drives plans against the worker, one notebook at
//! a time, with cancel-and-replace semantics.
//!
//! A plan runs in a background task so the transport loop stays
//! responsive; the synchronous worker IPC inside each cell is pushed onto
//! a blocking thread. Cancellation is cooperative at the plan level (the
//! flag is checked between cells) and forceful at the cell level (the
//! interrupt handle kills the worker). A silent cancel — used when a new
//! edit replaces the running plan — emits no `execution_interrupted`;
//! only explicit user interrupts do.

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use orrery_core::engine::{CellRun, CellStatus};
use orrery_core::graph::CellId;
use orrery_core::ipc::InterruptHandle;
use tokio::task::JoinHandle;

use crate::manager::{self, NotebookRuntime};
use crate::protocol::ServerMessage;
use crate::routes::AppState;

/// Supervisor state for one notebook. Lives outside the session lock so
/// interrupts work even while an execution holds the session for writing.
pub struct ExecState {
    running: AtomicBool,
    cancelled: AtomicBool,
    silent: AtomicBool,
    current: StdMutex<Option<CellId>>,
    interrupt: InterruptHandle,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ExecState {
    pub fn new(interrupt: InterruptHandle) -> Self {
        Self {
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            silent: AtomicBool::new(false),
            current: StdMutex::new(None),
            interrupt,
            task: tokio::sync::Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The cell currently executing, if any.
    pub fn current_cell(&self) -> Option<CellId> {
        self.current.lock().expect("current cell lock").clone()
    }

    fn set_current(&self, cell: Option<CellId>) {
        *self.current.lock().expect("current cell lock") = cell;
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn is_silent(&self) -> bool {
        self.silent.load(Ordering::SeqCst)
    }
}

/// Start a plan, replacing any plan already in flight (silently).
///
/// Callers must not hold the manager lock: both cancellation and the save
/// at plan end need it.
pub async fn start_plan(state: Arc<AppState>, runtime: Arc<NotebookRuntime>, plan: Vec<CellId>) {
    cancel(&runtime, true).await;

    if plan.is_empty() {
        manager::persist(&state, &runtime.id).await;
        return;
    }

    let exec = &runtime.exec;
    exec.cancelled.store(false, Ordering::SeqCst);
    exec.silent.store(false, Ordering::SeqCst);
    exec.running.store(true, Ordering::SeqCst);

    {
        let session = runtime.session.read().await;
        session.broadcast(ServerMessage::ExecutionQueue {
            notebook_id: runtime.id.clone(),
            cell_ids: plan.clone(),
        });
    }

    let task = tokio::spawn(run_plan(state, runtime.clone(), plan));
    *runtime.exec.task.lock().await = Some(task);
}

/// Cancel the in-flight plan, if any. `silent` suppresses the
/// `execution_interrupted` event (cancel-and-replace); explicit user
/// interrupts pass `false`.
pub async fn cancel(runtime: &NotebookRuntime, silent: bool) {
    let exec = &runtime.exec;
    if !exec.is_running() {
        return;
    }

    exec.silent.store(silent, Ordering::SeqCst);
    exec.cancelled.store(true, Ordering::SeqCst);

    // Unblock the IPC read and kill the worker; namespace loss is the
    // contract here.
    exec.interrupt.interrupt();

    if let Some(task) = exec.task.lock().await.take() {
        let _ = task.await;
    }
    exec.running.store(false, Ordering::SeqCst);
}

async fn run_plan(state: Arc<AppState>, runtime: Arc<NotebookRuntime>, plan: Vec<CellId>) {
    let notebook_id = runtime.id.clone();

    for (idx, cell_id) in plan.iter().enumerate() {
        if runtime.exec.is_cancelled() {
            mark_remaining_idle(&runtime, &plan[idx..]).await;
            if !runtime.exec.is_silent() {
                broadcast(&runtime, interrupted_message(&notebook_id, None)).await;
            }
            break;
        }

        // The cell may have been deleted while the plan was running.
        {
            let session = runtime.session.read().await;
            if !session.engine().contains(cell_id) {
                continue;
            }
        }

        runtime.exec.set_current(Some(cell_id.clone()));
        broadcast(
            &runtime,
            ServerMessage::ExecutionStarted {
                notebook_id: notebook_id.clone(),
                cell_id: cell_id.clone(),
            },
        )
        .await;

        // The engine does synchronous IPC; keep it off the event loop.
        let run = {
            let runtime = runtime.clone();
            let cell_id = cell_id.clone();
            tokio::task::spawn_blocking(move || {
                let handle = tokio::runtime::Handle::current();
                handle.block_on(async {
                    let mut session = runtime.session.write().await;
                    session.engine_mut().execute_cell(&cell_id)
                })
            })
            .await
        };

        runtime.exec.set_current(None);

        match run {
            Ok(Some(CellRun::Interrupted)) => {
                if !runtime.exec.is_silent() {
                    broadcast(
                        &runtime,
                        interrupted_message(&notebook_id, Some(cell_id.clone())),
                    )
                    .await;
                }
                mark_remaining_idle(&runtime, &plan[idx + 1..]).await;
                break;
            }
            Ok(Some(CellRun::Completed(record))) => {
                if runtime.exec.is_cancelled() {
                    // The cancel raced the cell's completion; its result is
                    // stale and must not reach clients.
                    if !runtime.exec.is_silent() {
                        broadcast(
                            &runtime,
                            interrupted_message(&notebook_id, Some(cell_id.clone())),
                        )
                        .await;
                    }
                    mark_remaining_idle(&runtime, &plan[idx + 1..]).await;
                    break;
                }

                let failed = record.status == CellStatus::Error;
                broadcast(
                    &runtime,
                    ServerMessage::ExecutionResult {
                        notebook_id: notebook_id.clone(),
                        cell_id: cell_id.clone(),
                        status: record.status,
                        output: record.output,
                        rich_output: record.rich_output,
                        error: record.error,
                    },
                )
                .await;

                // Errors stop the plan at the failing cell; downstream
                // cells keep their previous state.
                if failed {
                    break;
                }
            }
            Ok(None) => continue,
            Err(e) => {
                tracing::error!("execution task failed: {e}");
                break;
            }
        }
    }

    runtime.exec.running.store(false, Ordering::SeqCst);
    manager::persist(&state, &notebook_id).await;
}

fn interrupted_message(notebook_id: &str, cell_id: Option<CellId>) -> ServerMessage {
    ServerMessage::ExecutionInterrupted {
        notebook_id: notebook_id.to_string(),
        cell_id,
        message: "Execution interrupted".to_string(),
    }
}

async fn broadcast(runtime: &NotebookRuntime, message: ServerMessage) {
    let session = runtime.session.read().await;
    session.broadcast(message);
}

/// Return the cancelled remainder of a plan to idle. Cells deleted
/// mid-plan are skipped.
async fn mark_remaining_idle(runtime: &NotebookRuntime, remaining: &[CellId]) {
    let mut session = runtime.session.write().await;
    let engine = session.engine_mut();
    for cell_id in remaining {
        engine.set_status(cell_id, CellStatus::Idle);
    }
}
