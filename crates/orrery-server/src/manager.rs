//! Live notebook sessions over the on-disk store.
//!
//! Notebooks are lazily instantiated: opening one builds its session from
//! the persisted cells, but no worker process exists until the first
//! execution. Deleting a notebook tears its worker down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::error::{ServerError, ServerResult};
use crate::session::{NotebookSession, SessionHandle};
use crate::store::{NotebookMeta, NotebookStore};
use crate::supervisor::ExecState;

/// A notebook's live state: the session plus its supervisor state. The
/// supervisor state lives outside the session lock so interrupts never
/// wait on a running execution.
pub struct NotebookRuntime {
    pub id: String,
    pub session: SessionHandle,
    pub exec: Arc<ExecState>,
}

/// Owner of all live notebook runtimes.
pub struct NotebookManager {
    store: NotebookStore,
    runtimes: HashMap<String, Arc<NotebookRuntime>>,
    timeout: Duration,
}

impl NotebookManager {
    pub fn new(store: NotebookStore, timeout: Duration) -> Self {
        Self {
            store,
            runtimes: HashMap::new(),
            timeout,
        }
    }

    pub fn list(&self) -> Vec<NotebookMeta> {
        self.store.list()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.store.contains(id)
    }

    pub fn create(&mut self, name: &str) -> ServerResult<NotebookMeta> {
        self.store.create(name)
    }

    pub fn rename(&mut self, id: &str, name: &str) -> ServerResult<Option<NotebookMeta>> {
        self.store.rename(id, name)
    }

    /// A runtime that is already live, without instantiating one.
    pub fn get(&self, id: &str) -> Option<Arc<NotebookRuntime>> {
        self.runtimes.get(id).cloned()
    }

    /// Open a notebook, building its session from disk on first access.
    pub fn open(&mut self, id: &str) -> ServerResult<Arc<NotebookRuntime>> {
        if let Some(runtime) = self.runtimes.get(id) {
            return Ok(runtime.clone());
        }
        if !self.store.contains(id) {
            return Err(ServerError::NotebookNotFound(id.to_string()));
        }

        let mut session = NotebookSession::new(id, self.timeout);
        for cell in self.store.load_cells(id) {
            session
                .engine_mut()
                .add_cell(Some(cell.id.clone()), &cell.code, None);
            session.engine_mut().restore_outputs(
                &cell.id,
                cell.output,
                cell.rich_output,
                cell.error,
                cell.status,
            );
        }

        let interrupt = session.engine().interrupt_handle();
        let runtime = Arc::new(NotebookRuntime {
            id: id.to_string(),
            session: Arc::new(RwLock::new(session)),
            exec: Arc::new(ExecState::new(interrupt)),
        });
        self.runtimes.insert(id.to_string(), runtime.clone());
        tracing::info!("opened notebook {id}");
        Ok(runtime)
    }

    /// Snapshot a live notebook to disk. A no-op for notebooks that were
    /// never opened (disk already has their latest state).
    pub async fn save(&mut self, id: &str) -> ServerResult<()> {
        let Some(runtime) = self.runtimes.get(id).cloned() else {
            return Ok(());
        };
        let cells = runtime.session.read().await.cells_snapshot();
        self.store.save_cells(id, &cells)
    }

    /// Delete a notebook: tear down its worker, remove its file and index
    /// entry. Returns whether it existed.
    pub async fn delete(&mut self, id: &str) -> ServerResult<bool> {
        if let Some(runtime) = self.runtimes.remove(id) {
            runtime.session.write().await.engine_mut().shutdown();
        }
        self.store.delete(id)
    }
}

/// Persist a notebook, logging instead of failing: a save error must not
/// take down the supervisor.
pub async fn persist(state: &crate::routes::AppState, notebook_id: &str) {
    let mut manager = state.manager.write().await;
    if let Err(e) = manager.save(notebook_id).await {
        tracing::warn!("failed to save notebook {notebook_id}: {e}");
    }
}
