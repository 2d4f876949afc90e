//! The reactive engine: owner of the cell collection and display order.
//!
//! On every edit the dependency graph is rebuilt from scratch, invariants
//! are checked (duplicates, cycles), and a topologically ordered plan over
//! the dirty set is produced. Execution is delegated to the worker channel;
//! the engine copies results back onto cells but holds no user state.

use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::graph::{CellGraph, CellId, GraphError};
use crate::ipc::{ExecuteOutcome, InterruptHandle, WorkerChannel};

/// Cell execution status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    /// Not executed since creation or the last reset/cancel.
    #[default]
    Idle,
    /// Currently executing in the worker.
    Running,
    /// Last execution completed without error.
    Success,
    /// Last execution (or graph check) failed.
    Error,
}

/// A notebook cell: source plus the outputs of its last execution.
#[derive(Debug, Clone)]
pub struct CellData {
    pub id: CellId,
    pub code: String,
    pub output: String,
    pub rich_output: Option<serde_json::Value>,
    pub error: String,
    pub status: CellStatus,
}

impl CellData {
    fn new(id: CellId, code: String) -> Self {
        Self {
            id,
            code,
            output: String::new(),
            rich_output: None,
            error: String::new(),
            status: CellStatus::Idle,
        }
    }

    fn clear_outputs(&mut self) {
        self.output.clear();
        self.rich_output = None;
        self.error.clear();
        self.status = CellStatus::Idle;
    }
}

/// The outputs copied back from one cell execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub status: CellStatus,
    pub output: String,
    pub rich_output: Option<serde_json::Value>,
    pub error: String,
}

/// Result of driving one cell through the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum CellRun {
    Completed(ExecutionRecord),
    /// A user interrupt killed the worker mid-cell; the cell is back to
    /// idle and the namespace is gone.
    Interrupted,
}

/// The reactive engine for one notebook.
pub struct ReactiveEngine {
    cells: FxHashMap<CellId, CellData>,
    order: Vec<CellId>,
    channel: WorkerChannel,
}

impl ReactiveEngine {
    pub fn new() -> Self {
        Self {
            cells: FxHashMap::default(),
            order: Vec::new(),
            channel: WorkerChannel::new(),
        }
    }

    /// An engine whose worker commands use the given deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cells: FxHashMap::default(),
            order: Vec::new(),
            channel: WorkerChannel::with_timeout(timeout),
        }
    }

    /// Add a cell. Generates an id when none is given; inserts at
    /// `position` or appends.
    pub fn add_cell(
        &mut self,
        id: Option<CellId>,
        code: &str,
        position: Option<usize>,
    ) -> CellData {
        let id = id.unwrap_or_else(CellId::generate);
        let cell = CellData::new(id.clone(), code.to_string());
        self.cells.insert(id.clone(), cell.clone());

        match position {
            Some(position) if position <= self.order.len() => {
                self.order.insert(position, id);
            }
            _ => self.order.push(id),
        }
        cell
    }

    /// Remove a cell. Returns whether it existed (deleting an unknown cell
    /// is not an error).
    pub fn delete_cell(&mut self, id: &CellId) -> bool {
        if self.cells.remove(id).is_none() {
            return false;
        }
        self.order.retain(|c| c != id);
        true
    }

    pub fn get_cell(&self, id: &CellId) -> Option<&CellData> {
        self.cells.get(id)
    }

    pub fn contains(&self, id: &CellId) -> bool {
        self.cells.contains_key(id)
    }

    /// Cells in display order.
    pub fn cells_in_order(&self) -> Vec<&CellData> {
        self.order
            .iter()
            .filter_map(|id| self.cells.get(id))
            .collect()
    }

    /// Display position (0-indexed) of a cell.
    pub fn position(&self, id: &CellId) -> Option<usize> {
        self.order.iter().position(|c| c == id)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Build the dependency graph for the current snapshot.
    pub fn build_graph(&self) -> std::result::Result<CellGraph, GraphError> {
        let snapshot: Vec<(CellId, &str)> = self
            .order
            .iter()
            .filter_map(|id| self.cells.get(id))
            .map(|cell| (cell.id.clone(), cell.code.as_str()))
            .collect();
        CellGraph::build(&snapshot)
    }

    /// Apply an edit: create the cell if absent, store the new code, then
    /// rebuild the graph and plan the dirty set.
    ///
    /// On a duplicate-definition or cycle error the edited cell is stamped
    /// with the error and nothing executes; other cells keep their outputs.
    pub fn on_cell_changed(
        &mut self,
        id: &CellId,
        code: &str,
    ) -> std::result::Result<Vec<CellId>, GraphError> {
        match self.cells.get_mut(id) {
            Some(cell) => cell.code = code.to_string(),
            None => {
                self.add_cell(Some(id.clone()), code, None);
            }
        }

        match self.build_graph() {
            Ok(graph) => Ok(graph.plan_for(id)),
            Err(error) => {
                let cell = self.cells.get_mut(id).expect("cell just upserted");
                cell.status = CellStatus::Error;
                cell.error = error.to_string();
                Err(error)
            }
        }
    }

    /// Execute one cell in the worker and copy the result back onto it.
    /// Unknown cells are ignored (`None`).
    pub fn execute_cell(&mut self, id: &CellId) -> Option<CellRun> {
        let code = self.cells.get(id)?.code.clone();

        if let Some(cell) = self.cells.get_mut(id) {
            cell.status = CellStatus::Running;
        }

        let outcome = self.channel.execute(&code);
        let run = match outcome {
            Ok(ExecuteOutcome::Completed(payload)) => {
                let record = ExecutionRecord {
                    status: if payload.success {
                        CellStatus::Success
                    } else {
                        CellStatus::Error
                    },
                    output: payload.output,
                    rich_output: payload
                        .rich_output_json
                        .as_deref()
                        .and_then(|json| serde_json::from_str(json).ok()),
                    error: payload.error,
                };
                CellRun::Completed(record)
            }
            Ok(ExecuteOutcome::Interrupted) => CellRun::Interrupted,
            Err(e) => {
                tracing::error!(cell = %id, "worker execution failed: {e}");
                CellRun::Completed(ExecutionRecord {
                    status: CellStatus::Error,
                    output: String::new(),
                    rich_output: None,
                    error: format!("RuntimeError: {e}"),
                })
            }
        };

        if let Some(cell) = self.cells.get_mut(id) {
            match &run {
                CellRun::Completed(record) => {
                    cell.status = record.status;
                    cell.output = record.output.clone();
                    cell.rich_output = record.rich_output.clone();
                    cell.error = record.error.clone();
                }
                CellRun::Interrupted => {
                    cell.status = CellStatus::Idle;
                }
            }
        }

        Some(run)
    }

    /// Re-check graph invariants, plan over all cells, and execute in
    /// order. Stops at the first failing cell (or interrupt), leaving
    /// downstream cells untouched.
    pub fn execute_all(
        &mut self,
    ) -> std::result::Result<Vec<(CellId, CellRun)>, GraphError> {
        let plan = self.build_graph()?.plan_all();
        let mut results = Vec::with_capacity(plan.len());
        for id in plan {
            let Some(run) = self.execute_cell(&id) else {
                continue;
            };
            let stop = matches!(
                &run,
                CellRun::Interrupted
                    | CellRun::Completed(ExecutionRecord {
                        status: CellStatus::Error,
                        ..
                    })
            );
            results.push((id, run));
            if stop {
                break;
            }
        }
        Ok(results)
    }

    /// Reset the worker namespace and return every cell to idle with
    /// cleared outputs.
    pub fn reset(&mut self) -> Result<()> {
        self.channel.reset()?;
        for cell in self.cells.values_mut() {
            cell.clear_outputs();
        }
        Ok(())
    }

    /// Read a variable from the worker namespace.
    pub fn get_var(&mut self, name: &str) -> Result<serde_json::Value> {
        self.channel.get_var(name)
    }

    /// Write a variable into the worker namespace.
    pub fn set_var(&mut self, name: &str, value: &serde_json::Value) -> Result<()> {
        self.channel.set_var(name, value)
    }

    /// Handle for interrupting the in-flight execution without holding any
    /// lock on the engine.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.channel.interrupt_handle()
    }

    /// Per-command worker deadline.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.channel.set_timeout(timeout);
    }

    /// Set a cell's status directly (used by the supervisor to return the
    /// cancelled remainder of a plan to idle). Unknown cells are ignored.
    pub fn set_status(&mut self, id: &CellId, status: CellStatus) {
        if let Some(cell) = self.cells.get_mut(id) {
            cell.status = status;
        }
    }

    /// Restore a persisted cell's outputs (used when loading from disk).
    pub fn restore_outputs(
        &mut self,
        id: &CellId,
        output: String,
        rich_output: Option<serde_json::Value>,
        error: String,
        status: CellStatus,
    ) {
        if let Some(cell) = self.cells.get_mut(id) {
            cell.output = output;
            cell.rich_output = rich_output;
            cell.error = error;
            // A cell persisted as running was interrupted by shutdown.
            cell.status = if status == CellStatus::Running {
                CellStatus::Idle
            } else {
                status
            };
        }
    }

    /// Stop the worker process, if any.
    pub fn shutdown(&mut self) {
        self.channel.stop();
    }
}

impl Default for ReactiveEngine {
    fn default() -> Self {
        Self::new()
    }
}
