//! Core engine for the Orrery reactive notebook.
//!
//! This crate provides:
//! - The cell language front end (lexer, parser, AST)
//! - Symbol extraction and the cell dependency graph
//! - The reactive engine owning the cell collection
//! - The IPC channel to the isolated worker process
//! - The interpreter the worker runs cells with

pub mod analyze;
pub mod engine;
pub mod error;
pub mod graph;
pub mod interp;
pub mod ipc;
pub mod lang;

pub use analyze::{SymbolSet, extract};
pub use engine::{CellData, CellRun, CellStatus, ExecutionRecord, ReactiveEngine};
pub use error::{Error, Result};
pub use graph::{CellGraph, CellId, GraphError};
pub use ipc::{ExecuteOutcome, ExecutePayload, InterruptHandle, WorkerChannel};
