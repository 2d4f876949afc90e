//! IPC with the isolated worker process.
//!
//! The worker owns the notebook namespace; the engine owns nothing but the
//! channel. Communication is length-prefixed bincode frames over the
//! worker's stdin/stdout, with every wait bounded by a deadline.

pub mod channel;
pub mod protocol;

pub use channel::{ExecuteOutcome, InterruptHandle, WorkerChannel};
pub use protocol::{ExecutePayload, WorkerCommand, WorkerResponse, read_message, write_message};
