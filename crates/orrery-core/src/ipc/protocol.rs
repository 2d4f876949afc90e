//! IPC protocol messages for Orrery worker processes.
//!
//! Uses length-prefixed bincode messages over stdin/stdout.
//! Format: 4-byte length (u32 LE) + bincode-encoded message.

use std::io::{Read, Write};

use bincode::{Decode, Encode};

use crate::error::{Error, Result};

/// Command sent from the engine to the worker process.
#[derive(Debug, Clone, Encode, Decode)]
pub enum WorkerCommand {
    /// Execute a cell's source in the persistent namespace.
    Execute {
        /// The cell source text.
        source: String,
    },

    /// Read a namespace variable.
    GetVar {
        /// Variable name.
        name: String,
    },

    /// Write a namespace variable.
    SetVar {
        /// Variable name.
        name: String,
        /// JSON-encoded value.
        value_json: String,
    },

    /// Clear the namespace.
    Reset,

    /// Exit the worker process. No response is sent.
    Shutdown,

    /// Liveness check.
    Ping,
}

/// Response sent from the worker to the engine.
#[derive(Debug, Clone, Encode, Decode)]
pub enum WorkerResponse {
    /// Result of an `Execute` command.
    Executed(ExecutePayload),

    /// Result of a `GetVar` command. `value_json` is `None` when the value
    /// exists but is not serializable (functions, classes, modules).
    Var {
        value_json: Option<String>,
        error: Option<String>,
    },

    /// Acknowledgement of `SetVar` / `Reset`.
    Ok,

    /// Response to `Ping`.
    Pong,

    /// Sentinel injected by the engine side to unblock a reader during a
    /// user interrupt. The worker never sends this.
    Interrupted,
}

/// The outcome of executing one cell inside the worker.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct ExecutePayload {
    /// Whether the cell completed without an error.
    pub success: bool,
    /// Captured stdout plus the repr of the trailing expression.
    pub output: String,
    /// JSON-encoded rich output document, when the result is table/array
    /// shaped.
    pub rich_output_json: Option<String>,
    /// Rendered error (`"<Kind>: <message>"`), empty on success.
    pub error: String,
}

impl ExecutePayload {
    /// A synthesized timeout-shaped result, used when the worker had to be
    /// killed (deadline expired) or died mid-command.
    pub fn timeout(seconds: u64) -> Self {
        Self {
            success: false,
            output: String::new(),
            rich_output_json: None,
            error: format!("TimeoutError: cell execution timed out after {seconds} seconds"),
        }
    }
}

/// Reject absurdly large frames (100 MB).
const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Write a message using length-prefixed bincode encoding.
pub fn write_message<W: Write, T: Encode>(writer: &mut W, message: &T) -> Result<()> {
    let config = bincode::config::standard();
    let bytes = bincode::encode_to_vec(message, config)
        .map_err(|e| Error::Serialization(format!("failed to encode IPC message: {e}")))?;

    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .map_err(|e| Error::Ipc(format!("failed to write IPC message length: {e}")))?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::Ipc(format!("failed to write IPC message body: {e}")))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("failed to flush IPC stream: {e}")))?;

    Ok(())
}

/// Read a message using length-prefixed bincode encoding.
pub fn read_message<R: Read, T: Decode<()>>(reader: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Ipc(format!("failed to read IPC message length: {e}")))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(Error::Ipc(format!("IPC message too large: {len} bytes")));
    }

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Ipc(format!("failed to read IPC message body: {e}")))?;

    let config = bincode::config::standard();
    let (message, _) = bincode::decode_from_slice(&bytes, config)
        .map_err(|e| Error::Serialization(format!("failed to decode IPC message: {e}")))?;

    Ok(message)
}
