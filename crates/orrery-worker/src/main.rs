//! Orrery worker process.
//!
//! Hosts the interpreter session (the notebook namespace) and serves
//! commands over stdin/stdout using length-prefixed bincode frames. The
//! parent process owns the lifecycle: it kills this process outright on
//! timeout or interrupt, which is what makes arbitrary user code safely
//! cancellable. stderr is left alone so tracing output passes through to
//! the parent's log.

use std::io::{BufReader, BufWriter, Read, Write};
use std::panic::AssertUnwindSafe;

use orrery_core::interp::Session;
use orrery_core::ipc::{ExecutePayload, WorkerCommand, WorkerResponse, read_message, write_message};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = BufWriter::new(stdout.lock());

    serve(&mut reader, &mut writer)
}

fn serve<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> anyhow::Result<()> {
    let mut session = Session::new();

    loop {
        let command: WorkerCommand = match read_message(reader) {
            Ok(command) => command,
            Err(_) => {
                // Closed stdin means the parent is gone; exit quietly.
                tracing::debug!("request stream closed, exiting");
                return Ok(());
            }
        };

        let response = match command {
            WorkerCommand::Execute { source } => Some(execute_guarded(&mut session, &source)),
            WorkerCommand::GetVar { name } => Some(match session.get_var(&name) {
                Ok(value) => WorkerResponse::Var {
                    value_json: Some(value.to_string()),
                    error: None,
                },
                Err(message) => WorkerResponse::Var {
                    value_json: None,
                    error: Some(message),
                },
            }),
            WorkerCommand::SetVar { name, value_json } => {
                match serde_json::from_str(&value_json) {
                    Ok(value) => {
                        session.set_var(&name, &value);
                        Some(WorkerResponse::Ok)
                    }
                    Err(e) => Some(WorkerResponse::Var {
                        value_json: None,
                        error: Some(format!("invalid value for '{name}': {e}")),
                    }),
                }
            }
            WorkerCommand::Reset => {
                session.reset();
                Some(WorkerResponse::Ok)
            }
            WorkerCommand::Ping => Some(WorkerResponse::Pong),
            WorkerCommand::Shutdown => {
                tracing::debug!("shutdown requested");
                return Ok(());
            }
        };

        if let Some(response) = response {
            write_message(writer, &response)?;
        }
    }
}

/// Execute a cell, converting an interpreter panic into an error result
/// instead of tearing the process down mid-protocol.
fn execute_guarded(session: &mut Session, source: &str) -> WorkerResponse {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| session.execute(source)));
    match result {
        Ok(outcome) => WorkerResponse::Executed(ExecutePayload {
            success: outcome.success,
            output: outcome.output,
            rich_output_json: outcome.rich_output.map(|doc| doc.to_string()),
            error: outcome.error,
        }),
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            tracing::error!("interpreter panicked: {message}");
            WorkerResponse::Executed(ExecutePayload {
                success: false,
                output: String::new(),
                rich_output_json: None,
                error: format!("RuntimeError: internal interpreter error: {message}"),
            })
        }
    }
}
