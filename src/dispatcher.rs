//! Command Dispatcher
//!
//! Maps a parsed command onto the file store and turns the outcome into a
//! response. Stateless between calls.
//!
//! ## Outcomes
//! - LIST   → OK + names (empty list for an empty store)
//! - GET    → OK + base64 content, or ERROR
//! - UPLOAD → OK + confirmation, or ERROR (missing args, bad base64, I/O)
//! - DELETE → OK + confirmation, or ERROR
//! - anything unparseable → ERROR, connection stays usable for the reply

use std::sync::Arc;

use crate::error::{FileportError, Result};
use crate::protocol::{Command, Response};
use crate::store::FileStore;

/// Reply to any verb outside LIST/GET/UPLOAD/DELETE
pub const UNKNOWN_COMMAND: &str = "Unknown command";

/// Routes commands to the file store
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<FileStore>,
}

impl Dispatcher {
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }

    /// Turn a decode result into a response
    ///
    /// Decode errors (unknown verb, missing arguments, bad encoding) become
    /// ERROR responses like any other failure.
    pub fn handle(&self, decoded: Result<Command>) -> Response {
        match decoded {
            Ok(command) => self.dispatch(command),
            Err(e) => {
                tracing::debug!("Rejected request: {}", e);
                error_response(&e)
            }
        }
    }

    /// Execute a command and return a response
    pub fn dispatch(&self, command: Command) -> Response {
        let verb = command.verb();
        tracing::trace!("Dispatching {}", verb);

        match self.execute(command) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("{} failed: {}", verb, e);
                error_response(&e)
            }
        }
    }

    fn execute(&self, command: Command) -> Result<Response> {
        match command {
            Command::List => Ok(Response::listing(self.store.list()?)),
            Command::Get { filename } => {
                let content = self.store.read(&filename)?;
                Ok(Response::file(filename, &content))
            }
            Command::Upload { filename, payload } => {
                // Validate before decoding so a bad name never costs a decode
                crate::store::validate_name(&filename)?;
                let bytes = payload.into_bytes()?;
                self.store.write(&filename, &bytes)?;
                Ok(Response::ok(format!("File {} uploaded successfully", filename)))
            }
            Command::Delete { filename } => {
                self.store.delete(&filename)?;
                Ok(Response::ok(format!("File {} deleted successfully", filename)))
            }
        }
    }
}

/// Render an error as the client-facing ERROR response
fn error_response(error: &FileportError) -> Response {
    match error {
        FileportError::UnknownVerb(_) => Response::error(UNKNOWN_COMMAND),
        FileportError::InvalidArguments(detail) => {
            Response::error(format!("Invalid command format: {}", detail))
        }
        _ => Response::error(error.to_string()),
    }
}
