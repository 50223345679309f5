//! Blocking client
//!
//! Opens a fresh connection per command, as the server expects.

use std::io::{BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::config::Framing;
use crate::error::{FileportError, Result};
use crate::protocol::{
    encode_text_request, read_response, write_binary_request, Command, Payload, Response,
};
use crate::store::validate_name;

/// Client for a fileport server
#[derive(Debug, Clone)]
pub struct Client {
    addr: String,
    framing: Framing,
    timeout: Option<Duration>,
}

impl Client {
    /// Create a client for `addr`; no connection is made until a command is sent
    pub fn new(addr: impl Into<String>, framing: Framing) -> Self {
        Self {
            addr: addr.into(),
            framing,
            timeout: Some(Duration::from_secs(30)),
        }
    }

    /// Read/write timeout per connection (`None` waits forever)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one command and wait for its response
    pub fn send(&self, command: &Command) -> Result<Response> {
        let stream = TcpStream::connect(&self.addr)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;

        let mut writer = BufWriter::new(stream.try_clone()?);
        match self.framing {
            Framing::Binary => write_binary_request(&mut writer, command)?,
            Framing::Text => {
                writer.write_all(&encode_text_request(command))?;
                writer.flush()?;
            }
        }

        let mut reader = BufReader::new(stream);
        read_response(&mut reader)
    }

    // =========================================================================
    // Typed helpers
    // =========================================================================

    /// Names of the stored files
    pub fn list(&self) -> Result<Vec<String>> {
        let response = self.send(&Command::List)?;
        let response = into_ok(response)?;
        response
            .names()
            .map(|names| names.to_vec())
            .ok_or_else(|| unexpected("LIST"))
    }

    /// Contents of `filename`
    pub fn get(&self, filename: &str) -> Result<Vec<u8>> {
        validate_name(filename)?;
        let response = self.send(&Command::Get {
            filename: filename.to_string(),
        })?;
        let response = into_ok(response)?;
        let (_, content) = response.file_content().ok_or_else(|| unexpected("GET"))??;
        Ok(content)
    }

    /// Store `content` as `filename`; returns the server's confirmation
    pub fn upload(&self, filename: &str, content: &[u8]) -> Result<String> {
        validate_name(filename)?;
        let response = self.send(&Command::Upload {
            filename: filename.to_string(),
            payload: Payload::Raw(content.to_vec()),
        })?;
        confirmation(into_ok(response)?, "UPLOAD")
    }

    /// Remove `filename`; returns the server's confirmation
    pub fn delete(&self, filename: &str) -> Result<String> {
        validate_name(filename)?;
        let response = self.send(&Command::Delete {
            filename: filename.to_string(),
        })?;
        confirmation(into_ok(response)?, "DELETE")
    }
}

fn into_ok(response: Response) -> Result<Response> {
    if response.is_ok() {
        return Ok(response);
    }
    let message = response.message().unwrap_or("unspecified error").to_string();
    Err(FileportError::Remote(message))
}

fn confirmation(response: Response, verb: &str) -> Result<String> {
    response
        .message()
        .map(str::to_string)
        .ok_or_else(|| unexpected(verb))
}

fn unexpected(verb: &str) -> FileportError {
    FileportError::Protocol(format!("unexpected response shape for {}", verb))
}
