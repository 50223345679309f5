//! Connection Handler
//!
//! Handles individual client connections: exactly one command per
//! connection, then the socket is closed.
//!
//! ## States
//! ```text
//! AwaitingCommand ──► Dispatching ──► SendingResponse ──► Closed
//!        │                                                  ▲
//!        └──────── peer closed / protocol failure ──────────┘
//! ```

use std::io::{BufReader, BufWriter, ErrorKind, Read};
use std::net::TcpStream;
use std::time::Duration;

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use crate::config::{Config, Framing};
use crate::dispatcher::Dispatcher;
use crate::error::{FileportError, Result};
use crate::protocol::{
    decode_binary_frame, decode_text_line, read_binary_frame, scan_text_frame, text_line_limit,
    write_response, Command, Response, Status, TextFrame,
};

/// Read size for text-mode accumulation
const READ_CHUNK: usize = 64 * 1024;

/// Characters of a decoded command shown in trace logs
const LOG_PREVIEW_CHARS: usize = 100;

/// Per-session settings, derived from the server config
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub framing: Framing,
    pub max_payload_size: usize,
    pub text_settle: Duration,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            framing: config.framing,
            max_payload_size: config.max_payload_size,
            text_settle: config.text_settle(),
            read_timeout_ms: config.read_timeout_ms,
            write_timeout_ms: config.write_timeout_ms,
        }
    }
}

/// Where a session is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingCommand,
    Dispatching,
    SendingResponse,
    Closed,
}

/// How a session ended without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOutcome {
    /// A response was written
    Responded(Status),

    /// The peer went away before a complete command (or before the reply)
    PeerClosed,

    /// The peer stalled past the read timeout
    TimedOut,
}

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Routes the decoded command to the store
    dispatcher: Dispatcher,

    options: SessionOptions,

    state: SessionState,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and configures timeouts
    pub fn new(stream: TcpStream, dispatcher: Dispatcher, options: SessionOptions) -> Result<Self> {
        // Get peer address for logging before we split the stream
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        let mut connection = Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            dispatcher,
            options,
            state: SessionState::AwaitingCommand,
            peer_addr,
        };

        let read_ms = connection.options.read_timeout_ms;
        let write_ms = connection.options.write_timeout_ms;
        connection.set_timeouts(read_ms, write_ms)?;

        Ok(connection)
    }

    /// Configure connection timeouts
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        let read_stream = self.reader.get_ref();
        let write_stream = self.writer.get_ref();

        read_stream.set_read_timeout(timeout(read_ms))?;
        write_stream.set_write_timeout(timeout(write_ms))?;

        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads one command, sends its response and returns. Protocol failures
    /// are returned as errors and the connection is dropped without a reply.
    pub fn handle(mut self) -> Result<SessionOutcome> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        // Read the command
        let decoded = match self.receive() {
            Ok(Some(decoded)) => decoded,
            Ok(None) => {
                tracing::debug!("Client {} disconnected before sending a command", self.peer_addr);
                return Ok(self.close(SessionOutcome::PeerClosed));
            }
            Err(e) if e.is_disconnect() => {
                tracing::debug!("Client {} disconnected mid-frame: {}", self.peer_addr, e);
                return Ok(self.close(SessionOutcome::PeerClosed));
            }
            Err(e) if e.is_timeout() => {
                tracing::debug!("Read timeout for client {}", self.peer_addr);
                return Ok(self.close(SessionOutcome::TimedOut));
            }
            Err(e) => {
                tracing::warn!("Dropping {}: {}", self.peer_addr, e);
                self.transition(SessionState::Closed);
                return Err(e);
            }
        };

        // Execute it
        self.transition(SessionState::Dispatching);
        if let Ok(command) = &decoded {
            tracing::trace!("Received command from {}: {}", self.peer_addr, preview(command));
        }
        let response = self.dispatcher.handle(decoded);

        // Send the response
        self.transition(SessionState::SendingResponse);
        let status = response.status;
        if let Err(e) = self.send_response(&response) {
            // The client left before the response could be written; that is
            // the client's loss, not a server error
            if e.is_disconnect() {
                tracing::debug!(
                    "Client {} disconnected before response could be sent: {}",
                    self.peer_addr, e
                );
                return Ok(self.close(SessionOutcome::PeerClosed));
            }
            tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
            self.transition(SessionState::Closed);
            return Err(e);
        }

        Ok(self.close(SessionOutcome::Responded(status)))
    }

    // =========================================================================
    // Receiving
    // =========================================================================

    /// Assemble one request per the configured framing
    ///
    /// `Ok(None)` means the peer closed first. The inner `Result` is the
    /// decode outcome, which is answered either way.
    fn receive(&mut self) -> Result<Option<Result<Command>>> {
        match self.options.framing {
            Framing::Binary => self.receive_binary(),
            Framing::Text => self.receive_text(),
        }
    }

    fn receive_binary(&mut self) -> Result<Option<Result<Command>>> {
        let frame = read_binary_frame(&mut self.reader, self.options.max_payload_size)?;
        Ok(frame.map(decode_binary_frame))
    }

    fn receive_text(&mut self) -> Result<Option<Result<Command>>> {
        let limit = text_line_limit(self.options.max_payload_size);
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut chunk = vec![0u8; READ_CHUNK];
        let mut scanned = 0;

        loop {
            let n = match scan_text_frame(&buf, scanned, limit)? {
                TextFrame::Terminated { end } => {
                    return Ok(Some(decode_text_line(&buf[..end])));
                }
                TextFrame::Plausible => {
                    let n = self.settle_read(&mut chunk)?;
                    if n == 0 {
                        // Nothing more within the settle window: take it as final
                        return Ok(Some(decode_text_line(&buf)));
                    }
                    n
                }
                TextFrame::Partial => {
                    let n = self.read_some(&mut chunk)?;
                    if n == 0 {
                        if !buf.is_empty() {
                            tracing::debug!(
                                "Discarding {} bytes of incomplete command from {}",
                                buf.len(),
                                self.peer_addr
                            );
                        }
                        return Ok(None);
                    }
                    n
                }
            };

            scanned = buf.len();
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// One read bounded by the text settle window; 0 on expiry or EOF
    fn settle_read(&mut self, chunk: &mut [u8]) -> Result<usize> {
        if self.options.text_settle.is_zero() {
            return Ok(0);
        }

        self.reader
            .get_ref()
            .set_read_timeout(Some(self.options.text_settle))?;
        let result = self.read_some(chunk);
        self.reader
            .get_ref()
            .set_read_timeout(timeout(self.options.read_timeout_ms))?;

        match result {
            Err(e) if e.is_timeout() => Ok(0),
            other => other,
        }
    }

    fn read_some(&mut self, chunk: &mut [u8]) -> Result<usize> {
        loop {
            match self.reader.read(chunk) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(FileportError::Io(e)),
            }
        }
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Send a response to the client
    fn send_response(&mut self, response: &Response) -> Result<()> {
        write_response(&mut self.writer, response)?;
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!("{}: {:?} -> {:?}", self.peer_addr, self.state, next);
        self.state = next;
    }

    fn close(&mut self, outcome: SessionOutcome) -> SessionOutcome {
        self.transition(SessionState::Closed);
        outcome
    }}

/// Debug rendering of a command, cut short for the log
fn preview(command: &Command) -> String {
    let rendered = format!("{:?}", command);
    match rendered.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &rendered[..cut]),
        None => rendered,
    }
}

fn timeout(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
