//! Protocol codec
//!
//! Encoding and decoding functions for the length-prefixed wire protocol.
//!
//! ## Wire Format
//!
//! ### Request Format
//! ```text
//! ┌──────────┬─────────────────────┬──────────┬─────────────────────┐
//! │ Len (4)  │ "VERB [filename]"   │ Len (4)  │ raw payload         │
//! └──────────┴─────────────────────┴──────────┴─────────────────────┘
//!                                   └──── UPLOAD only ──────────────┘
//! ```
//! Lengths are big-endian `u32`.
//!
//! ### Response Format
//! ```text
//! ┌───────────────────────────────┬──────────────┐
//! │ JSON object (UTF-8)           │ "\r\n\r\n"   │
//! └───────────────────────────────┴──────────────┘
//! ```

use std::io::{self, ErrorKind, Read, Write};

use crate::error::{FileportError, Result};

use super::command::{Command, Tokens, Verb};
use super::response::Response;

/// Length prefix size: big-endian u32
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Maximum command string size (64 KB)
pub const MAX_COMMAND_SIZE: usize = 64 * 1024;

/// Marks the end of every response
pub const RESPONSE_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Initial buffer reservation for payload blocks; the rest grows as bytes arrive
const PAYLOAD_PREALLOC: usize = 1024 * 1024;

/// A binary request as read off the wire, before parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFrame {
    /// Command string bytes (`VERB [filename]`)
    pub command: Vec<u8>,

    /// Raw payload block, present only for UPLOAD
    pub payload: Option<Vec<u8>>,
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_len (4) + cmd + [payload_len (4) + payload]
pub fn encode_binary_request(command: &Command) -> Result<Vec<u8>> {
    let (line, payload) = command.to_binary_parts()?;

    let payload_len = payload.as_ref().map_or(0, |p| LENGTH_PREFIX_SIZE + p.len());
    let mut message = Vec::with_capacity(LENGTH_PREFIX_SIZE + line.len() + payload_len);
    message.extend_from_slice(&block_len(line.len())?.to_be_bytes());
    message.extend_from_slice(line.as_bytes());

    if let Some(payload) = payload {
        message.extend_from_slice(&block_len(payload.len())?.to_be_bytes());
        message.extend_from_slice(&payload);
    }

    Ok(message)
}

/// Decode a frame into a command
///
/// Failures here are client errors answered on the same connection.
pub fn decode_binary_frame(frame: BinaryFrame) -> Result<Command> {
    let line = std::str::from_utf8(&frame.command).map_err(|_| {
        FileportError::InvalidArguments("command is not valid UTF-8".to_string())
    })?;
    Command::parse_binary(line, frame.payload)
}

/// Whether a command string announces an UPLOAD (and so a payload block follows)
pub fn is_upload_command(command: &[u8]) -> bool {
    let head = &command[..command.len().min(MAX_COMMAND_SIZE)];
    let text = String::from_utf8_lossy(head);
    Tokens::split(&text).verb.eq_ignore_ascii_case(Verb::Upload.as_str())
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: JSON + "\r\n\r\n"
pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    let json = response.to_json()?;
    let mut message = Vec::with_capacity(json.len() + RESPONSE_TERMINATOR.len());
    message.extend_from_slice(json.as_bytes());
    message.extend_from_slice(RESPONSE_TERMINATOR);
    Ok(message)
}

/// Decode a response from bytes, with or without the terminator
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let json = match find_terminator(bytes, 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    };
    Response::from_json(json)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete binary request from a stream
///
/// Returns `Ok(None)` when the peer closes before sending anything.
/// Blocks until the frame (and UPLOAD payload) is complete or an error occurs.
pub fn read_binary_frame<R: Read>(
    reader: &mut R,
    max_payload: usize,
) -> Result<Option<BinaryFrame>> {
    let command_len = match read_length(reader)? {
        Some(len) => len,
        None => return Ok(None),
    };

    if command_len > MAX_COMMAND_SIZE {
        return Err(FileportError::Protocol(format!(
            "Command too large: {} bytes (max {})",
            command_len, MAX_COMMAND_SIZE
        )));
    }

    let command = read_block(reader, command_len)?;

    let payload = if is_upload_command(&command) {
        let payload_len = read_length(reader)?.ok_or_else(|| {
            FileportError::Io(io::Error::new(
                ErrorKind::UnexpectedEof,
                "connection closed before the payload length",
            ))
        })?;

        if payload_len > max_payload {
            return Err(FileportError::Protocol(format!(
                "Payload too large: {} bytes (max {})",
                payload_len, max_payload
            )));
        }

        Some(read_block(reader, payload_len)?)
    } else {
        None
    };

    Ok(Some(BinaryFrame { command, payload }))
}

/// Write a command to a stream
pub fn write_binary_request<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    let bytes = encode_binary_request(command)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let bytes = encode_response(response)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
///
/// Reads until the terminator or EOF, whichever comes first.
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let mut received = Vec::new();
    let mut chunk = [0u8; 64 * 1024];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            break;
        }

        // Only the tail can complete a terminator that started in an earlier chunk
        let search_from = received.len().saturating_sub(RESPONSE_TERMINATOR.len() - 1);
        received.extend_from_slice(&chunk[..n]);

        if let Some(end) = find_terminator(&received, search_from) {
            received.truncate(end);
            break;
        }
    }

    if received.is_empty() {
        return Err(FileportError::Io(io::Error::new(
            ErrorKind::UnexpectedEof,
            "connection closed without a response",
        )));
    }

    Response::from_json(&received)
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Read a big-endian u32 length; `None` if the stream ends before its first byte
fn read_length<R: Read>(reader: &mut R) -> Result<Option<usize>> {
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;

    while filled < LENGTH_PREFIX_SIZE {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(FileportError::Io(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "connection closed inside a length prefix",
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Some(u32::from_be_bytes(prefix) as usize))
}

/// Read exactly `len` bytes without trusting `len` for the allocation up front
fn read_block<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut block = Vec::with_capacity(len.min(PAYLOAD_PREALLOC));
    reader.take(len as u64).read_to_end(&mut block)?;

    if block.len() < len {
        return Err(FileportError::Io(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("connection closed after {} of {} bytes", block.len(), len),
        )));
    }
    Ok(block)
}

fn block_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        FileportError::InvalidArguments(format!(
            "block of {} bytes exceeds the u32 length prefix",
            len
        ))
    })
}

fn find_terminator(bytes: &[u8], from: usize) -> Option<usize> {
    bytes[from..]
        .windows(RESPONSE_TERMINATOR.len())
        .position(|w| w == RESPONSE_TERMINATOR)
        .map(|pos| from + pos)
}
