//! Text-line framing
//!
//! `VERB [filename] [base64]` terminated by `\n` or `\r\n`.
//!
//! Older clients send the command with no terminator at all and then wait
//! for the reply, so a buffer that already parses as a whole command is
//! reported as `Plausible`: the session gives the peer one short settle read
//! to send more before treating the buffer as final.

use crate::error::{FileportError, Result};

use super::codec::MAX_COMMAND_SIZE;
use super::command::{Command, Tokens, Verb};

/// Framing state of a text receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFrame {
    /// A terminator was found; the command is `buf[..end]`
    Terminated { end: usize },

    /// No terminator yet, but the buffer already holds a whole command
    Plausible,

    /// Keep reading
    Partial,
}

/// Longest line accepted for a given maximum upload size
pub fn text_line_limit(max_payload: usize) -> usize {
    // base64 grows 3 bytes into 4 chars
    max_payload.div_ceil(3) * 4 + MAX_COMMAND_SIZE
}

/// Classify `buf`, searching for the terminator from `scan_from` onwards
///
/// Callers pass the previous buffer length as `scan_from` so large uploads
/// are not rescanned on every read.
pub fn scan_text_frame(buf: &[u8], scan_from: usize, limit: usize) -> Result<TextFrame> {
    let scan_from = scan_from.min(buf.len());
    if let Some(pos) = buf[scan_from..].iter().position(|&b| b == b'\n') {
        let newline = scan_from + pos;
        let end = if newline > 0 && buf[newline - 1] == b'\r' {
            newline - 1
        } else {
            newline
        };
        return Ok(TextFrame::Terminated { end });
    }

    if buf.len() > limit {
        return Err(FileportError::Protocol(format!(
            "Command line exceeds {} bytes without a terminator",
            limit
        )));
    }

    if looks_complete(buf) {
        Ok(TextFrame::Plausible)
    } else {
        Ok(TextFrame::Partial)
    }
}

/// Whether an unterminated buffer already carries every token its verb needs
///
/// Unknown verbs count as complete so they get their error reply.
pub fn looks_complete(buf: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&buf[..buf.len().min(MAX_COMMAND_SIZE)]);
    let tokens = Tokens::split(&head);

    if tokens.verb.is_empty() {
        return false;
    }

    match tokens.verb.parse::<Verb>() {
        Ok(Verb::List) => true,
        Ok(Verb::Get) | Ok(Verb::Delete) => !tokens.filename.is_empty(),
        Ok(Verb::Upload) => !tokens.filename.is_empty() && !tokens.rest.is_empty(),
        Err(_) => true,
    }
}

/// Decode a command line (terminator already stripped)
pub fn decode_text_line(line: &[u8]) -> Result<Command> {
    let line = std::str::from_utf8(line).map_err(|_| {
        FileportError::InvalidArguments("command is not valid UTF-8".to_string())
    })?;
    Command::parse_text(line)
}

/// Encode a command as a terminated text line
pub fn encode_text_request(command: &Command) -> Vec<u8> {
    let mut line = command.to_text_line().into_bytes();
    line.extend_from_slice(b"\r\n");
    line
}
