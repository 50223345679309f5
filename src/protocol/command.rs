//! Command definitions
//!
//! Represents commands from clients.

use std::fmt;
use std::str::FromStr;

use crate::error::{FileportError, Result};

use super::encoding::{decode_base64, encode_base64};

/// Command verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    List,
    Get,
    Upload,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::List => "LIST",
            Verb::Get => "GET",
            Verb::Upload => "UPLOAD",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = FileportError;

    /// Case-insensitive
    fn from_str(token: &str) -> Result<Self> {
        match token.to_ascii_uppercase().as_str() {
            "LIST" => Ok(Verb::List),
            "GET" => Ok(Verb::Get),
            "UPLOAD" => Ok(Verb::Upload),
            "DELETE" => Ok(Verb::Delete),
            _ => Err(FileportError::UnknownVerb(token.to_string())),
        }
    }
}

/// UPLOAD content as it arrived on the wire
#[derive(Clone, PartialEq, Eq)]
pub enum Payload {
    /// Inline base64 text (text framing), possibly missing its padding
    Base64(String),

    /// Raw bytes from the second length-prefixed block (binary framing)
    Raw(Vec<u8>),
}

impl Payload {
    /// Decode into the bytes to store
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Payload::Base64(text) => decode_base64(&text),
            Payload::Raw(bytes) => Ok(bytes),
        }
    }
}

// Payloads can be hundreds of megabytes; never dump them into logs
impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Base64(text) => write!(f, "Base64({} chars)", text.len()),
            Payload::Raw(bytes) => write!(f, "Raw({} bytes)", bytes.len()),
        }
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List the files in the store
    List,

    /// Fetch a file
    Get { filename: String },

    /// Create or overwrite a file
    Upload { filename: String, payload: Payload },

    /// Remove a file
    Delete { filename: String },
}

impl Command {
    /// Get the command verb
    pub fn verb(&self) -> Verb {
        match self {
            Command::List => Verb::List,
            Command::Get { .. } => Verb::Get,
            Command::Upload { .. } => Verb::Upload,
            Command::Delete { .. } => Verb::Delete,
        }
    }

    /// Get the target filename, if the verb takes one
    pub fn filename(&self) -> Option<&str> {
        match self {
            Command::List => None,
            Command::Get { filename }
            | Command::Upload { filename, .. }
            | Command::Delete { filename } => Some(filename),
        }
    }

    /// Parse a text-framing command line: `VERB [filename] [base64]`
    pub fn parse_text(line: &str) -> Result<Self> {
        Self::parse_with(line, |tokens| {
            if tokens.rest.is_empty() {
                return Err(FileportError::InvalidArguments(
                    "UPLOAD requires a filename and base64 content".to_string(),
                ));
            }
            // The blob never contains whitespace; anything more is a misplaced token
            if tokens.rest.contains(char::is_whitespace) {
                return Err(FileportError::InvalidArguments(
                    "UPLOAD takes a filename and a single base64 token".to_string(),
                ));
            }
            Ok(Payload::Base64(tokens.rest.to_string()))
        })
    }

    /// Parse a binary-framing command string: `VERB [filename]`, with the
    /// raw UPLOAD payload taken from its own block
    pub fn parse_binary(line: &str, payload: Option<Vec<u8>>) -> Result<Self> {
        Self::parse_with(line, move |tokens| {
            tokens.reject_extra(Verb::Upload)?;
            payload.map(Payload::Raw).ok_or_else(|| {
                FileportError::InvalidArguments("UPLOAD requires a payload block".to_string())
            })
        })
    }

    fn parse_with<F>(line: &str, upload_payload: F) -> Result<Self>
    where
        F: FnOnce(&Tokens<'_>) -> Result<Payload>,
    {
        let tokens = Tokens::split(line);
        let verb = tokens.parse_verb()?;

        Ok(match verb {
            Verb::List => Command::List,
            Verb::Get => {
                let filename = tokens.require_filename(verb)?;
                tokens.reject_extra(verb)?;
                Command::Get { filename }
            }
            Verb::Delete => {
                let filename = tokens.require_filename(verb)?;
                tokens.reject_extra(verb)?;
                Command::Delete { filename }
            }
            Verb::Upload => {
                let filename = tokens.require_filename(verb)?;
                Command::Upload {
                    filename,
                    payload: upload_payload(&tokens)?,
                }
            }
        })
    }

    /// Render as a text-framing line (without terminator)
    pub fn to_text_line(&self) -> String {
        match self {
            Command::List => Verb::List.to_string(),
            Command::Get { filename } => format!("{} {}", Verb::Get, filename),
            Command::Delete { filename } => format!("{} {}", Verb::Delete, filename),
            Command::Upload { filename, payload } => {
                let blob = match payload {
                    Payload::Base64(text) => text.clone(),
                    Payload::Raw(bytes) => encode_base64(bytes),
                };
                format!("{} {} {}", Verb::Upload, filename, blob)
            }
        }
    }

    /// Render the binary-framing command string and its payload block
    pub fn to_binary_parts(&self) -> Result<(String, Option<Vec<u8>>)> {
        Ok(match self {
            Command::List => (Verb::List.to_string(), None),
            Command::Get { filename } => (format!("{} {}", Verb::Get, filename), None),
            Command::Delete { filename } => (format!("{} {}", Verb::Delete, filename), None),
            Command::Upload { filename, payload } => {
                let bytes = payload.clone().into_bytes()?;
                (format!("{} {}", Verb::Upload, filename), Some(bytes))
            }
        })
    }
}

// =============================================================================
// Tokenizer
// =============================================================================

/// A command line split on the first two runs of whitespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tokens<'a> {
    pub verb: &'a str,
    pub filename: &'a str,
    pub rest: &'a str,
}

impl<'a> Tokens<'a> {
    pub fn split(line: &'a str) -> Self {
        let (verb, remainder) = split_token(line);
        let (filename, rest) = split_token(remainder);
        Self {
            verb,
            filename,
            rest: rest.trim_end(),
        }
    }

    fn parse_verb(&self) -> Result<Verb> {
        if self.verb.is_empty() {
            return Err(FileportError::InvalidArguments("empty command".to_string()));
        }
        self.verb.parse()
    }

    fn require_filename(&self, verb: Verb) -> Result<String> {
        if self.filename.is_empty() {
            return Err(FileportError::InvalidArguments(format!(
                "{} requires a filename",
                verb
            )));
        }
        Ok(self.filename.to_string())
    }

    fn reject_extra(&self, verb: Verb) -> Result<()> {
        if !self.rest.is_empty() {
            return Err(FileportError::InvalidArguments(format!(
                "{} takes a single filename",
                verb
            )));
        }
        Ok(())
    }
}

fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}
