//! Base64 helpers
//!
//! Clients in the wild send base64 with its `=` padding stripped, so every
//! decode first pads the text up to a multiple of 4.

use std::borrow::Cow;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;

use crate::error::{FileportError, Result};

/// Pad `text` with `=` up to the next multiple of 4
pub fn normalize_padding(text: &str) -> Cow<'_, str> {
    match text.len() % 4 {
        0 => Cow::Borrowed(text),
        rem => {
            let mut padded = String::with_capacity(text.len() + 4 - rem);
            padded.push_str(text);
            padded.extend(std::iter::repeat('=').take(4 - rem));
            Cow::Owned(padded)
        }
    }
}

/// Decode base64 text, tolerating missing padding and surrounding whitespace
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    let padded = normalize_padding(text.trim());
    B64.decode(padded.as_bytes())
        .map_err(|e| FileportError::Decode(e.to_string()))
}

/// Encode bytes as padded standard base64
pub fn encode_base64(bytes: &[u8]) -> String {
    B64.encode(bytes)
}
