//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! Two framings exist; a deployment picks one for all of its connections.
//!
//! ## Binary framing (primary)
//! ```text
//! ┌──────────┬─────────────────────┬──────────┬─────────────────────┐
//! │ Len (4)  │ "VERB [filename]"   │ Len (4)  │ raw payload         │
//! └──────────┴─────────────────────┴──────────┴─────────────────────┘
//!                                   └──── UPLOAD only ──────────────┘
//! ```
//!
//! ## Text framing (compatibility)
//! ```text
//! VERB [filename] [base64]\r\n
//! ```
//!
//! ### Commands
//! - LIST
//! - GET    <filename>
//! - UPLOAD <filename> <payload>
//! - DELETE <filename>
//!
//! Verbs are case-insensitive.
//!
//! ### Response Format
//! One JSON object followed by `\r\n\r\n`, for both framings.
//! - `{"status":"OK"|"ERROR", ...}`

mod codec;
mod command;
mod encoding;
mod response;
mod text;

pub use codec::{
    decode_binary_frame, decode_response, encode_binary_request, encode_response,
    is_upload_command, read_binary_frame, read_response, write_binary_request, write_response,
    BinaryFrame, LENGTH_PREFIX_SIZE, MAX_COMMAND_SIZE, RESPONSE_TERMINATOR,
};
pub use command::{Command, Payload, Verb};
pub use encoding::{decode_base64, encode_base64, normalize_padding};
pub use response::{Body, Response, Status};
pub use text::{
    decode_text_line, encode_text_request, looks_complete, scan_text_frame, text_line_limit,
    TextFrame,
};
