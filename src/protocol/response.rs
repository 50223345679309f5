//! Response definitions
//!
//! Represents responses to clients.
//!
//! ## JSON shapes
//! ```text
//! LIST            {"status":"OK","data":["a.txt","b.bin"]}
//! GET             {"status":"OK","data_namafile":"a.txt","data_file":"<base64>"}
//! UPLOAD/DELETE   {"status":"OK","data":"File a.txt uploaded successfully"}
//! any failure     {"status":"ERROR","data":"<message>"}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::encoding::{decode_base64, encode_base64};

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

/// Everything after `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Body {
    /// GET result: file name and base64 content
    File {
        data_namafile: String,
        data_file: String,
    },

    /// LIST result
    Listing { data: Vec<String> },

    /// Confirmation or error message
    Message { data: String },
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,

    #[serde(flatten)]
    pub body: Body,
}

impl Response {
    /// Create an OK response listing file names
    pub fn listing(names: Vec<String>) -> Self {
        Self {
            status: Status::Ok,
            body: Body::Listing { data: names },
        }
    }

    /// Create an OK response carrying a file
    pub fn file(name: impl Into<String>, content: &[u8]) -> Self {
        Self {
            status: Status::Ok,
            body: Body::File {
                data_namafile: name.into(),
                data_file: encode_base64(content),
            },
        }
    }

    /// Create an OK response with a confirmation message
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            body: Body::Message {
                data: message.into(),
            },
        }
    }

    /// Create an ERROR response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            body: Body::Message {
                data: message.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// The message text, for confirmation and error responses
    pub fn message(&self) -> Option<&str> {
        match &self.body {
            Body::Message { data } => Some(data),
            _ => None,
        }
    }

    /// The file names, for LIST responses
    pub fn names(&self) -> Option<&[String]> {
        match &self.body {
            Body::Listing { data } => Some(data),
            _ => None,
        }
    }

    /// Decode the file carried by a GET response into `(name, content)`
    pub fn file_content(&self) -> Option<Result<(String, Vec<u8>)>> {
        match &self.body {
            Body::File {
                data_namafile,
                data_file,
            } => Some(decode_base64(data_file).map(|content| (data_namafile.clone(), content))),
            _ => None,
        }
    }

    /// Serialize to a single-line JSON object
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON object
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
