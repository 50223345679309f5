//! Worker handoff channel
//!
//! Parent and worker processes talk over a Unix-domain stream socket.
//!
//! ```text
//! parent ──► worker   [len u32be][bincode Handoff]   + SCM_RIGHTS(tcp fd)
//! worker ──► parent   [len u32be][bincode Report]
//! ```
//!
//! The handoff message is small enough to arrive in the same `recvmsg` as
//! its ancillary data; any remainder is read normally.

use std::io::{self, ErrorKind, IoSlice, IoSliceMut, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::sys::socket::{recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{FileportError, Result};
use crate::network::SessionOutcome;

/// Upper bound on a single control message
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Sent with each connection handed to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    pub session_id: u64,
    pub peer: String,
}

/// Sent by a worker when it is done with a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub session_id: u64,
    pub result: std::result::Result<SessionOutcome, String>,
}

// =============================================================================
// Message framing
// =============================================================================

/// Encode a message as `len (4) + bincode`
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let body = bincode::serialize(message)?;
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(FileportError::Serialization(format!(
            "message of {} bytes exceeds {}",
            body.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Read one message; `None` if the channel closed at a message boundary
pub fn read_message<T: DeserializeOwned, R: Read>(reader: &mut R) -> Result<Option<T>> {
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(prefix) as usize;
    let body = read_body(reader, len)?;
    Ok(Some(bincode::deserialize(&body)?))
}

/// Write one message
pub fn write_message<T: Serialize, W: Write>(writer: &mut W, message: &T) -> Result<()> {
    let framed = encode_message(message)?;
    writer.write_all(&framed)?;
    writer.flush()?;
    Ok(())
}

fn read_body<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    if len > MAX_MESSAGE_SIZE {
        return Err(FileportError::Protocol(format!(
            "worker message of {} bytes exceeds {}",
            len, MAX_MESSAGE_SIZE
        )));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(body)
}

// =============================================================================
// Socket passing
// =============================================================================

/// Send a connection to a worker
///
/// The parent's copy of `stream` stays open; the caller drops it afterwards.
pub fn send_connection(channel: &UnixStream, stream: &TcpStream, handoff: &Handoff) -> Result<()> {
    let framed = encode_message(handoff)?;
    let fds = [stream.as_raw_fd()];
    let cmsgs = [ControlMessage::ScmRights(&fds)];
    let iov = [IoSlice::new(&framed)];

    let sent = sendmsg::<()>(channel.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), None)
        .map_err(io::Error::from)?;

    // The descriptor rides with the first byte; the rest goes as plain data
    if sent < framed.len() {
        let mut writer = channel;
        writer.write_all(&framed[sent..])?;
    }
    Ok(())
}

/// Receive a connection from the parent; `None` when the parent closed the channel
pub fn recv_connection(channel: &UnixStream) -> Result<Option<(Handoff, TcpStream)>> {
    let mut buf = vec![0u8; 4096];
    let mut cmsg_buffer = nix::cmsg_space!([RawFd; 1]);

    let (received, fd) = {
        let mut iov = [IoSliceMut::new(&mut buf)];
        let msg = recvmsg::<()>(
            channel.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg_buffer),
            MsgFlags::empty(),
        )
        .map_err(io::Error::from)?;

        let mut fd: Option<OwnedFd> = None;
        for cmsg in msg.cmsgs().map_err(io::Error::from)? {
            if let ControlMessageOwned::ScmRights(raw_fds) = cmsg {
                for raw in raw_fds {
                    // SAFETY: the kernel just installed this descriptor for us
                    // and nothing else refers to it
                    let owned = unsafe { OwnedFd::from_raw_fd(raw) };
                    if fd.is_none() {
                        fd = Some(owned);
                    }
                }
            }
        }
        (msg.bytes, fd)
    };

    if received == 0 {
        return Ok(None);
    }

    let fd = fd.ok_or_else(|| {
        FileportError::Protocol("handoff arrived without a socket".to_string())
    })?;

    // Finish the message if it was split across reads
    let mut data = buf[..received].to_vec();
    if data.len() < 4 {
        let mut rest = vec![0u8; 4 - data.len()];
        (&*channel).read_exact(&mut rest)?;
        data.extend_from_slice(&rest);
    }
    let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(FileportError::Protocol(format!(
            "handoff of {} bytes exceeds {}",
            len, MAX_MESSAGE_SIZE
        )));
    }
    if data.len() < 4 + len {
        let mut rest = vec![0u8; 4 + len - data.len()];
        (&*channel).read_exact(&mut rest)?;
        data.extend_from_slice(&rest);
    }

    let handoff: Handoff = bincode::deserialize(&data[4..4 + len])?;
    Ok(Some((handoff, TcpStream::from(fd))))
}
