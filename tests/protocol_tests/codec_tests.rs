//! Codec Tests
//!
//! Tests for binary request framing and response encoding/decoding.

use std::io::Cursor;

use fileport::error::FileportError;
use fileport::protocol::{
    decode_binary_frame, decode_response, encode_binary_request, encode_response,
    read_binary_frame, read_response, write_binary_request, write_response, BinaryFrame, Command,
    Payload, Response, Status, MAX_COMMAND_SIZE, RESPONSE_TERMINATOR,
};

const MAX_PAYLOAD: usize = 1024 * 1024;

// =============================================================================
// Helper Functions
// =============================================================================

fn frame_bytes(command: &[u8], payload: Option<&[u8]>) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(command.len() as u32).to_be_bytes());
    bytes.extend_from_slice(command);
    if let Some(payload) = payload {
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(payload);
    }
    bytes
}

fn read_command(bytes: Vec<u8>) -> fileport::Result<Command> {
    let frame = read_binary_frame(&mut Cursor::new(bytes), MAX_PAYLOAD)?
        .expect("expected a frame");
    decode_binary_frame(frame)
}

// =============================================================================
// Request Framing Tests
// =============================================================================

#[test]
fn test_encode_list_layout() {
    let encoded = encode_binary_request(&Command::List).unwrap();
    assert_eq!(encoded, frame_bytes(b"LIST", None));
}

#[test]
fn test_encode_upload_layout() {
    let cmd = Command::Upload {
        filename: "report.txt".to_string(),
        payload: Payload::Raw(b"hello".to_vec()),
    };
    let encoded = encode_binary_request(&cmd).unwrap();
    assert_eq!(encoded, frame_bytes(b"UPLOAD report.txt", Some(b"hello")));
}

#[test]
fn test_encode_upload_from_base64_payload_sends_raw_bytes() {
    let cmd = Command::Upload {
        filename: "a.bin".to_string(),
        payload: Payload::Base64("AAEC".to_string()),
    };
    let encoded = encode_binary_request(&cmd).unwrap();
    assert_eq!(encoded, frame_bytes(b"UPLOAD a.bin", Some(&[0, 1, 2])));
}

#[test]
fn test_read_get_frame() {
    let cmd = read_command(frame_bytes(b"GET report.txt", None)).unwrap();
    assert_eq!(
        cmd,
        Command::Get {
            filename: "report.txt".to_string()
        }
    );
}

#[test]
fn test_read_upload_frame_keeps_payload_bytes() {
    let payload: Vec<u8> = (0..=255u8).collect();
    let cmd = read_command(frame_bytes(b"upload data.bin", Some(&payload))).unwrap();

    match cmd {
        Command::Upload { filename, payload: Payload::Raw(bytes) } => {
            assert_eq!(filename, "data.bin");
            assert_eq!(bytes, payload);
        }
        other => panic!("Expected UPLOAD command, got {:?}", other),
    }
}

#[test]
fn test_read_upload_with_empty_payload() {
    let cmd = read_command(frame_bytes(b"UPLOAD empty.txt", Some(b""))).unwrap();
    assert_eq!(
        cmd,
        Command::Upload {
            filename: "empty.txt".to_string(),
            payload: Payload::Raw(Vec::new()),
        }
    );
}

#[test]
fn test_written_request_reads_back() {
    let cmd = Command::Delete {
        filename: "old.log".to_string(),
    };
    let mut buf = Vec::new();
    write_binary_request(&mut buf, &cmd).unwrap();

    assert_eq!(read_command(buf).unwrap(), cmd);
}

#[test]
fn test_read_frame_on_empty_stream_is_none() {
    let frame = read_binary_frame(&mut Cursor::new(Vec::new()), MAX_PAYLOAD).unwrap();
    assert!(frame.is_none());
}

#[test]
fn test_read_frame_truncated_prefix() {
    let result = read_binary_frame(&mut Cursor::new(vec![0u8, 0]), MAX_PAYLOAD);
    match result {
        Err(e) => assert!(e.is_disconnect()),
        Ok(frame) => panic!("Expected disconnect, got {:?}", frame),
    }
}

#[test]
fn test_read_frame_truncated_command() {
    let mut bytes = frame_bytes(b"GET report.txt", None);
    bytes.truncate(8);
    let result = read_binary_frame(&mut Cursor::new(bytes), MAX_PAYLOAD);
    assert!(matches!(result, Err(ref e) if e.is_disconnect()));
}

#[test]
fn test_read_frame_upload_without_payload_block() {
    let bytes = frame_bytes(b"UPLOAD a.txt", None);
    let result = read_binary_frame(&mut Cursor::new(bytes), MAX_PAYLOAD);
    assert!(matches!(result, Err(ref e) if e.is_disconnect()));
}

#[test]
fn test_read_frame_truncated_payload() {
    let mut bytes = frame_bytes(b"UPLOAD a.txt", Some(&[7u8; 100]));
    bytes.truncate(bytes.len() - 10);
    let result = read_binary_frame(&mut Cursor::new(bytes), MAX_PAYLOAD);
    assert!(matches!(result, Err(ref e) if e.is_disconnect()));
}

#[test]
fn test_oversized_command_is_rejected() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&((MAX_COMMAND_SIZE + 1) as u32).to_be_bytes());
    let result = read_binary_frame(&mut Cursor::new(bytes), MAX_PAYLOAD);
    assert!(matches!(result, Err(FileportError::Protocol(_))));
}

#[test]
fn test_oversized_payload_is_rejected_before_reading_it() {
    let mut bytes = frame_bytes(b"UPLOAD big.bin", None);
    bytes.extend_from_slice(&((MAX_PAYLOAD + 1) as u32).to_be_bytes());
    let result = read_binary_frame(&mut Cursor::new(bytes), MAX_PAYLOAD);
    assert!(matches!(result, Err(FileportError::Protocol(_))));
}

#[test]
fn test_non_utf8_command_is_invalid_arguments() {
    let frame = BinaryFrame {
        command: vec![0xff, 0xfe, b' ', b'a'],
        payload: None,
    };
    assert!(matches!(
        decode_binary_frame(frame),
        Err(FileportError::InvalidArguments(_))
    ));
}

#[test]
fn test_decode_errors_for_bad_commands() {
    assert!(matches!(
        read_command(frame_bytes(b"FETCH a.txt", None)),
        Err(FileportError::UnknownVerb(_))
    ));
    assert!(matches!(
        read_command(frame_bytes(b"GET", None)),
        Err(FileportError::InvalidArguments(_))
    ));
    assert!(matches!(
        read_command(frame_bytes(b"", None)),
        Err(FileportError::InvalidArguments(_))
    ));
}

#[test]
fn test_filename_with_space_is_not_truncated() {
    match read_command(frame_bytes(b"UPLOAD with space.bin", Some(b"hello"))) {
        Err(FileportError::InvalidArguments(detail)) => {
            assert_eq!(detail, "UPLOAD takes a single filename")
        }
        other => panic!("Expected InvalidArguments, got {:?}", other),
    }
    assert!(matches!(
        read_command(frame_bytes(b"GET report.txt extra", None)),
        Err(FileportError::InvalidArguments(_))
    ));
    assert!(matches!(
        read_command(frame_bytes(b"DELETE with space.bin", None)),
        Err(FileportError::InvalidArguments(_))
    ));
}

// =============================================================================
// Response Encoding/Decoding Tests
// =============================================================================

#[test]
fn test_encode_response_appends_terminator() {
    let encoded = encode_response(&Response::ok("File a.txt uploaded successfully")).unwrap();
    assert!(encoded.ends_with(RESPONSE_TERMINATOR));
    assert_eq!(
        &encoded[..encoded.len() - RESPONSE_TERMINATOR.len()],
        br#"{"status":"OK","data":"File a.txt uploaded successfully"}"#
    );
}

#[test]
fn test_decode_response_with_and_without_terminator() {
    let with =
        decode_response(b"{\"status\":\"ERROR\",\"data\":\"Unknown command\"}\r\n\r\n").unwrap();
    let without = decode_response(br#"{"status":"ERROR","data":"Unknown command"}"#).unwrap();

    assert_eq!(with, without);
    assert_eq!(with.status, Status::Error);
    assert_eq!(with.message(), Some("Unknown command"));
}

#[test]
fn test_write_then_read_file_response() {
    let response = Response::file("report.txt", b"hello");
    let mut buf = Vec::new();
    write_response(&mut buf, &response).unwrap();

    let decoded = read_response(&mut Cursor::new(buf)).unwrap();
    let (name, content) = decoded.file_content().unwrap().unwrap();
    assert_eq!(name, "report.txt");
    assert_eq!(content, b"hello");
}

#[test]
fn test_read_response_without_terminator_uses_eof() {
    let bytes = br#"{"status":"OK","data":[]}"#.to_vec();
    let decoded = read_response(&mut Cursor::new(bytes)).unwrap();
    assert_eq!(decoded.names(), Some(&[][..]));
}

#[test]
fn test_read_response_on_empty_stream_fails() {
    let result = read_response(&mut Cursor::new(Vec::new()));
    assert!(matches!(result, Err(ref e) if e.is_disconnect()));
}
