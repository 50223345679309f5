//! Tests for Dispatcher
//!
//! These tests verify:
//! - Each verb against a real store
//! - Exact confirmation and error messages
//! - Decode failures answered as ERROR responses
//! - A full upload → list → get → delete session

use std::fs;
use std::sync::Arc;

use fileport::dispatcher::{Dispatcher, UNKNOWN_COMMAND};
use fileport::protocol::{decode_text_line, Body, Command, Payload, Response, Status};
use fileport::store::FileStore;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dispatcher() -> (TempDir, Dispatcher) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::open(temp_dir.path()).unwrap();
    (temp_dir, Dispatcher::new(Arc::new(store)))
}

fn text(dispatcher: &Dispatcher, line: &str) -> Response {
    dispatcher.handle(decode_text_line(line.as_bytes()))
}

fn assert_error(response: &Response, message: &str) {
    assert_eq!(response.status, Status::Error);
    assert_eq!(response.message(), Some(message));
}

// =============================================================================
// LIST Tests
// =============================================================================

#[test]
fn test_list_empty_store() {
    let (_dir, dispatcher) = setup_temp_dispatcher();

    let response = dispatcher.dispatch(Command::List);

    assert_eq!(response, Response::listing(Vec::new()));
    assert_eq!(response.to_json().unwrap(), r#"{"status":"OK","data":[]}"#);
}

#[test]
fn test_list_returns_sorted_names() {
    let (dir, dispatcher) = setup_temp_dispatcher();
    fs::write(dir.path().join("b.txt"), b"b").unwrap();
    fs::write(dir.path().join("a.txt"), b"a").unwrap();

    let response = dispatcher.dispatch(Command::List);

    assert_eq!(
        response.names().unwrap(),
        &["a.txt".to_string(), "b.txt".to_string()]
    );
}

// =============================================================================
// GET Tests
// =============================================================================

#[test]
fn test_get_returns_base64_content() {
    let (dir, dispatcher) = setup_temp_dispatcher();
    fs::write(dir.path().join("report.txt"), b"hello").unwrap();

    let response = text(&dispatcher, "GET report.txt");

    assert_eq!(
        response.body,
        Body::File {
            data_namafile: "report.txt".to_string(),
            data_file: "aGVsbG8=".to_string(),
        }
    );
    assert_eq!(
        response.to_json().unwrap(),
        r#"{"status":"OK","data_namafile":"report.txt","data_file":"aGVsbG8="}"#
    );
}

#[test]
fn test_get_binary_file_is_base64_too() {
    let (dir, dispatcher) = setup_temp_dispatcher();
    let content = vec![0u8, 159, 146, 150, 255];
    fs::write(dir.path().join("raw.bin"), &content).unwrap();

    let response = dispatcher.dispatch(Command::Get {
        filename: "raw.bin".to_string(),
    });

    let (name, decoded) = response.file_content().unwrap().unwrap();
    assert_eq!(name, "raw.bin");
    assert_eq!(decoded, content);
}

#[test]
fn test_get_missing_file() {
    let (_dir, dispatcher) = setup_temp_dispatcher();

    let response = text(&dispatcher, "GET missing.txt");

    assert_error(&response, "File missing.txt not found");
}

#[test]
fn test_get_traversal_is_rejected() {
    let (_dir, dispatcher) = setup_temp_dispatcher();

    let response = text(&dispatcher, "GET ../etc/passwd");

    assert_eq!(response.status, Status::Error);
    assert!(response.message().unwrap().starts_with("Invalid filename"));
}

// =============================================================================
// UPLOAD Tests
// =============================================================================

#[test]
fn test_upload_text_payload() {
    let (dir, dispatcher) = setup_temp_dispatcher();

    let response = text(&dispatcher, "UPLOAD report.txt aGVsbG8=");

    assert_eq!(response, Response::ok("File report.txt uploaded successfully"));
    assert_eq!(fs::read(dir.path().join("report.txt")).unwrap(), b"hello");
}

#[test]
fn test_upload_unpadded_payload() {
    let (dir, dispatcher) = setup_temp_dispatcher();

    let response = text(&dispatcher, "UPLOAD short.txt aGVsbG8");

    assert!(response.is_ok());
    assert_eq!(fs::read(dir.path().join("short.txt")).unwrap(), b"hello");
}

#[test]
fn test_upload_raw_payload() {
    let (dir, dispatcher) = setup_temp_dispatcher();
    let content: Vec<u8> = (0..=255u8).collect();

    let response = dispatcher.dispatch(Command::Upload {
        filename: "bytes.bin".to_string(),
        payload: Payload::Raw(content.clone()),
    });

    assert!(response.is_ok());
    assert_eq!(fs::read(dir.path().join("bytes.bin")).unwrap(), content);
}

#[test]
fn test_upload_overwrites() {
    let (dir, dispatcher) = setup_temp_dispatcher();
    fs::write(dir.path().join("report.txt"), b"old content").unwrap();

    let response = text(&dispatcher, "UPLOAD report.txt bmV3");

    assert!(response.is_ok());
    assert_eq!(fs::read(dir.path().join("report.txt")).unwrap(), b"new");
}

#[test]
fn test_upload_bad_base64_leaves_file_untouched() {
    let (dir, dispatcher) = setup_temp_dispatcher();
    fs::write(dir.path().join("keep.txt"), b"original").unwrap();

    let response = text(&dispatcher, "UPLOAD keep.txt @@@@");

    assert_eq!(response.status, Status::Error);
    assert!(response.message().unwrap().starts_with("Invalid base64 data"));
    assert_eq!(fs::read(dir.path().join("keep.txt")).unwrap(), b"original");
}

#[test]
fn test_upload_missing_payload() {
    let (_dir, dispatcher) = setup_temp_dispatcher();

    let response = text(&dispatcher, "UPLOAD report.txt");

    assert_error(
        &response,
        "Invalid command format: UPLOAD requires a filename and base64 content",
    );
}

#[test]
fn test_upload_bad_name_is_rejected_before_decoding() {
    let (dir, dispatcher) = setup_temp_dispatcher();

    let response = text(&dispatcher, "UPLOAD ../escape.txt not-base64!");

    assert_eq!(response.status, Status::Error);
    assert!(response.message().unwrap().starts_with("Invalid filename"));
    assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
}

#[test]
fn test_upload_filename_with_space_stores_nothing() {
    let (dir, dispatcher) = setup_temp_dispatcher();

    let response = text(&dispatcher, "UPLOAD with space.bin aGVsbG8=");

    assert_error(
        &response,
        "Invalid command format: UPLOAD takes a filename and a single base64 token",
    );
    assert!(!dir.path().join("with").exists());
    assert!(!dir.path().join("with space.bin").exists());

    let response = dispatcher.dispatch(Command::Upload {
        filename: "with space.bin".to_string(),
        payload: Payload::Raw(b"hello".to_vec()),
    });
    assert_eq!(response.status, Status::Error);
    assert!(response.message().unwrap().starts_with("Invalid filename"));
    assert_eq!(dispatcher.dispatch(Command::List), Response::listing(Vec::new()));
}

// =============================================================================
// DELETE Tests
// =============================================================================

#[test]
fn test_delete_existing_file() {
    let (dir, dispatcher) = setup_temp_dispatcher();
    fs::write(dir.path().join("old.log"), b"x").unwrap();

    let response = text(&dispatcher, "DELETE old.log");

    assert_eq!(response, Response::ok("File old.log deleted successfully"));
    assert!(!dir.path().join("old.log").exists());
}

#[test]
fn test_delete_missing_file() {
    let (_dir, dispatcher) = setup_temp_dispatcher();

    let response = text(&dispatcher, "DELETE ghost.txt");

    assert_error(&response, "File ghost.txt not found");
}

// =============================================================================
// Malformed Command Tests
// =============================================================================

#[test]
fn test_unknown_verb() {
    let (_dir, dispatcher) = setup_temp_dispatcher();

    let response = text(&dispatcher, "FETCH report.txt");

    assert_error(&response, UNKNOWN_COMMAND);
    assert_eq!(
        response.to_json().unwrap(),
        r#"{"status":"ERROR","data":"Unknown command"}"#
    );
}

#[test]
fn test_missing_filename() {
    let (_dir, dispatcher) = setup_temp_dispatcher();

    assert_error(
        &text(&dispatcher, "GET"),
        "Invalid command format: GET requires a filename",
    );
    assert_error(
        &text(&dispatcher, "DELETE"),
        "Invalid command format: DELETE requires a filename",
    );
}

#[test]
fn test_empty_command() {
    let (_dir, dispatcher) = setup_temp_dispatcher();

    assert_error(&text(&dispatcher, ""), "Invalid command format: empty command");
}

// =============================================================================
// Session Tests
// =============================================================================

#[test]
fn test_report_txt_lifecycle() {
    let (_dir, dispatcher) = setup_temp_dispatcher();

    assert_eq!(
        text(&dispatcher, "UPLOAD report.txt aGVsbG8="),
        Response::ok("File report.txt uploaded successfully")
    );

    assert_eq!(
        text(&dispatcher, "LIST"),
        Response::listing(vec!["report.txt".to_string()])
    );

    assert_eq!(
        text(&dispatcher, "GET report.txt"),
        Response::file("report.txt", b"hello")
    );

    assert_eq!(
        text(&dispatcher, "DELETE report.txt"),
        Response::ok("File report.txt deleted successfully")
    );

    assert_eq!(text(&dispatcher, "LIST"), Response::listing(Vec::new()));
    assert_error(&text(&dispatcher, "GET report.txt"), "File report.txt not found");
}
