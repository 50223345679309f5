//! Tests for FileStore
//!
//! These tests verify:
//! - Root creation and listing
//! - Read/write/delete semantics
//! - Name validation at the store boundary
//! - Atomic replacement and concurrent writers

use std::fs;
use std::sync::Arc;
use std::thread;

use fileport::error::FileportError;
use fileport::store::FileStore;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, FileStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileStore::open(temp_dir.path()).unwrap();
    (temp_dir, store)
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_open_creates_root() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("nested").join("files");

    let store = FileStore::open(&root).unwrap();

    assert!(root.is_dir());
    assert_eq!(store.root(), root.as_path());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_open_rejects_regular_file_as_root() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("not_a_dir");
    fs::write(&path, b"x").unwrap();

    assert!(FileStore::open(&path).is_err());
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_write_then_read() {
    let (_dir, store) = setup_temp_store();

    store.write("hello.txt", b"hello").unwrap();

    assert_eq!(store.read("hello.txt").unwrap(), b"hello");
    assert!(store.exists("hello.txt"));
}

#[test]
fn test_write_replaces_existing_content() {
    let (dir, store) = setup_temp_store();

    store.write("a.txt", b"first version, longer").unwrap();
    store.write("a.txt", b"second").unwrap();

    assert_eq!(store.read("a.txt").unwrap(), b"second");
    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"second");
}

#[test]
fn test_empty_file_round_trips() {
    let (_dir, store) = setup_temp_store();

    store.write("empty", b"").unwrap();

    assert_eq!(store.read("empty").unwrap(), Vec::<u8>::new());
    assert_eq!(store.list().unwrap(), vec!["empty".to_string()]);
}

#[test]
fn test_binary_content_is_preserved() {
    let (_dir, store) = setup_temp_store();
    let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

    store.write("blob.bin", &content).unwrap();

    assert_eq!(store.read("blob.bin").unwrap(), content);
}

#[test]
fn test_read_missing_file() {
    let (_dir, store) = setup_temp_store();

    match store.read("missing.txt") {
        Err(FileportError::NotFound(name)) => assert_eq!(name, "missing.txt"),
        other => panic!("Expected NotFound, got {:?}", other),
    }
}

#[test]
fn test_delete_removes_file() {
    let (dir, store) = setup_temp_store();
    store.write("gone.txt", b"bye").unwrap();

    store.delete("gone.txt").unwrap();

    assert!(!dir.path().join("gone.txt").exists());
    assert!(matches!(store.read("gone.txt"), Err(FileportError::NotFound(_))));
}

#[test]
fn test_delete_missing_file() {
    let (_dir, store) = setup_temp_store();

    assert!(matches!(store.delete("nope"), Err(FileportError::NotFound(_))));
}

#[test]
fn test_delete_refuses_directories() {
    let (dir, store) = setup_temp_store();
    fs::create_dir(dir.path().join("subdir")).unwrap();

    assert!(matches!(store.delete("subdir"), Err(FileportError::NotFound(_))));
    assert!(dir.path().join("subdir").is_dir());
}

// =============================================================================
// Listing Tests
// =============================================================================

#[test]
fn test_list_is_sorted_and_skips_directories() {
    let (dir, store) = setup_temp_store();
    store.write("b.txt", b"b").unwrap();
    store.write("a.txt", b"a").unwrap();
    store.write("c.txt", b"c").unwrap();
    fs::create_dir(dir.path().join("folder")).unwrap();

    assert_eq!(store.list().unwrap(), vec!["a.txt", "b.txt", "c.txt"]);
}

#[test]
fn test_list_hides_upload_temp_files() {
    let (dir, store) = setup_temp_store();
    store.write("real.txt", b"data").unwrap();
    fs::write(dir.path().join(".upload-abc123.part"), b"partial").unwrap();

    assert_eq!(store.list().unwrap(), vec!["real.txt"]);
}

#[test]
fn test_list_sees_files_created_outside_the_store() {
    let (dir, store) = setup_temp_store();
    fs::write(dir.path().join("external.txt"), b"dropped in").unwrap();

    assert_eq!(store.list().unwrap(), vec!["external.txt"]);
    assert_eq!(store.read("external.txt").unwrap(), b"dropped in");
}

// =============================================================================
// Name Validation Tests
// =============================================================================

#[test]
fn test_traversal_names_are_rejected() {
    let (dir, store) = setup_temp_store();
    let outside = dir.path().parent().unwrap().join("fileport_outside.txt");

    for name in ["../fileport_outside.txt", "..", ".", "sub/file.txt", "/etc/passwd", ""] {
        assert!(
            matches!(store.write(name, b"x"), Err(FileportError::InvalidName(_))),
            "write accepted {:?}",
            name
        );
        assert!(
            matches!(store.read(name), Err(FileportError::InvalidName(_))),
            "read accepted {:?}",
            name
        );
        assert!(
            matches!(store.delete(name), Err(FileportError::InvalidName(_))),
            "delete accepted {:?}",
            name
        );
    }

    assert!(!outside.exists());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_names_with_whitespace_are_rejected() {
    let (dir, store) = setup_temp_store();

    for name in ["with space.bin", "tab\tname", " leading.txt"] {
        assert!(
            matches!(store.write(name, b"x"), Err(FileportError::InvalidName(_))),
            "write accepted {:?}",
            name
        );
    }

    assert!(!dir.path().join("with space.bin").exists());
    assert!(store.list().unwrap().is_empty());
}

#[cfg(unix)]
#[test]
fn test_symlink_escaping_root_is_not_found() {
    let (dir, store) = setup_temp_store();
    let outside = TempDir::new().unwrap();
    let secret = outside.path().join("secret.txt");
    fs::write(&secret, b"top secret").unwrap();
    std::os::unix::fs::symlink(&secret, dir.path().join("link.txt")).unwrap();

    assert!(matches!(store.read("link.txt"), Err(FileportError::NotFound(_))));
}

#[cfg(unix)]
#[test]
fn test_symlink_inside_root_is_followed() {
    let (dir, store) = setup_temp_store();
    store.write("target.txt", b"inside").unwrap();
    std::os::unix::fs::symlink(dir.path().join("target.txt"), dir.path().join("alias.txt"))
        .unwrap();

    assert_eq!(store.read("alias.txt").unwrap(), b"inside");
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_different_names() {
    let (_dir, store) = setup_temp_store();
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let name = format!("file_{}.txt", i);
                store.write(&name, format!("content {}", i).as_bytes()).unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let names = store.list().unwrap();
    assert_eq!(names.len(), 8);
    for i in 0..8 {
        let content = store.read(&format!("file_{}.txt", i)).unwrap();
        assert_eq!(content, format!("content {}", i).as_bytes());
    }
}

#[test]
fn test_concurrent_writers_same_name_never_interleave() {
    let (_dir, store) = setup_temp_store();
    let store = Arc::new(store);
    let versions: Vec<Vec<u8>> = (0..6u8).map(|i| vec![b'a' + i; 64 * 1024]).collect();

    let handles: Vec<_> = versions
        .iter()
        .cloned()
        .map(|content| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..5 {
                    store.write("shared.bin", &content).unwrap();
                }
            })
        })
        .collect();

    // Readers only ever observe one complete version
    for _ in 0..50 {
        if let Ok(content) = store.read("shared.bin") {
            assert!(versions.contains(&content));
        }
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let final_content = store.read("shared.bin").unwrap();
    assert!(versions.contains(&final_content));
    assert_eq!(store.list().unwrap(), vec!["shared.bin"]);
}
