//! Store Module
//!
//! The directory of files served to clients.
//!
//! ## Layout
//! ```text
//! {root_dir}/
//!   ├── report.txt
//!   ├── image.png
//!   └── .upload-XXXXXX.part   (in-flight upload, hidden from LIST)
//! ```
//!
//! ## Guarantees
//! - Names resolve strictly inside the root (no separators, no `..`)
//! - Writes land via temp file + rename, so readers never see a partial file
//! - UPLOAD/DELETE on the same name are serialized within one process

mod file_store;
mod name;

pub use file_store::FileStore;
pub use name::validate_name;
