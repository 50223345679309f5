//! # fileport
//!
//! A small TCP file-transfer service:
//! - One command per connection: LIST, GET, UPLOAD, DELETE
//! - Length-prefixed binary framing, with a line-based text framing for
//!   older clients
//! - Bounded worker pool (threads or processes) in front of a flat
//!   directory of files
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Listener                            │
//! │            (accepts only while the pool has room)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Worker Pool                              │
//! │               (threads or processes)                         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  Connection: framing → Command
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Dispatcher                               │
//! │               (Command → Response)                           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!                       ▼
//!               ┌───────────────┐
//!               │   FileStore   │
//!               │  (root dir)   │
//!               └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod store;
pub mod protocol;
pub mod dispatcher;
pub mod network;
pub mod pool;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FileportError, Result};
pub use config::{Config, Framing, PoolKind};
pub use client::Client;
pub use dispatcher::Dispatcher;
pub use network::Server;
pub use store::FileStore;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of fileport
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
