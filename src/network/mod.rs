//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor loop
//! - Worker pool (threads or processes) for connections
//! - One command per connection, routed through the Dispatcher

mod connection;
mod server;

pub use connection::{Connection, SessionOptions, SessionOutcome, SessionState};
pub use server::{Server, ShutdownHandle};
