//! Worker Pool Module
//!
//! Bounded execution of connection sessions.
//!
//! ## Architecture
//! - The server's accept loop only submits while `has_capacity()` holds, so
//!   at most `size` connections are queued or running in user space; the
//!   rest wait in the OS listen backlog
//! - `ThreadPool`: reusable threads sharing one `FileStore`
//! - `ProcessPool` (unix): child processes, each handed the accepted socket
//!   over a Unix-domain channel and opening the store root on its own
//!
//! ## Shutdown
//! Stop taking work → wait up to the grace period for in-flight sessions →
//! force-close whatever is left.

mod thread;

#[cfg(unix)]
mod handoff;
#[cfg(unix)]
mod process;

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::{Config, PoolKind};
use crate::error::Result;
use crate::store::FileStore;

pub use thread::ThreadPool;

#[cfg(unix)]
pub use handoff::{Handoff, Report};
#[cfg(unix)]
pub use process::{run_worker, worker_args, ProcessPool};

/// A bounded set of workers that run connection sessions
pub trait WorkerPool: Send + Sync {
    /// Hand an accepted connection to a worker
    ///
    /// Callers check `has_capacity()` first; the pool never blocks here.
    fn submit(&self, stream: TcpStream, peer: SocketAddr) -> Result<()>;

    /// Whether another connection can be taken right now
    fn has_capacity(&self) -> bool;

    /// Connections queued or being served
    fn in_flight(&self) -> usize;

    /// Configured worker count
    fn size(&self) -> usize;

    fn kind(&self) -> PoolKind;

    /// Stop taking work, give in-flight sessions up to `grace`, then force them closed
    fn shutdown(&self, grace: Duration);
}

/// Build the pool the config asks for
pub fn build_pool(config: &Config, store: Arc<FileStore>) -> Result<Box<dyn WorkerPool>> {
    config.validate()?;

    match config.pool_kind {
        PoolKind::Threads => Ok(Box::new(ThreadPool::new(config, store)?)),
        #[cfg(unix)]
        PoolKind::Processes => {
            // Workers open the root themselves; the shared handle only
            // guarantees the directory exists before they start
            drop(store);
            Ok(Box::new(ProcessPool::new(config)?))
        }
        #[cfg(not(unix))]
        PoolKind::Processes => Err(crate::error::FileportError::Config(
            "process pool is only supported on unix".to_string(),
        )),
    }
}

// =============================================================================
// In-flight accounting
// =============================================================================

/// Counts connections handed to the pool and not yet finished
pub(crate) struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
    limit: usize,
}

impl InFlight {
    pub fn new(limit: usize) -> Self {
        Self {
            count: Mutex::new(0),
            idle: Condvar::new(),
            limit,
        }
    }

    pub fn has_capacity(&self) -> bool {
        *self.count.lock() < self.limit
    }

    pub fn get(&self) -> usize {
        *self.count.lock()
    }

    pub fn acquire(&self) {
        *self.count.lock() += 1;
    }

    pub fn release(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    /// Wait until nothing is in flight; false if the deadline passed first
    pub fn wait_idle_until(&self, deadline: Instant) -> bool {
        let mut count = self.count.lock();
        while *count > 0 {
            if self.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

/// Releases one in-flight slot when dropped, panics included
pub(crate) struct InFlightGuard<'a>(&'a InFlight);

impl<'a> InFlightGuard<'a> {
    pub fn new(in_flight: &'a InFlight) -> Self {
        Self(in_flight)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}
