//! Thread Pool
//!
//! Fixed set of worker threads pulling accepted connections from a bounded
//! channel. All workers share one `Dispatcher` (and so one `FileStore`).

use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::config::{Config, PoolKind};
use crate::dispatcher::Dispatcher;
use crate::error::{FileportError, Result};
use crate::network::{Connection, SessionOptions};
use crate::store::FileStore;

use super::{InFlight, InFlightGuard, WorkerPool};

/// An accepted connection waiting for a worker
struct Job {
    session_id: u64,
    stream: TcpStream,
    peer: SocketAddr,
}

/// State shared between the pool handle and its workers
struct Shared {
    dispatcher: Dispatcher,
    options: SessionOptions,
    in_flight: InFlight,

    /// Sockets of running sessions, kept so shutdown can force them closed
    sessions: Mutex<HashMap<u64, TcpStream>>,

    /// Set once the grace period is over; queued jobs are dropped unserved
    cancelled: AtomicBool,
}

/// Pool of reusable session threads
pub struct ThreadPool {
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_session: AtomicU64,
    size: usize,
}

impl ThreadPool {
    /// Spawn `config.pool_size` workers over the given store
    pub fn new(config: &Config, store: Arc<FileStore>) -> Result<Self> {
        let size = config.pool_size;
        let (sender, receiver) = channel::bounded::<Job>(size);

        let shared = Arc::new(Shared {
            dispatcher: Dispatcher::new(store),
            options: SessionOptions::from_config(config),
            in_flight: InFlight::new(size),
            sessions: Mutex::new(HashMap::new()),
            cancelled: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let shared = Arc::clone(&shared);
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("fileport-worker-{}", index))
                .spawn(move || worker_loop(shared, receiver))
                .map_err(|e| FileportError::Worker(format!("failed to spawn worker: {}", e)))?;
            workers.push(handle);
        }

        tracing::info!("Thread pool started with {} workers", size);

        Ok(Self {
            shared,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            next_session: AtomicU64::new(1),
            size,
        })
    }

    /// Shut down every running session's socket
    fn cancel_sessions(&self) {
        let sessions = self.shared.sessions.lock();
        self.shared.cancelled.store(true, Ordering::SeqCst);

        for (id, stream) in sessions.iter() {
            tracing::debug!("Force-closing session {}", id);
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl WorkerPool for ThreadPool {
    fn submit(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let sender = self.sender.lock();
        let sender = sender
            .as_ref()
            .ok_or_else(|| FileportError::Worker("pool is shut down".to_string()))?;

        let session_id = self.next_session.fetch_add(1, Ordering::Relaxed);
        self.shared.in_flight.acquire();

        let job = Job {
            session_id,
            stream,
            peer,
        };
        if sender.try_send(job).is_err() {
            self.shared.in_flight.release();
            return Err(FileportError::Worker(format!(
                "no worker available for {}",
                peer
            )));
        }

        tracing::trace!("Queued session {} from {}", session_id, peer);
        Ok(())
    }

    fn has_capacity(&self) -> bool {
        self.shared.in_flight.has_capacity()
    }

    fn in_flight(&self) -> usize {
        self.shared.in_flight.get()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn kind(&self) -> PoolKind {
        PoolKind::Threads
    }

    fn shutdown(&self, grace: Duration) {
        // Closing the channel lets workers exit once the queue drains
        if self.sender.lock().take().is_none() {
            return;
        }

        let deadline = Instant::now() + grace;
        if !self.shared.in_flight.wait_idle_until(deadline) {
            tracing::warn!(
                "{} sessions still running after {:?}; closing them",
                self.shared.in_flight.get(),
                grace
            );
            self.cancel_sessions();
        }

        for handle in self.workers.lock().drain(..) {
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked during shutdown");
            }
        }

        tracing::info!("Thread pool stopped");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown(Duration::ZERO);
    }
}

fn worker_loop(shared: Arc<Shared>, receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        let _slot = InFlightGuard::new(&shared.in_flight);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_session(&shared, job)));
        if outcome.is_err() {
            tracing::error!("Session panicked; worker continues");
        }
    }
}

fn run_session(shared: &Shared, job: Job) {
    let Job {
        session_id,
        stream,
        peer,
    } = job;

    // Register under the lock so a concurrent cancel either sees this
    // session or we see the cancel
    let _entry = {
        let mut sessions = shared.sessions.lock();
        if shared.cancelled.load(Ordering::SeqCst) {
            tracing::debug!("Dropping queued session {} from {}", session_id, peer);
            return;
        }
        match stream.try_clone() {
            Ok(handle) => {
                sessions.insert(session_id, handle);
            }
            Err(e) => {
                tracing::warn!("Cannot track session {} from {}: {}", session_id, peer, e);
                return;
            }
        }
        SessionEntry::new(&shared.sessions, session_id)
    };

    let result = Connection::new(stream, shared.dispatcher.clone(), shared.options.clone())
        .and_then(Connection::handle);

    match result {
        Ok(outcome) => tracing::debug!("Session {} from {} ended: {:?}", session_id, peer, outcome),
        Err(e) => tracing::warn!("Session {} from {} failed: {}", session_id, peer, e),
    }
}

/// A registered session socket, dropped from the registry on scope exit (unwinding included)
struct SessionEntry<'a> {
    sessions: &'a Mutex<HashMap<u64, TcpStream>>,
    id: u64,
}

impl<'a> SessionEntry<'a> {
    fn new(sessions: &'a Mutex<HashMap<u64, TcpStream>>, id: u64) -> Self {
        Self { sessions, id }
    }
}

impl Drop for SessionEntry<'_> {
    fn drop(&mut self) {
        self.sessions.lock().remove(&self.id);
    }
}
