//! TCP Server
//!
//! Accepts connections and dispatches them to the worker pool.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crate::config::Config;
use crate::error::Result;
use crate::pool::{build_pool, WorkerPool};
use crate::store::FileStore;

/// Signals a running server to stop accepting and drain
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// TCP server for fileport
///
/// The accept loop never touches the filesystem; it only waits for pool
/// capacity and hands sockets over. While the pool is full, new
/// connections wait in the OS backlog.
pub struct Server {
    config: Config,
    listener: TcpListener,
    pool: Box<dyn WorkerPool>,
    shutdown: ShutdownHandle,
    accepted: AtomicU64,
}

impl Server {
    /// Open the store, bind the listener and start the pool
    pub fn bind(config: Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(FileStore::open(&config.root_dir)?);
        let listener = TcpListener::bind(&config.listen_addr)?;

        // Non-blocking accept so the loop can notice shutdown
        listener.set_nonblocking(true)?;

        let pool = build_pool(&config, store)?;

        tracing::info!(
            "Listening on {} ({} framing, {} x {})",
            listener.local_addr()?,
            config.framing.as_str(),
            pool.size(),
            pool.kind().as_str()
        );

        Ok(Self {
            config,
            listener,
            pool,
            shutdown: ShutdownHandle {
                flag: Arc::new(AtomicBool::new(false)),
            },
            accepted: AtomicU64::new(0),
        })
    }

    /// Start the server (blocking)
    ///
    /// Returns after shutdown was signalled and in-flight sessions finished
    /// or were cut off at the grace deadline. The listening socket is
    /// released when this returns.
    pub fn run(self) -> Result<()> {
        let poll = self.config.accept_poll();

        while !self.shutdown.is_shutdown() {
            // Leave excess connections in the kernel backlog
            if !self.pool.has_capacity() {
                thread::sleep(poll);
                continue;
            }

            match self.listener.accept() {
                Ok((stream, peer)) => {
                    // Accepted sockets may inherit non-blocking mode on some platforms
                    if let Err(e) = stream.set_nonblocking(false) {
                        tracing::warn!("Dropping connection from {}: {}", peer, e);
                        continue;
                    }

                    self.accepted.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Accepted connection from {}", peer);

                    if let Err(e) = self.pool.submit(stream, peer) {
                        tracing::warn!("Dropping connection from {}: {}", peer, e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(poll),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    // e.g. out of file descriptors; other sessions are unaffected
                    tracing::warn!("Accept error: {}", e);
                    thread::sleep(poll);
                }
            }
        }

        tracing::info!(
            "Shutting down: {} connections accepted, {} in flight",
            self.accepted.load(Ordering::Relaxed),
            self.pool.in_flight()
        );
        self.pool.shutdown(self.config.shutdown_grace());

        Ok(())
    }

    /// Get a handle that can stop this server from another thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Get the bound address (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
