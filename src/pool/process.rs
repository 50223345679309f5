//! Process Pool
//!
//! Fixed set of worker processes. Each one is this program re-executed with
//! the hidden `worker` subcommand, its stdin being one end of a Unix-domain
//! socket pair over which accepted connections are passed.
//!
//! ## Bookkeeping
//! - `idle` queue holds indices of workers ready for a connection
//! - one supervisor thread per worker reads its reports, puts it back on the
//!   idle queue, and respawns it if the process dies
//! - no store state is shared: every worker opens the root directory itself

use std::ffi::OsString;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
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

use super::handoff::{
    read_message, recv_connection, send_connection, write_message, Handoff, Report,
};
use super::{InFlight, WorkerPool};

/// Delay between attempts to respawn a worker that keeps failing to start
const RESPAWN_BACKOFF: Duration = Duration::from_millis(500);

/// How long exiting workers get to be reaped after the grace period
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// A running worker process
struct WorkerProcess {
    child: Child,
    channel: UnixStream,
    busy: Option<u64>,
}

#[derive(Default)]
struct SlotState {
    process: Option<WorkerProcess>,

    /// True while this slot's index sits in the idle queue
    queued: bool,
}

struct WorkerSlot {
    index: usize,
    state: Mutex<SlotState>,
}

/// State shared between the pool handle and its supervisors
struct Shared {
    spawner: WorkerSpawner,
    slots: Vec<WorkerSlot>,
    idle_tx: Sender<usize>,
    idle_rx: Receiver<usize>,
    in_flight: InFlight,
    shutting_down: AtomicBool,
}

/// Pool of worker processes
pub struct ProcessPool {
    shared: Arc<Shared>,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
    next_session: AtomicU64,
    stopped: AtomicBool,
}

impl ProcessPool {
    /// Spawn `config.pool_size` worker processes
    pub fn new(config: &Config) -> Result<Self> {
        let size = config.pool_size;
        let spawner = WorkerSpawner::from_config(config)?;
        let (idle_tx, idle_rx) = channel::unbounded();

        let shared = Arc::new(Shared {
            spawner,
            slots: (0..size)
                .map(|index| WorkerSlot {
                    index,
                    state: Mutex::new(SlotState::default()),
                })
                .collect(),
            idle_tx,
            idle_rx,
            in_flight: InFlight::new(size),
            shutting_down: AtomicBool::new(false),
        });

        let pool = Self {
            shared: Arc::clone(&shared),
            supervisors: Mutex::new(Vec::with_capacity(size)),
            next_session: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
        };

        for index in 0..size {
            let (process, reports) = shared.spawner.spawn(index)?;
            {
                let mut state = shared.slots[index].state.lock();
                state.process = Some(process);
                state.queued = true;
            }
            let _ = shared.idle_tx.send(index);

            let supervisor_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("fileport-supervisor-{}", index))
                .spawn(move || supervise(supervisor_shared, index, reports))
                .map_err(|e| FileportError::Worker(format!("failed to spawn supervisor: {}", e)))?;
            pool.supervisors.lock().push(handle);
        }

        tracing::info!("Process pool started with {} workers", size);
        Ok(pool)
    }

    /// Try one idle worker; gives the stream back if that worker can't take it
    fn try_worker(
        &self,
        index: usize,
        stream: TcpStream,
        handoff: &Handoff,
    ) -> std::result::Result<(), TcpStream> {
        let slot = &self.shared.slots[index];
        let mut state = slot.state.lock();
        state.queued = false;

        // Mid-respawn; the supervisor requeues it once it is back
        let Some(process) = state.process.as_mut() else {
            return Err(stream);
        };

        match send_connection(&process.channel, &stream, handoff) {
            Ok(()) => {
                process.busy = Some(handoff.session_id);
                tracing::trace!(
                    "Session {} from {} handed to worker {} (pid {})",
                    handoff.session_id,
                    handoff.peer,
                    slot.index,
                    process.child.id()
                );
                Ok(())
            }
            Err(e) => {
                // The supervisor sees the channel die and respawns the worker
                tracing::error!("Handoff to worker {} failed: {}", slot.index, e);
                let _ = process.child.kill();
                Err(stream)
            }
        }
    }
}

impl WorkerPool for ProcessPool {
    fn submit(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return Err(FileportError::Worker("pool is shut down".to_string()));
        }

        let handoff = Handoff {
            session_id: self.next_session.fetch_add(1, Ordering::Relaxed),
            peer: peer.to_string(),
        };

        self.shared.in_flight.acquire();
        let mut stream = stream;
        while let Ok(index) = self.shared.idle_rx.try_recv() {
            match self.try_worker(index, stream, &handoff) {
                // The worker holds its own copy of the socket now
                Ok(()) => return Ok(()),
                Err(returned) => stream = returned,
            }
        }

        self.shared.in_flight.release();
        drop(stream);
        Err(FileportError::Worker(format!("no worker available for {}", peer)))
    }

    fn has_capacity(&self) -> bool {
        self.shared.in_flight.has_capacity()
    }

    fn in_flight(&self) -> usize {
        self.shared.in_flight.get()
    }

    fn size(&self) -> usize {
        self.shared.slots.len()
    }

    fn kind(&self) -> PoolKind {
        PoolKind::Processes
    }

    fn shutdown(&self, grace: Duration) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.shutting_down.store(true, Ordering::SeqCst);

        // Idle workers see EOF and exit; busy ones exit after their session
        for slot in &self.shared.slots {
            if let Some(process) = slot.state.lock().process.as_ref() {
                let _ = process.channel.shutdown(Shutdown::Write);
            }
        }

        let deadline = Instant::now() + grace;
        if !self.shared.in_flight.wait_idle_until(deadline) {
            tracing::warn!(
                "{} sessions still running after {:?}; killing their workers",
                self.shared.in_flight.get(),
                grace
            );
            self.kill_all();
        }

        // Anything not gone by now is stuck
        let reap_deadline = Instant::now() + REAP_TIMEOUT;
        while self.live_workers() > 0 && Instant::now() < reap_deadline {
            thread::sleep(Duration::from_millis(10));
        }
        self.kill_all();

        for handle in self.supervisors.lock().drain(..) {
            if handle.join().is_err() {
                tracing::error!("Supervisor thread panicked during shutdown");
            }
        }

        tracing::info!("Process pool stopped");
    }
}

impl ProcessPool {
    fn kill_all(&self) {
        for slot in &self.shared.slots {
            if let Some(process) = slot.state.lock().process.as_mut() {
                let _ = process.child.kill();
            }
        }
    }

    fn live_workers(&self) -> usize {
        self.shared
            .slots
            .iter()
            .filter(|slot| slot.state.lock().process.is_some())
            .count()
    }
}

impl Drop for ProcessPool {
    fn drop(&mut self) {
        self.shutdown(Duration::ZERO);
    }
}

// =============================================================================
// Supervision
// =============================================================================

fn supervise(shared: Arc<Shared>, index: usize, mut reports: UnixStream) {
    let slot = &shared.slots[index];

    loop {
        match read_message::<Report, _>(&mut reports) {
            Ok(Some(report)) => {
                match &report.result {
                    Ok(outcome) => tracing::debug!(
                        "Worker {} finished session {}: {:?}",
                        index,
                        report.session_id,
                        outcome
                    ),
                    Err(e) => tracing::warn!(
                        "Worker {} session {} failed: {}",
                        index,
                        report.session_id,
                        e
                    ),
                }

                let mut state = slot.state.lock();
                if let Some(process) = state.process.as_mut() {
                    process.busy = None;
                }
                if !shared.shutting_down.load(Ordering::SeqCst) && !state.queued {
                    state.queued = true;
                    let _ = shared.idle_tx.send(index);
                }
                drop(state);
                shared.in_flight.release();
            }
            Ok(None) | Err(_) => {
                // Channel closed: the worker exited or was killed
                let process = slot.state.lock().process.take();
                let was_busy = match process {
                    Some(mut process) => {
                        let status = process.child.wait();
                        if !shared.shutting_down.load(Ordering::SeqCst) {
                            tracing::error!(
                                "Worker {} (pid {}) exited unexpectedly: {:?}",
                                index,
                                process.child.id(),
                                status
                            );
                        }
                        process.busy.is_some()
                    }
                    None => false,
                };
                if was_busy {
                    shared.in_flight.release();
                }

                if shared.shutting_down.load(Ordering::SeqCst) {
                    return;
                }

                match respawn(&shared, index) {
                    Some(channel) => reports = channel,
                    None => return,
                }
            }
        }
    }
}

/// Bring a dead worker back; `None` if the pool started shutting down meanwhile
fn respawn(shared: &Shared, index: usize) -> Option<UnixStream> {
    loop {
        if shared.shutting_down.load(Ordering::SeqCst) {
            return None;
        }

        match shared.spawner.spawn(index) {
            Ok((process, reports)) => {
                let mut state = shared.slots[index].state.lock();
                tracing::info!("Worker {} respawned (pid {})", index, process.child.id());
                state.process = Some(process);
                if !state.queued {
                    state.queued = true;
                    let _ = shared.idle_tx.send(index);
                }
                return Some(reports);
            }
            Err(e) => {
                tracing::error!("Failed to respawn worker {}: {}", index, e);
                thread::sleep(RESPAWN_BACKOFF);
            }
        }
    }
}

// =============================================================================
// Spawning
// =============================================================================

/// Command line for worker processes
struct WorkerSpawner {
    program: PathBuf,
    args: Vec<OsString>,
}

impl WorkerSpawner {
    fn from_config(config: &Config) -> Result<Self> {
        let program = match &config.worker_program {
            Some(program) => program.clone(),
            None => std::env::current_exe()?,
        };
        Ok(Self {
            program,
            args: worker_args(config),
        })
    }

    /// Start a worker; returns it plus the parent's read handle for reports
    fn spawn(&self, index: usize) -> Result<(WorkerProcess, UnixStream)> {
        let (parent_end, child_end) = UnixStream::pair()?;

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::from(OwnedFd::from(child_end)))
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                FileportError::Worker(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        tracing::debug!("Worker {} started (pid {})", index, child.id());

        let reports = parent_end.try_clone()?;
        Ok((
            WorkerProcess {
                child,
                channel: parent_end,
                busy: None,
            },
            reports,
        ))
    }
}

/// Arguments that make the server binary run as a worker with this config
pub fn worker_args(config: &Config) -> Vec<OsString> {
    vec![
        "worker".into(),
        "--root-dir".into(),
        config.root_dir.clone().into_os_string(),
        "--framing".into(),
        config.framing.as_str().into(),
        "--max-payload".into(),
        config.max_payload_size.to_string().into(),
        "--text-settle-ms".into(),
        config.text_settle_ms.to_string().into(),
        "--read-timeout-ms".into(),
        config.read_timeout_ms.to_string().into(),
        "--write-timeout-ms".into(),
        config.write_timeout_ms.to_string().into(),
    ]
}

// =============================================================================
// Worker side
// =============================================================================

/// Body of a worker process: serve connections handed over on stdin until
/// the parent closes the channel
pub fn run_worker(config: &Config) -> Result<()> {
    let channel = UnixStream::from(io::stdin().as_fd().try_clone_to_owned()?);
    let store = Arc::new(FileStore::open(&config.root_dir)?);
    let dispatcher = Dispatcher::new(store);
    let options = SessionOptions::from_config(config);
    let pid = std::process::id();

    tracing::debug!("Worker pid {} ready, root {}", pid, config.root_dir.display());

    let mut reports = channel.try_clone()?;
    while let Some((handoff, stream)) = recv_connection(&channel)? {
        tracing::trace!(
            "Worker pid {} took session {} from {}",
            pid,
            handoff.session_id,
            handoff.peer
        );

        let result = Connection::new(stream, dispatcher.clone(), options.clone())
            .and_then(Connection::handle)
            .map_err(|e| e.to_string());

        write_message(
            &mut reports,
            &Report {
                session_id: handoff.session_id,
                result,
            },
        )?;
    }

    tracing::debug!("Worker pid {} exiting", pid);
    Ok(())
}
