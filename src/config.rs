//! Configuration for fileport
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::FileportError;

/// Main configuration for a fileport server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Store Configuration
    // -------------------------------------------------------------------------
    /// Store root: every served file lives directly inside this directory
    pub root_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Wire framing used by every connection of this deployment
    pub framing: Framing,

    /// Largest UPLOAD payload (binary) or command line (text) accepted, in bytes
    pub max_payload_size: usize,

    /// Grace read for text commands that arrive without a line terminator (milliseconds)
    pub text_settle_ms: u64,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    /// How often the accept loop re-checks the shutdown flag (milliseconds)
    pub accept_poll_ms: u64,

    // -------------------------------------------------------------------------
    // Pool Configuration
    // -------------------------------------------------------------------------
    /// Execution strategy for sessions
    pub pool_kind: PoolKind,

    /// Fixed number of workers
    pub pool_size: usize,

    /// Time in-flight sessions get to finish after shutdown starts (milliseconds)
    pub shutdown_grace_ms: u64,

    /// Program re-executed as a process-pool worker (defaults to the current executable)
    pub worker_program: Option<PathBuf>,
}

/// Wire framing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `u32be` length-prefixed command, plus a second raw block for UPLOAD
    Binary,

    /// Newline-terminated command line, UPLOAD payload inline as base64
    Text,
}

/// Worker pool strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Reusable threads sharing one FileStore
    Threads,

    /// Separate OS processes, each opening the store root itself (unix only)
    Processes,
}

impl Framing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framing::Binary => "binary",
            Framing::Text => "text",
        }
    }
}

impl FromStr for Framing {
    type Err = FileportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(Framing::Binary),
            "text" => Ok(Framing::Text),
            other => Err(FileportError::Config(format!("unknown framing: {}", other))),
        }
    }
}

impl PoolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolKind::Threads => "threads",
            PoolKind::Processes => "processes",
        }
    }
}

impl FromStr for PoolKind {
    type Err = FileportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "threads" | "thread" => Ok(PoolKind::Threads),
            "processes" | "process" => Ok(PoolKind::Processes),
            other => Err(FileportError::Config(format!("unknown pool kind: {}", other))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./files"),
            framing: Framing::Binary,
            max_payload_size: 256 * 1024 * 1024, // 256 MB
            text_settle_ms: 500,
            listen_addr: "0.0.0.0:8889".to_string(),
            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
            accept_poll_ms: 50,
            pool_kind: PoolKind::Threads,
            pool_size: 5,
            shutdown_grace_ms: 5000,
            worker_program: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check invariants that the builder cannot express in types
    pub fn validate(&self) -> crate::Result<()> {
        if self.pool_size == 0 {
            return Err(FileportError::Config("pool size must be at least 1".to_string()));
        }
        if self.max_payload_size == 0 || self.max_payload_size > u32::MAX as usize {
            return Err(FileportError::Config(format!(
                "max payload size must be between 1 and {} bytes",
                u32::MAX
            )));
        }
        if cfg!(not(unix)) && self.pool_kind == PoolKind::Processes {
            return Err(FileportError::Config(
                "process pool is only supported on unix".to_string(),
            ));
        }
        Ok(())
    }

    pub fn text_settle(&self) -> Duration {
        Duration::from_millis(self.text_settle_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms.max(1))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the store root directory
    pub fn root_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root_dir = path.into();
        self
    }

    /// Set the wire framing
    pub fn framing(mut self, framing: Framing) -> Self {
        self.config.framing = framing;
        self
    }

    /// Set the maximum payload size (in bytes)
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the text-mode settle window (in milliseconds)
    pub fn text_settle_ms(mut self, ms: u64) -> Self {
        self.config.text_settle_ms = ms;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the accept-loop poll interval (in milliseconds)
    pub fn accept_poll_ms(mut self, ms: u64) -> Self {
        self.config.accept_poll_ms = ms;
        self
    }

    /// Set the pool strategy
    pub fn pool_kind(mut self, kind: PoolKind) -> Self {
        self.config.pool_kind = kind;
        self
    }

    /// Set the number of workers
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the shutdown grace period (in milliseconds)
    pub fn shutdown_grace_ms(mut self, ms: u64) -> Self {
        self.config.shutdown_grace_ms = ms;
        self
    }

    /// Set the program spawned for process-pool workers
    pub fn worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.worker_program = Some(program.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
