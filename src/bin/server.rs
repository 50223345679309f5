//! fileport Server Binary
//!
//! Starts the TCP server. With the hidden `worker` subcommand it instead
//! runs as a process-pool worker fed by its parent over stdin.

use clap::{Args as ClapArgs, Parser, Subcommand};
use fileport::network::Server;
use fileport::{Config, Framing, PoolKind};
use tracing_subscriber::{fmt, EnvFilter};

/// fileport Server
#[derive(Parser, Debug)]
#[command(name = "fileport-server")]
#[command(about = "TCP file-transfer server")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    mode: Option<Mode>,

    /// Directory holding the served files
    #[arg(short, long, default_value = "./files")]
    root_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "0.0.0.0:8889")]
    listen: String,

    /// Wire framing: binary or text
    #[arg(short, long, default_value = "binary")]
    framing: Framing,

    /// Worker pool kind: threads or processes
    #[arg(short, long, default_value = "threads")]
    pool: PoolKind,

    /// Number of workers
    #[arg(short, long, default_value = "5")]
    workers: usize,

    #[command(flatten)]
    session: SessionArgs,

    /// Time in-flight sessions get to finish on shutdown (milliseconds)
    #[arg(long, default_value = "5000")]
    shutdown_grace_ms: u64,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Serve connections handed over by a parent server process
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        root_dir: String,

        #[arg(long, default_value = "binary")]
        framing: Framing,

        #[command(flatten)]
        session: SessionArgs,
    },
}

/// Settings shared by the server and its workers
#[derive(ClapArgs, Debug)]
struct SessionArgs {
    /// Largest accepted upload in bytes
    #[arg(long, default_value = "268435456")]
    max_payload: usize,

    /// How long to wait for more of an unterminated text command (milliseconds)
    #[arg(long, default_value = "500")]
    text_settle_ms: u64,

    /// Connection read timeout (milliseconds, 0 = none)
    #[arg(long, default_value = "30000")]
    read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    #[arg(long, default_value = "30000")]
    write_timeout_ms: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fileport=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let mut args = Args::parse();

    let code = match args.mode.take() {
        Some(Mode::Worker {
            root_dir,
            framing,
            session,
        }) => worker(&root_dir, framing, &session),
        None => serve(&args),
    };
    std::process::exit(code);
}

fn serve(args: &Args) -> i32 {
    tracing::info!("fileport Server v{}", fileport::VERSION);
    tracing::info!("Root directory: {}", args.root_dir);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let config = Config::builder()
        .root_dir(&args.root_dir)
        .listen_addr(&args.listen)
        .framing(args.framing)
        .pool_kind(args.pool)
        .pool_size(args.workers)
        .max_payload_size(args.session.max_payload)
        .text_settle_ms(args.session.text_settle_ms)
        .read_timeout_ms(args.session.read_timeout_ms)
        .write_timeout_ms(args.session.write_timeout_ms)
        .shutdown_grace_ms(args.shutdown_grace_ms)
        .build();

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            return 1;
        }
    };

    // Set up Ctrl+C handler
    let handle = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, initiating shutdown...");
        handle.shutdown();
    }) {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        return 1;
    }

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        return 1;
    }

    tracing::info!("Server stopped");
    0
}

#[cfg(unix)]
fn worker(root_dir: &str, framing: Framing, session: &SessionArgs) -> i32 {
    // Ctrl+C reaches the whole process group; the parent decides when we stop
    if let Err(e) = ctrlc::set_handler(|| {}) {
        tracing::warn!("Failed to ignore Ctrl+C in worker: {}", e);
    }

    let config = Config::builder()
        .root_dir(root_dir)
        .framing(framing)
        .max_payload_size(session.max_payload)
        .text_settle_ms(session.text_settle_ms)
        .read_timeout_ms(session.read_timeout_ms)
        .write_timeout_ms(session.write_timeout_ms)
        .build();

    match fileport::pool::run_worker(&config) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("Worker failed: {}", e);
            1
        }
    }
}

#[cfg(not(unix))]
fn worker(_root_dir: &str, _framing: Framing, _session: &SessionArgs) -> i32 {
    tracing::error!("Process workers are only supported on unix");
    1
}
