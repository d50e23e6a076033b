//! # Plotter Sender
//!
//! Streams a path file to the control unit: waits for each readiness
//! announcement and answers it with the next `(x,y)` target.
//!
//! The link is opened with retries, and after a link error the session is
//! resumed on a freshly opened link.

use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use clap::Parser;
use plotter_common::consts::{DEFAULT_BAUD_RATE, DEFAULT_SERIAL_PATH};
use plotter_control_unit::link::{self, ByteLink, LinkError};
use plotter_sender::path::{decimate, flatten, load_segments, order_segments, scale};
use plotter_sender::session::{SenderSession, SessionOutcome};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Plotter Sender: feed a path to the control unit
#[derive(Parser, Debug)]
#[command(name = "plotter_sender")]
#[command(version)]
#[command(about = "Streams (x,y) targets to the plotter control unit on each READY")]
struct Args {
    /// Path file: `x,y` lines or a JSON array of [x, y] pairs.
    path: PathBuf,

    /// Serial device of the control unit.
    #[arg(long, default_value = DEFAULT_SERIAL_PATH)]
    port: PathBuf,

    /// Serial baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Connect to HOST:PORT instead of a serial device.
    #[arg(long, value_name = "HOST:PORT")]
    tcp: Option<String>,

    /// Divide every coordinate by this value.
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Reorder segments to shorten the travel between them.
    #[arg(long)]
    order_segments: bool,

    /// Send only every Nth point (the last point is always sent).
    #[arg(long, default_value_t = 1)]
    stride: usize,

    /// Pause after opening the link before listening [ms].
    #[arg(long, default_value_t = 2000)]
    settle_ms: u64,

    /// Pause between attempts to open the link [ms].
    #[arg(long, default_value_t = 2000)]
    retry_ms: u64,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("Plotter Sender v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let segments = load_segments(&args.path)?;
    let segment_count = segments.len();
    let mut points = if args.order_segments {
        order_segments(segments)
    } else {
        flatten(segments)
    };
    scale(&mut points, args.scale)?;
    let points = decimate(points, args.stride);
    info!(
        "Loaded {} points in {} segments from {}",
        points.len(),
        segment_count,
        args.path.display()
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut session = SenderSession::new(points);
    while running.load(Ordering::Relaxed) {
        let Some(mut link) = open_with_retry(args, &running) else {
            break;
        };
        thread::sleep(Duration::from_millis(args.settle_ms));

        match session.run(&mut link, &running) {
            Ok(SessionOutcome::Completed) => {
                info!("Path complete: {} points sent", session.sent());
                return Ok(());
            }
            Ok(SessionOutcome::Cancelled) => break,
            Ok(SessionOutcome::Closed) => {
                warn!("Link closed with {} points left, reconnecting", session.remaining());
            }
            Err(e) => {
                warn!("Link error: {e}. Reinitializing...");
            }
        }
    }

    info!("Stopped with {} of {} points sent", session.sent(), session.sent() + session.remaining());
    Ok(())
}

fn open_link(args: &Args) -> Result<Box<dyn ByteLink>, LinkError> {
    Ok(match &args.tcp {
        Some(address) => Box::new(link::connect_tcp(address)?),
        None => Box::new(link::open_serial(&args.port, args.baud)?),
    })
}

/// Open the link, retrying until it works or `running` is cleared.
fn open_with_retry(args: &Args, running: &AtomicBool) -> Option<Box<dyn ByteLink>> {
    while running.load(Ordering::Relaxed) {
        match open_link(args) {
            Ok(link) => {
                info!("Link opened");
                return Some(link);
            }
            Err(e) => {
                warn!("Failed to open link: {e}");
                thread::sleep(Duration::from_millis(args.retry_ms));
            }
        }
    }
    None
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
