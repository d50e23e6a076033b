//! # Plotter Control Unit
//!
//! Drives the X and Y stepper axes from targets received over a byte link.
//!
//! Two loops run for the lifetime of the process:
//! - the pulse thread (optionally RT-pinned) emitting step/direction pulses
//!   at a fixed cadence;
//! - the coordinator on the main thread, announcing readiness whenever all
//!   axes are at rest and installing the next `(x,y)` target it receives.
//!
//! Ctrl-C clears the shared running flag; both loops wind down and the
//! process reports its statistics.

use std::error::Error;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use clap::Parser;
use plotter_common::config::{LogLevel, PlotterConfig, TimingConfig};
use plotter_common::hal::driver::{OutputDiagnostics, StepperOutputs};
use plotter_control_unit::config::{LinkOverrides, finalize_config, load_config};
use plotter_control_unit::coordinator::TargetCoordinator;
use plotter_control_unit::cycle::{PulseStats, rt_setup};
use plotter_control_unit::driver_registry::DriverRegistry;
use plotter_control_unit::link;
use plotter_control_unit::pulse::PulseGenerator;
use plotter_control_unit::state::axis::MotionTable;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn Error + Send + Sync>;

/// Plotter Control Unit: step pulse generator and target coordinator
#[derive(Parser, Debug)]
#[command(name = "plotter_control_unit")]
#[command(version)]
#[command(about = "Dual-axis step/direction pulse generator with serial target handoff")]
struct Args {
    /// Path to the TOML configuration (built-in defaults when omitted).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output backend driving the step/direction lines.
    #[arg(long, default_value = "simulation")]
    driver: String,

    /// Serial device carrying the target protocol.
    #[arg(long, value_name = "DEVICE")]
    port: Option<PathBuf>,

    /// Serial baud rate.
    #[arg(long)]
    baud: Option<u32>,

    /// Use stdin/stdout as the link.
    #[arg(long, conflicts_with_all = ["port", "tcp", "tcp_listen"])]
    stdio: bool,

    /// Connect to HOST:PORT and use the socket as the link.
    #[arg(long, value_name = "HOST:PORT", conflicts_with_all = ["port", "tcp_listen"])]
    tcp: Option<String>,

    /// Listen on HOST:PORT and use the first accepted connection as the link.
    #[arg(long, value_name = "HOST:PORT", conflicts_with = "port")]
    tcp_listen: Option<String>,

    /// CPU core to pin the pulse thread to (rt feature).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority of the pulse thread (rt feature).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// List available output backends and exit.
    #[arg(long)]
    list_drivers: bool,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    let loaded = load_config(args.config.as_deref());
    let log_level = loaded
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);

    info!("Plotter Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = loaded
        .map_err(BoxError::from)
        .and_then(|config| {
            let overrides = LinkOverrides {
                port: args.port.clone(),
                baud: args.baud,
                stdio: args.stdio,
                tcp: args.tcp.clone(),
                tcp_listen: args.tcp_listen.clone(),
            };
            let config = finalize_config(config, &overrides)?;
            run(&args, config)
        });

    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Plotter Control Unit shutdown complete");
}

fn run(args: &Args, config: PlotterConfig) -> Result<(), BoxError> {
    let registry = DriverRegistry::with_builtin();
    if args.list_drivers {
        for name in registry.list_drivers() {
            println!("{name}");
        }
        return Ok(());
    }

    let outputs = registry.create(&args.driver, &config.axes)?;
    info!(
        "Config OK: service={}, driver={}, pulse={}µs/{}µs, link={:?}",
        config.shared.service_name,
        outputs.name(),
        config.timing.pulse_width_us,
        config.timing.pulse_spacing_us,
        config.link.kind
    );

    let link = link::open(&config.link)?;
    let (table, writer) = MotionTable::create(&config.axes);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let pulse_thread = {
        let running = Arc::clone(&running);
        let table = Arc::clone(&table);
        let timing = config.timing;
        let (cpu_core, rt_priority) = (args.cpu_core, args.rt_priority);
        thread::Builder::new()
            .name("pulse".to_string())
            .spawn(move || {
                let result = pulse_loop(table, outputs, timing, cpu_core, rt_priority, &running);
                if result.is_err() {
                    running.store(false, Ordering::SeqCst);
                }
                result
            })?
    };

    let mut coordinator = TargetCoordinator::new(writer, link, &config);
    let coordinated = coordinator
        .prime(&running)
        .and_then(|()| coordinator.run(&running));

    running.store(false, Ordering::SeqCst);
    let pulsed = pulse_thread
        .join()
        .map_err(|_| BoxError::from("pulse thread panicked"))?;

    let stats = coordinator.stats();
    info!(
        "Coordinator: {} targets installed, {} rejected, {} malformed, {} announcements",
        stats.targets_installed, stats.targets_rejected, stats.protocol_errors, stats.announcements
    );
    for snap in table.snapshot() {
        info!(
            "Axis {}: position={} target={} last_target={}",
            snap.axis, snap.current_position, snap.target_position, snap.last_target_position
        );
    }

    let (pulse_stats, diagnostics) = pulsed?;
    info!(
        "Pulse loop: {} cycles, pulses X={} Y={}, avg={}ns max={}ns, {} overruns",
        pulse_stats.cycle_count,
        pulse_stats.pulses[0],
        pulse_stats.pulses[1],
        pulse_stats.avg_cycle_ns(),
        pulse_stats.max_cycle_ns,
        pulse_stats.overruns
    );
    if let Some(diag) = diagnostics {
        info!("Output diagnostics: pulses={:?} net_steps={:?}", diag.pulses, diag.net_steps);
    }

    match coordinated {
        Ok(exit) => {
            info!("Coordinator exit: {exit:?}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Body of the pulse thread.
fn pulse_loop(
    table: Arc<MotionTable>,
    outputs: Box<dyn StepperOutputs>,
    timing: TimingConfig,
    cpu_core: usize,
    rt_priority: i32,
    running: &AtomicBool,
) -> Result<(PulseStats, Option<OutputDiagnostics>), BoxError> {
    rt_setup(cpu_core, rt_priority)?;
    if cfg!(feature = "rt") {
        info!("RT setup complete (cpu_core={cpu_core}, priority={rt_priority})");
    } else {
        warn!("Built without the rt feature: pulse timing is best effort");
    }

    let mut pulse = PulseGenerator::new(table, outputs, &timing);
    pulse.enable_outputs()?;
    let stats = pulse.run(running);
    pulse.disable_outputs()?;
    Ok((stats, pulse.outputs().diagnostics()))
}

/// Setup tracing subscriber based on CLI arguments.
///
/// Logs go to stderr; stdout may be the link. `RUST_LOG` takes precedence
/// over the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        configured
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}
