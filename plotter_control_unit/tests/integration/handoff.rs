//! Integration test: threaded handoff between a host, the coordinator and a
//! free-running pulse loop.
//!
//! Validates: every READY arrives with all axes at rest → targets are
//! reached in order → closing the link ends the coordinator → clearing the
//! running flag ends the pulse loop.

use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use plotter_common::config::PlotterConfig;
use plotter_common::consts::READY_MARKER;
use plotter_control_unit::codec::encode_target;
use plotter_control_unit::coordinator::{CoordinatorExit, TargetCoordinator};
use plotter_control_unit::drivers::SimulationOutputs;
use plotter_control_unit::link::ByteLink;
use plotter_control_unit::pulse::PulseGenerator;
use plotter_control_unit::state::axis::MotionTable;

/// One end of a byte pipe built from two channels.
struct ChannelLink {
    rx: Receiver<u8>,
    tx: Sender<u8>,
}

fn channel_pair() -> (ChannelLink, ChannelLink) {
    let (a_tx, a_rx) = mpsc::channel();
    let (b_tx, b_rx) = mpsc::channel();
    (
        ChannelLink { rx: a_rx, tx: b_tx },
        ChannelLink { rx: b_rx, tx: a_tx },
    )
}

impl ByteLink for ChannelLink {
    fn poll_byte(&mut self) -> io::Result<Option<u8>> {
        match self.rx.recv_timeout(Duration::from_millis(1)) {
            Ok(byte) => Ok(Some(byte)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(io::Error::new(ErrorKind::UnexpectedEof, "peer gone"))
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &b in bytes {
            self.tx
                .send(b)
                .map_err(|_| io::Error::new(ErrorKind::BrokenPipe, "peer gone"))?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn read_line(link: &mut ChannelLink) -> String {
    let mut line = Vec::new();
    loop {
        match link.poll_byte().unwrap() {
            Some(b'\n') => return String::from_utf8(line).unwrap(),
            Some(b) => line.push(b),
            None => {}
        }
    }
}

#[test]
fn host_drives_a_path_through_the_running_loops() {
    let mut config = PlotterConfig::default();
    config.timing.pulse_width_us = 1;
    config.timing.pulse_spacing_us = 2;
    config.timing.warmup_ms = 10;
    config.axes.x.ticks_per_unit = 10.0;
    config.axes.y.ticks_per_unit = 10.0;
    config.axes.y.polarity_inverted = true;

    let (table, writer) = MotionTable::create(&config.axes);
    let outputs = SimulationOutputs::new(&config.axes);
    let probe = outputs.clone();
    let running = Arc::new(AtomicBool::new(true));

    let pulse_thread = {
        let table = Arc::clone(&table);
        let running = Arc::clone(&running);
        let timing = config.timing;
        thread::spawn(move || {
            let mut pulse = PulseGenerator::new(table, outputs, &timing);
            pulse.enable_outputs().unwrap();
            pulse.run(&running)
        })
    };

    let (device_end, mut host_end) = channel_pair();
    let coordinator_thread = {
        let running = Arc::clone(&running);
        let config = config.clone();
        thread::spawn(move || {
            let mut coordinator = TargetCoordinator::new(writer, device_end, &config);
            coordinator.prime(&running).unwrap();
            let exit = coordinator.run(&running).unwrap();
            (exit, *coordinator.stats())
        })
    };

    let path = [(1.0, 2.0), (-0.5, 0.3), (4.0, -4.0), (0.0, 0.0)];
    for &(x, y) in &path {
        let line = read_line(&mut host_end);
        assert!(line.contains(READY_MARKER), "unexpected line {line:?}");
        assert!(table.all_at_target());
        host_end.write_all(encode_target(x, y).as_bytes()).unwrap();
    }

    // Final READY confirms the last target was reached.
    let line = read_line(&mut host_end);
    assert!(line.contains(READY_MARKER));
    assert_eq!(table.positions(), [0, 0]);
    let last = table.snapshot();
    assert_eq!(last[0].last_target_position, 40);
    assert_eq!(last[1].last_target_position, -40);

    drop(host_end);
    let (exit, stats) = coordinator_thread.join().unwrap();
    assert_eq!(exit, CoordinatorExit::LinkClosed);
    assert_eq!(stats.targets_installed, 4);
    assert_eq!(stats.announcements, 5);

    running.store(false, Ordering::SeqCst);
    let pulse_stats = pulse_thread.join().unwrap();

    // 10 + 20, 15 + 17, 45 + 43, 40 + 40 steps.
    assert_eq!(pulse_stats.pulses, [110, 120]);
    assert_eq!(probe.net_steps(), [0, 0]);
    assert_eq!(probe.axis(plotter_common::axis::Axis::Y).rising_edges, 120);
}
