//! READY-driven path streaming.
//!
//! The control unit announces readiness with a line containing `READY`
//! whenever its axes are at rest. Each announcement is answered with the next
//! point of the path. Lines without the marker are logged and otherwise
//! ignored. The session remembers its position, so after a link failure a
//! new link can be attached and streaming resumes with the point that was
//! not yet sent.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use plotter_common::consts::READY_MARKER;
use plotter_control_unit::codec::encode_target;
use plotter_control_unit::link::{ByteLink, is_disconnect};
use tracing::{debug, info};

use crate::path::PathPoint;

/// Longest inbound line kept; the rest of a longer line is dropped.
pub const MAX_LINE_LEN: usize = 256;

/// How a call to [`SenderSession::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every point was sent and the final READY arrived.
    Completed,
    /// The running flag was cleared.
    Cancelled,
    /// The peer closed the link before the path was done.
    Closed,
}

/// Streaming state over one path.
pub struct SenderSession {
    points: Vec<PathPoint>,
    next: usize,
    line: Vec<u8>,
    ready_seen: u64,
}

impl SenderSession {
    pub fn new(points: Vec<PathPoint>) -> Self {
        Self {
            points,
            next: 0,
            line: Vec::with_capacity(MAX_LINE_LEN),
            ready_seen: 0,
        }
    }

    /// Points already sent.
    pub fn sent(&self) -> usize {
        self.next
    }

    pub fn remaining(&self) -> usize {
        self.points.len() - self.next
    }

    pub fn ready_seen(&self) -> u64 {
        self.ready_seen
    }

    /// Stream the rest of the path over `link`.
    ///
    /// I/O errors other than end of stream are returned; the session can be
    /// resumed on another link afterwards.
    pub fn run<L: ByteLink + ?Sized>(
        &mut self,
        link: &mut L,
        running: &AtomicBool,
    ) -> io::Result<SessionOutcome> {
        // A partial line from a previous link is meaningless on a new one.
        self.line.clear();

        while running.load(Ordering::Relaxed) {
            let byte = match link.poll_byte() {
                Ok(Some(byte)) => byte,
                Ok(None) => {
                    thread::yield_now();
                    continue;
                }
                Err(e) if is_disconnect(e.kind()) => return Ok(SessionOutcome::Closed),
                Err(e) => return Err(e),
            };

            if byte != b'\n' {
                if self.line.len() < MAX_LINE_LEN {
                    self.line.push(byte);
                }
                continue;
            }

            let line = String::from_utf8_lossy(&self.line).trim().to_string();
            self.line.clear();
            if line.is_empty() {
                continue;
            }
            debug!("Received: {line}");
            if !line.contains(READY_MARKER) {
                continue;
            }

            self.ready_seen += 1;
            let Some(point) = self.points.get(self.next).copied() else {
                info!("All {} positions sent", self.points.len());
                return Ok(SessionOutcome::Completed);
            };
            let message = encode_target(point.x, point.y);
            match link.send(message.as_bytes()) {
                Ok(()) => {}
                Err(e) if is_disconnect(e.kind()) => return Ok(SessionOutcome::Closed),
                Err(e) => return Err(e),
            }
            self.next += 1;
            info!(
                "Sent {} ({}/{})",
                message.trim_end(),
                self.next,
                self.points.len()
            );
        }
        Ok(SessionOutcome::Cancelled)
    }
}
