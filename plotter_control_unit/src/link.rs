//! Byte-stream link between the host and the target coordinator.
//!
//! The coordinator only needs three things from its transport: poll one
//! inbound byte, write bytes, flush. [`ByteLink`] is that seam. Concrete
//! links:
//!
//! | Link | Constructor | End of stream |
//! |------|-------------|---------------|
//! | raw tty (8N1) | [`open_serial`] | never (a zero-length read is a poll timeout) |
//! | stdin/stdout | [`stdio`] | closed |
//! | TCP (connect) | [`connect_tcp`] | closed |
//! | TCP (listen) | [`TcpLinkListener::accept`] | closed |
//! | in-memory | [`MemoryLink`] | configurable |

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::termios::{
    self, BaudRate, ControlFlags, FlushArg, SetArg, SpecialCharacterIndices,
};
use plotter_common::config::{LinkConfig, LinkKind};
use thiserror::Error;
use tracing::{debug, info};

use crate::codec::{ProtocolError, TargetDecoder, TargetPair};

/// Read timeout for socket links; bounds how long a cancel goes unnoticed.
pub const SOCKET_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// `VTIME` of the serial line in deciseconds.
const SERIAL_VTIME: u8 = 1;

const READ_CHUNK: usize = 64;

/// Errors while opening a link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serial setup failed on {path}: {reason}")]
    Setup { path: String, reason: String },

    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),

    #[error("link configuration error: {0}")]
    Config(String),
}

/// Error kinds meaning the peer went away, on either the read or the write
/// side.
pub fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
    )
}

/// Minimal transport used by the coordinator.
pub trait ByteLink: Send {
    /// Next inbound byte, `Ok(None)` when nothing arrived within this poll.
    ///
    /// A closed stream is reported as an error of kind
    /// [`ErrorKind::UnexpectedEof`].
    fn poll_byte(&mut self) -> io::Result<Option<u8>>;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Write and flush in one go.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }
}

impl<T: ByteLink + ?Sized> ByteLink for Box<T> {
    fn poll_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).poll_byte()
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Result of waiting for one target message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecvOutcome {
    Received(TargetPair),
    /// The configured timeout elapsed. Any partial message stays buffered
    /// in the decoder.
    TimedOut,
    /// The running flag was cleared.
    Cancelled,
    /// The peer closed the stream.
    Closed,
}

#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("link I/O error: {0}")]
    Link(#[from] io::Error),
}

/// Wait for the next complete target message.
///
/// `timeout = None` waits until a message arrives, the stream closes or
/// `running` is cleared.
pub fn receive_target<L: ByteLink + ?Sized>(
    link: &mut L,
    decoder: &mut TargetDecoder,
    running: &AtomicBool,
    timeout: Option<Duration>,
) -> Result<RecvOutcome, ReceiveError> {
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        if !running.load(Ordering::Relaxed) {
            return Ok(RecvOutcome::Cancelled);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(RecvOutcome::TimedOut);
        }

        match link.poll_byte() {
            Ok(Some(byte)) => {
                if let Some(result) = decoder.push(byte) {
                    return Ok(RecvOutcome::Received(result?));
                }
            }
            Ok(None) => thread::yield_now(),
            Err(e) if is_disconnect(e.kind()) => return Ok(RecvOutcome::Closed),
            Err(e) => return Err(e.into()),
        }
    }
}

// ─── Stream link ────────────────────────────────────────────────────

/// [`ByteLink`] over any reader/writer pair.
#[derive(Debug)]
pub struct StreamLink<R, W> {
    reader: R,
    writer: W,
    buf: [u8; READ_CHUNK],
    pos: usize,
    len: usize,
    /// Treat a zero-length read as "no data yet" instead of end of stream.
    eof_is_idle: bool,
}

impl<R: Read, W: Write> StreamLink<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buf: [0; READ_CHUNK],
            pos: 0,
            len: 0,
            eof_is_idle: false,
        }
    }

    /// Stream whose reads return 0 on timeout (raw tty with `VMIN = 0`).
    pub fn with_idle_eof(reader: R, writer: W) -> Self {
        Self {
            eof_is_idle: true,
            ..Self::new(reader, writer)
        }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R, W> ByteLink for StreamLink<R, W>
where
    R: Read + Send,
    W: Write + Send,
{
    fn poll_byte(&mut self) -> io::Result<Option<u8>> {
        if self.pos < self.len {
            let byte = self.buf[self.pos];
            self.pos += 1;
            return Ok(Some(byte));
        }

        match self.reader.read(&mut self.buf) {
            Ok(0) if self.eof_is_idle => Ok(None),
            Ok(0) => Err(io::Error::new(ErrorKind::UnexpectedEof, "link closed")),
            Ok(n) => {
                self.pos = 1;
                self.len = n;
                Ok(Some(self.buf[0]))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

// ─── Serial ─────────────────────────────────────────────────────────

fn baud_rate(baud: u32) -> Result<BaudRate, LinkError> {
    Ok(match baud {
        9_600 => BaudRate::B9600,
        19_200 => BaudRate::B19200,
        38_400 => BaudRate::B38400,
        57_600 => BaudRate::B57600,
        115_200 => BaudRate::B115200,
        230_400 => BaudRate::B230400,
        460_800 => BaudRate::B460800,
        921_600 => BaudRate::B921600,
        other => return Err(LinkError::UnsupportedBaud(other)),
    })
}

/// Open a tty raw at `baud`, 8N1, no flow control.
///
/// Reads return after at most `VTIME` (100 ms) without data so the receive
/// loop can observe cancellation.
pub fn open_serial(path: &Path, baud: u32) -> Result<StreamLink<File, File>, LinkError> {
    let speed = baud_rate(baud)?;
    let setup_err = |reason: String| LinkError::Setup {
        path: path.display().to_string(),
        reason,
    };

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)?;

    let mut tio = termios::tcgetattr(&file).map_err(|e| setup_err(format!("tcgetattr: {e}")))?;
    termios::cfmakeraw(&mut tio);
    termios::cfsetspeed(&mut tio, speed).map_err(|e| setup_err(format!("cfsetspeed: {e}")))?;
    tio.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
    tio.control_flags &= !(ControlFlags::CSTOPB | ControlFlags::CRTSCTS);
    tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    tio.control_chars[SpecialCharacterIndices::VTIME as usize] = SERIAL_VTIME;
    termios::tcsetattr(&file, SetArg::TCSANOW, &tio)
        .map_err(|e| setup_err(format!("tcsetattr: {e}")))?;
    termios::tcflush(&file, FlushArg::TCIOFLUSH)
        .map_err(|e| setup_err(format!("tcflush: {e}")))?;

    let writer = file.try_clone()?;
    info!("Serial link open on {} at {} baud", path.display(), baud);
    Ok(StreamLink::with_idle_eof(file, writer))
}

// ─── Stdio / TCP ────────────────────────────────────────────────────

/// Link over the process's stdin/stdout.
///
/// Reads block, so cancellation is only observed between bytes.
pub fn stdio() -> StreamLink<io::Stdin, io::Stdout> {
    StreamLink::new(io::stdin(), io::stdout())
}

fn socket_link(stream: TcpStream) -> io::Result<StreamLink<TcpStream, TcpStream>> {
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(SOCKET_POLL_TIMEOUT))?;
    let writer = stream.try_clone()?;
    Ok(StreamLink::new(stream, writer))
}

/// Connect to `address` (`host:port`).
pub fn connect_tcp(address: &str) -> Result<StreamLink<TcpStream, TcpStream>, LinkError> {
    let link = socket_link(TcpStream::connect(address)?)?;
    info!("TCP link connected to {}", address);
    Ok(link)
}

/// Listening side of a TCP link: the control unit waits for the sender to
/// connect.
#[derive(Debug)]
pub struct TcpLinkListener {
    listener: TcpListener,
}

impl TcpLinkListener {
    pub fn bind(address: &str) -> Result<Self, LinkError> {
        let listener = TcpListener::bind(address)?;
        Ok(Self { listener })
    }

    /// Bound address; useful when binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Block until one peer connects.
    pub fn accept(&self) -> Result<StreamLink<TcpStream, TcpStream>, LinkError> {
        info!("Waiting for a TCP peer on {}", self.local_addr()?);
        let (stream, peer) = self.listener.accept()?;
        let link = socket_link(stream)?;
        info!("TCP link accepted from {}", peer);
        Ok(link)
    }
}

/// Open the link described by `config`.
pub fn open(config: &LinkConfig) -> Result<Box<dyn ByteLink>, LinkError> {
    debug!(kind = ?config.kind, "opening link");
    Ok(match config.kind {
        LinkKind::Serial => Box::new(open_serial(Path::new(&config.path), config.baud)?),
        LinkKind::Stdio => Box::new(stdio()),
        LinkKind::Tcp => {
            let address = config
                .address
                .as_deref()
                .ok_or_else(|| LinkError::Config("tcp link requires an address".to_string()))?;
            Box::new(connect_tcp(address)?)
        }
        LinkKind::TcpListen => {
            let address = config
                .address
                .as_deref()
                .ok_or_else(|| LinkError::Config("tcp link requires an address".to_string()))?;
            Box::new(TcpLinkListener::bind(address)?.accept()?)
        }
    })
}

// ─── In-memory ──────────────────────────────────────────────────────

/// Scripted in-memory link.
#[derive(Debug, Default)]
pub struct MemoryLink {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    close_when_drained: bool,
}

impl MemoryLink {
    /// Link that reports "no data" forever once `inbound` is consumed.
    pub fn new(inbound: &[u8]) -> Self {
        Self {
            inbound: inbound.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Link that reports end of stream once `inbound` is consumed.
    pub fn closing(inbound: &[u8]) -> Self {
        Self {
            close_when_drained: true,
            ..Self::new(inbound)
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }

    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    pub fn sent(&self) -> &[u8] {
        &self.outbound
    }

    pub fn sent_text(&self) -> String {
        String::from_utf8_lossy(&self.outbound).into_owned()
    }
}

impl ByteLink for MemoryLink {
    fn poll_byte(&mut self) -> io::Result<Option<u8>> {
        match self.inbound.pop_front() {
            Some(byte) => Ok(Some(byte)),
            None if self.close_when_drained => {
                Err(io::Error::new(ErrorKind::UnexpectedEof, "link closed"))
            }
            None => Ok(None),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.outbound.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
