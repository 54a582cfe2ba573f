//! Where the text comes from. A [`Transport`] is pulled for chunks of text
//! by the reader thread (see [`Connection`](crate::connection::Connection));
//! how the bytes got there is its own business.
//!
//! Three sources are provided: a serial port, any [`Read`]er (a capture file
//! or stdin), and a simulated device that is handy when no board is plugged
//! in.

use crate::record_parser::WireFormat;

use log::{debug, info};
use rand::prelude::*;
use serial2::SerialPort;
use std::{
    borrow::Cow,
    f64::consts::PI,
    fmt,
    fs::File,
    io::{self, ErrorKind, Read},
    path::{Path, PathBuf},
    time::Duration,
};

/// How long a serial read blocks before giving the reader thread a chance
/// to notice it has been asked to stop.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

const READ_BUFFER_SIZE: usize = 256;

/// The result of one pull from a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Some text arrived
    Text(String),
    /// Nothing arrived this time around
    Idle,
    /// The stream has ended, there will be no more text
    Done,
}

/// Failures opening or reading a [`Transport`].
#[derive(Debug)]
pub enum TransportError {
    /// The device or file could not be opened.
    Open(String, io::Error),

    /// Reading failed, typically because the device was unplugged.
    Read(io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            TransportError::Open(name, error) => {
                Cow::from(format!("failed to open {}: {}", name, error))
            }
            TransportError::Read(error) => Cow::from(format!("read failed: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for TransportError {}

/// A pull-based source of text chunks.
pub trait Transport: fmt::Display + Send {
    /// Block until some text arrives, the poll interval passes, or the
    /// stream ends.
    fn read(&mut self) -> Result<Chunk, TransportError>;

    /// Release the underlying device. Reading afterwards yields
    /// [`Chunk::Done`].
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Turns raw reads into text. A multi-byte character cut in half by a read
/// is held back until the rest of it arrives; bytes that can never be valid
/// UTF-8 (line noise as the port comes up, usually) become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    carry: Vec<u8>,
}

impl Utf8ChunkDecoder {
    /// A decoder with nothing held back.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, prefixed with whatever was held back last time.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);

        let mut out = String::with_capacity(self.carry.len());
        let mut start = 0;
        while start < self.carry.len() {
            match std::str::from_utf8(&self.carry[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.carry.len();
                }
                Err(e) => {
                    let valid = start + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.carry[start..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid + bad;
                        }
                        None => {
                            start = valid;
                            break;
                        }
                    }
                }
            }
        }

        self.carry.drain(..start);
        out
    }

    /// Whatever is still held back, decoded lossily. Used once the stream
    /// has ended.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        rest
    }
}

/// A [`Transport`] over anything that implements [`Read`].
///
/// Read timeouts count as [`Chunk::Idle`]; a zero-length read is the end of
/// the stream.
pub struct StreamTransport<R> {
    reader: Option<R>,
    decoder: Utf8ChunkDecoder,
    buffer: Box<[u8]>,
    name: String,
}

impl<R: Read + Send> StreamTransport<R> {
    /// Wrap `reader`; `name` is only used for logging.
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader: Some(reader),
            decoder: Utf8ChunkDecoder::new(),
            buffer: vec![0; READ_BUFFER_SIZE].into_boxed_slice(),
            name: name.into(),
        }
    }
}

impl<R> fmt::Display for StreamTransport<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl<R: Read + Send> Transport for StreamTransport<R> {
    fn read(&mut self) -> Result<Chunk, TransportError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(Chunk::Done);
        };

        match reader.read(&mut self.buffer) {
            Ok(0) => {
                self.reader = None;
                let rest = self.decoder.finish();
                if rest.is_empty() {
                    Ok(Chunk::Done)
                } else {
                    Ok(Chunk::Text(rest))
                }
            }
            Ok(n) => {
                let text = self.decoder.decode(&self.buffer[..n]);
                if text.is_empty() {
                    Ok(Chunk::Idle)
                } else {
                    Ok(Chunk::Text(text))
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(Chunk::Idle)
            }
            Err(e) => Err(TransportError::Read(e)),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.reader.take().is_some() {
            debug!("{} : closed", self.name);
        }
        Ok(())
    }
}

/// Serial devices currently attached to the machine.
pub fn available_ports() -> Result<Vec<PathBuf>, TransportError> {
    SerialPort::available_ports().map_err(|e| TransportError::Open("port list".to_owned(), e))
}

/// Open the serial device at `path`.
pub fn open_serial(
    path: impl AsRef<Path>,
    baud_rate: u32,
) -> Result<StreamTransport<SerialPort>, TransportError> {
    let name = path.as_ref().display().to_string();
    let mut port =
        SerialPort::open(path.as_ref(), baud_rate).map_err(|e| TransportError::Open(name.clone(), e))?;
    port.set_read_timeout(POLL_INTERVAL)
        .map_err(|e| TransportError::Open(name.clone(), e))?;

    info!("Opened {} at {} baud", name, baud_rate);
    Ok(StreamTransport::new(port, name))
}

/// Replay a captured stream from a file, or from stdin when `path` is `-`.
pub fn open_input(path: impl AsRef<Path>) -> Result<StreamTransport<Box<dyn Read + Send>>, TransportError> {
    let path = path.as_ref();
    if path == Path::new("-") {
        let stdin: Box<dyn Read + Send> = Box::new(io::stdin());
        return Ok(StreamTransport::new(stdin, "stdin"));
    }

    let name = path.display().to_string();
    let file: Box<dyn Read + Send> =
        Box::new(File::open(path).map_err(|e| TransportError::Open(name.clone(), e))?);
    info!("Replaying {}", name);
    Ok(StreamTransport::new(file, name))
}

/// A stand-in for the board: a slow sine on the microphone and three
/// out-of-phase sines on the accelerometer, with a little noise, printed in
/// the configured [`WireFormat`] and handed out in randomly sized pieces.
pub struct SimulatedTransport {
    format: WireFormat,
    interval: Duration,
    limit: Option<u64>,
    produced: u64,
    backlog: String,
    rng: StdRng,
    closed: bool,
}

impl SimulatedTransport {
    /// A simulated device emitting one frame every `interval`.
    pub fn new(format: WireFormat, interval: Duration) -> Self {
        Self {
            format,
            interval,
            limit: None,
            produced: 0,
            backlog: String::new(),
            rng: StdRng::from_entropy(),
            closed: false,
        }
    }

    /// End the stream after `frames` frames.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Use a fixed seed so the output is reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn next_frame(&mut self) {
        let t = self.produced as f64 / 100.0;
        let noise = self.rng.gen_range(-0.02..0.02);
        let mic = (1.65 + 1.2 * (2.0 * PI * 1.5 * t).sin() + noise).clamp(0.0, 3.3);
        let mut axis = |phase: f64| -> i32 {
            let jitter: f64 = self.rng.gen_range(-8.0..8.0);
            (2048.0 + 600.0 * (2.0 * PI * 0.5 * t + phase).sin() + jitter).round() as i32
        };
        let (x, y, z) = (axis(0.0), axis(2.0 * PI / 3.0), axis(4.0 * PI / 3.0));

        match self.format {
            WireFormat::Delimited => {
                self.backlog
                    .push_str(&format!("{:.3},{},{},{}\r\n", mic, x, y, z));
            }
            WireFormat::Tagged => {
                if self.produced % 50 == 0 {
                    self.backlog.push_str("ADXL354 OK\r\n");
                }
                self.backlog.push_str(&format!(
                    "Voltage: {:.3} V\r\nX_raw: {}\r\nY_raw: {}\r\nZ_raw: {}\r\n",
                    mic, x, y, z
                ));
            }
        }
        self.produced += 1;
    }

    fn exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.produced >= limit)
    }
}

impl fmt::Display for SimulatedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "simulated device ({:?})", self.format)
    }
}

impl Transport for SimulatedTransport {
    fn read(&mut self) -> Result<Chunk, TransportError> {
        if self.closed {
            return Ok(Chunk::Done);
        }
        if self.exhausted() {
            if self.backlog.is_empty() {
                return Ok(Chunk::Done);
            }
            return Ok(Chunk::Text(std::mem::take(&mut self.backlog)));
        }

        if !self.interval.is_zero() {
            spin_sleep::sleep(self.interval);
        }
        self.next_frame();

        // The backlog is ASCII, so any byte offset is a char boundary.
        let cut = self.rng.gen_range(1..=self.backlog.len());
        let rest = self.backlog.split_off(cut);
        Ok(Chunk::Text(std::mem::replace(&mut self.backlog, rest)))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.backlog.clear();
        Ok(())
    }
}
