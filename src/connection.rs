//! The read loop. A [`Connection`] moves a [`Transport`] onto its own thread,
//! which blocks on reads and forwards every chunk of text over a channel.
//! The thread that owns the [`Session`] drains that channel, so the pipeline
//! itself stays single-threaded and the reader is never held up by it.

use crate::session::{NullSink, ScopeSink, Session};
use crate::transport::{Chunk, Transport};

use log::{debug, info, warn};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// How long [`Connection::disconnect`] waits for the reader thread before
/// leaving it behind.
const JOIN_GRACE: Duration = Duration::from_millis(500);

enum LinkEvent {
    Data(String),
    Ended,
    Failed(String),
}

/// Whether more data can be expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// Still connected
    Open,
    /// The source ran out of data
    Ended,
    /// Reading failed; the message says why
    Failed(String),
    /// [`Connection::disconnect`] was called
    Disconnected,
}

impl LinkStatus {
    /// True while the link can still deliver data.
    pub fn is_open(&self) -> bool {
        *self == LinkStatus::Open
    }
}

/// A running reader thread plus the receiving end of its channel.
pub struct Connection {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    rx: Receiver<LinkEvent>,
    status: LinkStatus,
}

impl Connection {
    /// Start reading from `transport` on a new thread.
    pub fn open(mut transport: Box<dyn Transport>) -> Self {
        let name = transport.to_string();
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let th_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            // Checked after every read resolves, which is as soon as the
            // reader can notice.
            while !th_stop.load(Ordering::Relaxed) {
                let event = match transport.read() {
                    Ok(Chunk::Text(text)) => LinkEvent::Data(text),
                    Ok(Chunk::Idle) => continue,
                    Ok(Chunk::Done) => LinkEvent::Ended,
                    Err(e) => {
                        warn!("{} : {}", transport, e);
                        LinkEvent::Failed(e.to_string())
                    }
                };
                let last = !matches!(event, LinkEvent::Data(_));
                if tx.send(event).is_err() || last {
                    break;
                }
            }

            if let Err(e) = transport.close() {
                debug!("{} : error while closing : {}", transport, e);
            }
            info!("{} : reader terminated.", transport);
        });

        info!("Connected to {}", name);
        Self {
            name,
            stop,
            handle: Some(handle),
            rx,
            status: LinkStatus::Open,
        }
    }

    /// What the connection is reading from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The link status as of the last [`pump`](Connection::pump).
    pub fn status(&self) -> &LinkStatus {
        &self.status
    }

    fn apply(&mut self, event: LinkEvent, session: &mut Session, sink: &mut dyn ScopeSink) -> usize {
        match event {
            LinkEvent::Data(text) => session.feed(&text, sink),
            LinkEvent::Ended => {
                info!("{} : end of stream", self.name);
                self.status = LinkStatus::Ended;
                0
            }
            LinkEvent::Failed(msg) => {
                self.status = LinkStatus::Failed(msg);
                0
            }
        }
    }

    /// Feed everything received so far into `session`, waiting up to `wait`
    /// for the first chunk if nothing is queued. Returns the number of
    /// samples completed.
    ///
    /// Once the link is closed this just sleeps for `wait`, so callers
    /// polling in a loop are still paced.
    pub fn pump(&mut self, session: &mut Session, sink: &mut dyn ScopeSink, wait: Duration) -> usize {
        if !self.status.is_open() {
            thread::sleep(wait);
            return 0;
        }

        let mut completed = match self.rx.recv_timeout(wait) {
            Ok(event) => self.apply(event, session, sink),
            Err(RecvTimeoutError::Timeout) => return 0,
            Err(RecvTimeoutError::Disconnected) => {
                self.status = LinkStatus::Ended;
                return 0;
            }
        };

        while self.status.is_open() {
            match self.rx.try_recv() {
                Ok(event) => completed += self.apply(event, session, sink),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.status = LinkStatus::Ended,
            }
        }

        completed
    }

    /// Pump without a display until `session` reaches its sample limit,
    /// `deadline` passes, or the link closes. Returns the number of samples
    /// recorded.
    pub fn record(&mut self, session: &mut Session, deadline: Option<Instant>, wait: Duration) -> u64 {
        let mut samples = 0u64;
        info!("Recording from {}", self.name);
        while self.status.is_open() && !session.is_full() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            samples += self.pump(session, &mut NullSink, wait) as u64;
        }
        info!("Recording stopped: {:?}, {} samples", self.status, samples);
        samples
    }

    /// Stop the reader and release the transport. Never fails: problems
    /// along the way are logged and otherwise ignored. A reader stuck in a
    /// read that never returns (stdin, say) is left to finish on its own.
    pub fn disconnect(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(handle) = self.handle.take() {
            let deadline = Instant::now() + JOIN_GRACE;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    debug!("{} : reader thread panicked", self.name);
                }
            } else {
                debug!("{} : reader still blocked, leaving it behind", self.name);
            }
            info!("Disconnected from {}", self.name);
        }

        self.status = LinkStatus::Disconnected;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeConfig;
    use crate::record_parser::WireFormat;
    use crate::transport::{SimulatedTransport, StreamTransport, TransportError};
    use std::fmt;
    use std::io::Cursor;

    fn run_to_end(conn: &mut Connection, session: &mut Session) -> usize {
        let mut total = 0;
        let deadline = Instant::now() + Duration::from_secs(10);
        while conn.status().is_open() && Instant::now() < deadline {
            total += conn.pump(session, &mut NullSink, Duration::from_millis(20));
        }
        total
    }

    #[test]
    fn replayed_stream_reaches_the_session() {
        let text = "1.500,10,20,30\r\n0.800,11,21,31\r\nnoise\r\n0.1,1,2,3\r\n";
        let transport = StreamTransport::new(Cursor::new(text.as_bytes().to_vec()), "capture");
        let mut conn = Connection::open(Box::new(transport));
        let mut session = Session::new(&ScopeConfig::default()).unwrap();

        assert_eq!(run_to_end(&mut conn, &mut session), 3);
        assert_eq!(conn.status(), &LinkStatus::Ended);
        assert_eq!(session.stats().rejected_lines, 1);
        conn.disconnect();
        assert_eq!(conn.status(), &LinkStatus::Disconnected);
    }

    #[test]
    fn simulated_tagged_device() {
        let sim = SimulatedTransport::new(WireFormat::Tagged, Duration::ZERO)
            .with_seed(3)
            .with_limit(120);
        let mut conn = Connection::open(Box::new(sim));
        let config = ScopeConfig {
            format: WireFormat::Tagged,
            ..ScopeConfig::default()
        };
        let mut session = Session::new(&config).unwrap();

        assert_eq!(run_to_end(&mut conn, &mut session), 120);
        assert_eq!(session.stats().rejected_lines, 0);
        assert!(session.pending().is_empty());
    }

    #[test]
    fn disconnect_stops_an_endless_device() {
        let sim = SimulatedTransport::new(WireFormat::Delimited, Duration::from_millis(1));
        let mut conn = Connection::open(Box::new(sim));
        let mut session = Session::new(&ScopeConfig::default()).unwrap();
        conn.pump(&mut session, &mut NullSink, Duration::from_millis(50));
        conn.disconnect();
        assert_eq!(conn.status(), &LinkStatus::Disconnected);
        assert_eq!(conn.pump(&mut session, &mut NullSink, Duration::ZERO), 0);
    }

    fn replay(lines: usize) -> Connection {
        let text: String = (0..lines).map(|i| format!("1.0,{},0,0\n", i)).collect();
        Connection::open(Box::new(StreamTransport::new(
            Cursor::new(text.into_bytes()),
            "capture",
        )))
    }

    #[test]
    fn closed_link_still_waits() {
        let mut conn = replay(1);
        let mut session = Session::new(&ScopeConfig::default()).unwrap();
        run_to_end(&mut conn, &mut session);
        assert_eq!(conn.status(), &LinkStatus::Ended);

        let wait = Duration::from_millis(30);
        let started = Instant::now();
        assert_eq!(conn.pump(&mut session, &mut NullSink, wait), 0);
        assert!(started.elapsed() >= wait);
    }

    #[test]
    fn record_exports_exactly_the_limit() {
        let mut conn = replay(40);
        let mut session = Session::new(&ScopeConfig::default()).unwrap();
        session.set_sample_limit(Some(5));

        assert_eq!(conn.record(&mut session, None, Duration::from_millis(20)), 5);
        conn.disconnect();

        let tempfile = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(session.export_to(tempfile.path()).unwrap(), 5);
        let csv = std::fs::read_to_string(tempfile.path()).unwrap();
        assert_eq!(csv.lines().count(), 6);
        assert!(csv.lines().last().unwrap().ends_with(",1,4,0,0"));
    }

    #[test]
    fn record_runs_to_end_without_limit() {
        let mut conn = replay(12);
        let mut session = Session::new(&ScopeConfig::default()).unwrap();
        assert_eq!(conn.record(&mut session, None, Duration::from_millis(20)), 12);
        assert_eq!(conn.status(), &LinkStatus::Ended);
    }

    #[test]
    fn record_stops_at_deadline() {
        let sim = SimulatedTransport::new(WireFormat::Delimited, Duration::from_millis(1));
        let mut conn = Connection::open(Box::new(sim));
        let mut session = Session::new(&ScopeConfig::default()).unwrap();
        let deadline = Instant::now() + Duration::from_millis(100);
        conn.record(&mut session, Some(deadline), Duration::from_millis(20));
        assert!(Instant::now() >= deadline);
        assert!(conn.status().is_open());
    }

    struct BrokenTransport;

    impl fmt::Display for BrokenTransport {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "broken")
        }
    }

    impl Transport for BrokenTransport {
        fn read(&mut self) -> Result<Chunk, TransportError> {
            Err(TransportError::Read(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "unplugged",
            )))
        }

        fn close(&mut self) -> Result<(), TransportError> {
            Err(TransportError::Read(std::io::Error::new(
                std::io::ErrorKind::Other,
                "already gone",
            )))
        }
    }

    #[test]
    fn read_failure_is_reported_and_teardown_still_completes() {
        let mut conn = Connection::open(Box::new(BrokenTransport));
        let mut session = Session::new(&ScopeConfig::default()).unwrap();
        run_to_end(&mut conn, &mut session);
        assert!(matches!(conn.status(), LinkStatus::Failed(_)));
        conn.disconnect();
        assert_eq!(conn.status(), &LinkStatus::Disconnected);
    }
}
