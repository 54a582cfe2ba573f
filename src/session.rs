//! A [`Session`] is everything that lives for one connection: the line
//! framer, the configured parser, the pending frame, the scope buffers and
//! the export log. Chunks go in through [`Session::feed`], completed samples
//! come out through a [`ScopeSink`].
//!
//! A session is driven from a single thread. Nothing else mutates its
//! buffers, a sink only ever gets to look at them.

use crate::config::{ConfigError, ScopeConfig};
use crate::export_log::{ExportError, ExportLog};
use crate::frame_assembler::{unix_millis, Clock, FrameAssembler, PendingFrame};
use crate::line_framer::LineFramer;
use crate::record_parser::{parser_for, RecordParser, WireFormat};
use crate::sample::{Channel, ChannelVisibility, Sample, Volt};
use crate::scope_buffers::RingBufferSet;

use log::{debug, info, warn};
use std::path::Path;

/// The render side of the pipeline.
pub trait ScopeSink {
    /// Called for every completed sample with the RMS after pushing it.
    fn readout(&mut self, sample: &Sample, rms: Volt);

    /// Called on every few samples to redraw the traces. Hidden channels
    /// are still in `buffers`; it is up to the sink not to draw them.
    fn redraw(&mut self, buffers: &RingBufferSet, visibility: &ChannelVisibility);
}

/// A [`ScopeSink`] that draws nothing, for headless recording.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ScopeSink for NullSink {
    fn readout(&mut self, _sample: &Sample, _rms: Volt) {}

    fn redraw(&mut self, _buffers: &RingBufferSet, _visibility: &ChannelVisibility) {}
}

/// Running totals for one session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Chunks fed while running
    pub chunks: u64,
    /// Chunks thrown away because the session was paused
    pub dropped_chunks: u64,
    /// Complete lines framed
    pub lines: u64,
    /// Blank lines and tagged-format chatter
    pub ignored_lines: u64,
    /// Malformed lines
    pub rejected_lines: u64,
    /// Samples completed
    pub samples: u64,
}

/// One connection's worth of pipeline state.
pub struct Session {
    framer: LineFramer,
    parser: Box<dyn RecordParser>,
    assembler: FrameAssembler,
    buffers: RingBufferSet,
    log: ExportLog,
    visibility: ChannelVisibility,
    paused: bool,
    sample_limit: Option<u64>,
    stats: SessionStats,
}

impl Session {
    /// A fresh session for `config`, which is validated first.
    pub fn new(config: &ScopeConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, unix_millis)
    }

    /// Same as [`Session::new`] but samples are stamped by `clock`.
    pub fn with_clock(config: &ScopeConfig, clock: Clock) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            framer: LineFramer::new(),
            parser: parser_for(config.format, config.separator),
            assembler: FrameAssembler::with_clock(config.duplicate_policy, clock),
            buffers: RingBufferSet::new(config.buffer_len),
            log: ExportLog::new(),
            visibility: ChannelVisibility::default(),
            paused: false,
            sample_limit: None,
            stats: SessionStats::default(),
        })
    }

    /// Push one chunk of received text through the pipeline and return how
    /// many samples it completed.
    ///
    /// While paused the chunk is discarded whole. The framer never sees it,
    /// so whatever partial line it held before the pause is still there
    /// when data starts flowing again.
    ///
    /// Once the sample limit is reached the rest of the chunk is left
    /// unprocessed and later chunks are dropped.
    pub fn feed(&mut self, chunk: &str, sink: &mut dyn ScopeSink) -> usize {
        if self.paused || self.is_full() {
            self.stats.dropped_chunks += 1;
            return 0;
        }
        self.stats.chunks += 1;

        let Session {
            framer,
            parser,
            assembler,
            buffers,
            log,
            visibility,
            sample_limit,
            stats,
            ..
        } = self;

        let mut completed = 0;
        let mut lines = framer.feed(chunk);
        while sample_limit.map_or(true, |limit| stats.samples < limit) {
            let Some(line) = lines.next() else {
                break;
            };
            stats.lines += 1;
            let record = match parser.parse(&line) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    stats.ignored_lines += 1;
                    continue;
                }
                Err(e) => {
                    stats.rejected_lines += 1;
                    warn!("Skipping malformed line {:?}: {}", line, e);
                    continue;
                }
            };

            let Some(sample) = assembler.accept(record) else {
                continue;
            };
            debug!("Completed {:?}", sample);

            let outcome = buffers.push_sample(&sample);
            log.append(sample);
            stats.samples += 1;
            completed += 1;

            sink.readout(&sample, outcome.rms);
            if outcome.redraw {
                sink.redraw(buffers, visibility);
            }
        }

        completed
    }

    /// Stop processing incoming chunks.
    pub fn pause(&mut self) {
        if !self.paused {
            info!("Session paused, incoming data will be dropped");
        }
        self.paused = true;
    }

    /// Start processing incoming chunks again.
    pub fn resume(&mut self) {
        if self.paused {
            info!("Session resumed");
        }
        self.paused = false;
    }

    /// Flip between paused and running, returning whether it is now paused.
    pub fn toggle_pause(&mut self) -> bool {
        if self.paused {
            self.resume();
        } else {
            self.pause();
        }
        self.paused
    }

    /// Is incoming data being dropped?
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Stop recording after `limit` samples in total; `None` records until
    /// the source ends.
    pub fn set_sample_limit(&mut self, limit: Option<u64>) {
        self.sample_limit = limit;
    }

    /// True once the sample limit has been reached.
    pub fn is_full(&self) -> bool {
        self.sample_limit
            .is_some_and(|limit| self.stats.samples >= limit)
    }

    /// Show or hide a channel in the scope. Recording is unaffected.
    pub fn toggle_channel(&mut self, channel: Channel) -> bool {
        self.visibility.toggle(channel)
    }

    /// Which channels the scope draws.
    pub fn visibility(&self) -> &ChannelVisibility {
        &self.visibility
    }

    /// The scope windows.
    pub fn buffers(&self) -> &RingBufferSet {
        &self.buffers
    }

    /// Everything recorded so far.
    pub fn export_log(&self) -> &ExportLog {
        &self.log
    }

    /// Write the export log as CSV to `path`.
    pub fn export_to(&self, path: impl AsRef<Path>) -> Result<usize, ExportError> {
        self.log.to_path(path.as_ref())?;
        info!(
            "Exported {} samples to {}",
            self.log.len(),
            path.as_ref().display()
        );
        Ok(self.log.len())
    }

    /// Drop everything recorded so far. The scope windows are left alone.
    pub fn clear_export_log(&mut self) {
        info!("Clearing {} recorded samples", self.log.len());
        self.log.clear();
    }

    /// The frame currently being assembled.
    pub fn pending(&self) -> &PendingFrame {
        self.assembler.pending()
    }

    /// Text received after the last line terminator.
    pub fn partial_line(&self) -> &str {
        self.framer.pending()
    }

    /// The wire format this session decodes.
    pub fn format(&self) -> WireFormat {
        self.parser.format()
    }

    /// Running totals.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> u64 {
        42
    }

    #[derive(Default)]
    struct RecordingSink {
        readouts: Vec<(Sample, Volt)>,
        redraws: usize,
        last_mic_trace: Vec<(f64, f64)>,
    }

    impl ScopeSink for RecordingSink {
        fn readout(&mut self, sample: &Sample, rms: Volt) {
            self.readouts.push((*sample, rms));
        }

        fn redraw(&mut self, buffers: &RingBufferSet, visibility: &ChannelVisibility) {
            self.redraws += 1;
            if visibility.is_visible(Channel::Mic) {
                self.last_mic_trace = buffers.points(Channel::Mic);
            }
        }
    }

    fn session(format: WireFormat) -> Session {
        let config = ScopeConfig {
            format,
            buffer_len: 10,
            ..ScopeConfig::default()
        };
        Session::with_clock(&config, clock).unwrap()
    }

    fn sample(mic: Volt, x: i32, y: i32, z: i32) -> Sample {
        Sample {
            timestamp: 42,
            mic,
            x,
            y,
            z,
        }
    }

    #[test]
    fn delimited_stream_produces_samples() {
        let mut session = session(WireFormat::Delimited);
        let mut sink = RecordingSink::default();

        let n = session.feed("1.500,10,20,30\n0.800,11,21,31\n", &mut sink);

        assert_eq!(n, 2);
        assert_eq!(
            session.export_log().samples(),
            &[sample(1.5, 10, 20, 30), sample(0.8, 11, 21, 31)]
        );
        let buffers = session.buffers();
        assert_eq!(&buffers.mic().to_vec()[8..], &[1.5, 0.8]);
        assert_eq!(&buffers.axis(Channel::X).unwrap().to_vec()[8..], &[10, 11]);
        assert_eq!(&buffers.axis(Channel::Y).unwrap().to_vec()[8..], &[20, 21]);
        assert_eq!(&buffers.axis(Channel::Z).unwrap().to_vec()[8..], &[30, 31]);
        assert_eq!(sink.readouts.len(), 2);
    }

    #[test]
    fn tagged_stream_needs_all_four_lines() {
        let mut session = session(WireFormat::Tagged);
        let mut sink = RecordingSink::default();

        assert_eq!(session.feed("Voltage: 1.2\n", &mut sink), 0);
        assert_eq!(session.feed("X_raw: 5\n", &mut sink), 0);
        assert_eq!(session.feed("Y_raw: 6\n", &mut sink), 0);
        assert_eq!(session.pending().filled(), 3);
        assert_eq!(session.feed("Z_raw: 7\n", &mut sink), 1);

        assert_eq!(session.export_log().samples(), &[sample(1.2, 5, 6, 7)]);
        assert!(session.pending().is_empty());
    }

    #[test]
    fn tagged_fields_survive_chunk_splits() {
        let mut session = session(WireFormat::Tagged);
        let mut sink = NullSink;
        let stream = "boot ok\nVoltage: 0.5\r\nX_raw: 1\r\nY_ra";
        assert_eq!(session.feed(stream, &mut sink), 0);
        assert_eq!(session.feed("w: 2\r\nZ_raw: 3\r\n", &mut sink), 1);
        assert_eq!(session.export_log().samples(), &[sample(0.5, 1, 2, 3)]);
        assert_eq!(session.stats().ignored_lines, 1);
    }

    #[test]
    fn malformed_line_changes_nothing() {
        let mut session = session(WireFormat::Delimited);
        let mut sink = RecordingSink::default();

        assert_eq!(session.feed("1.5,10,20\n", &mut sink), 0);
        assert!(session.pending().is_empty());
        assert!(session.export_log().is_empty());
        assert_eq!(session.buffers().pushes(), 0);
        assert_eq!(session.stats().rejected_lines, 1);
    }

    #[test]
    fn malformed_line_keeps_tagged_partial_frame() {
        let mut session = session(WireFormat::Tagged);
        let mut sink = NullSink;
        session.feed("Voltage: 2.0\nX_raw: 4\n", &mut sink);
        let before = *session.pending();
        session.feed("Y_raw: ???\n", &mut sink);
        assert_eq!(*session.pending(), before);
        assert_eq!(session.stats().rejected_lines, 1);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let mut session = session(WireFormat::Delimited);
        let mut sink = NullSink;
        assert_eq!(session.feed("\n  \r\n1,2,3,4\n", &mut sink), 1);
        let stats = session.stats();
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.ignored_lines, 2);
        assert_eq!(stats.rejected_lines, 0);
    }

    #[test]
    fn paused_chunks_do_not_touch_the_framer() {
        let mut session = session(WireFormat::Delimited);
        let mut sink = NullSink;

        session.feed("1.0,1,1,1\n2.0,2", &mut sink);
        assert_eq!(session.partial_line(), "2.0,2");

        assert!(session.toggle_pause());
        assert_eq!(session.feed(",2,2\n9.9,9,9,9\n", &mut sink), 0);
        assert_eq!(session.partial_line(), "2.0,2");
        assert_eq!(session.stats().dropped_chunks, 1);

        assert!(!session.toggle_pause());
        assert_eq!(session.feed(",2,2\n", &mut sink), 1);
        let mics: Vec<_> = session.export_log().samples().iter().map(|s| s.mic).collect();
        assert_eq!(mics, vec![1.0, 2.0]);
    }

    #[test]
    fn redraw_is_decimated_but_readout_is_not() {
        let mut session = session(WireFormat::Delimited);
        let mut sink = RecordingSink::default();
        let text: String = (0..7).map(|i| format!("{}.0,{},0,0\n", i, i)).collect();

        assert_eq!(session.feed(&text, &mut sink), 7);
        assert_eq!(sink.readouts.len(), 7);
        assert_eq!(sink.redraws, 2);
        // the last redraw happened after the sixth sample
        assert_eq!(sink.last_mic_trace.last(), Some(&(9.0, 5.0)));
    }

    #[test]
    fn hidden_channels_are_still_recorded() {
        let mut session = session(WireFormat::Delimited);
        let mut sink = NullSink;
        for channel in Channel::ALL {
            session.toggle_channel(channel);
        }
        assert!(!session.visibility().is_visible(Channel::Z));
        session.feed("1.0,2,3,4\n", &mut sink);
        assert_eq!(session.export_log().len(), 1);
        assert_eq!(session.buffers().axis(Channel::Z).unwrap().last(), 4);
    }

    #[test]
    fn invalid_config_is_refused() {
        let config = ScopeConfig {
            buffer_len: 0,
            ..ScopeConfig::default()
        };
        assert!(matches!(
            Session::new(&config),
            Err(ConfigError::InvalidBufferLength)
        ));
    }

    #[test]
    fn sample_limit_stops_mid_chunk() {
        let mut session = session(WireFormat::Delimited);
        let mut sink = RecordingSink::default();
        session.set_sample_limit(Some(5));
        let text: String = (0..40).map(|i| format!("1.0,{},0,0\n", i)).collect();

        assert_eq!(session.feed(&text, &mut sink), 5);
        assert!(session.is_full());
        assert_eq!(sink.readouts.len(), 5);
        assert_eq!(session.feed("2.0,9,9,9\n", &mut sink), 0);

        let xs: Vec<_> = session.export_log().samples().iter().map(|s| s.x).collect();
        assert_eq!(xs, vec![0, 1, 2, 3, 4]);
        assert_eq!(session.stats().lines, 5);
    }

    #[test]
    fn export_and_clear() {
        let mut session = session(WireFormat::Delimited);
        let mut sink = NullSink;
        let tempfile = tempfile::NamedTempFile::new().unwrap();

        assert!(matches!(
            session.export_to(tempfile.path()),
            Err(ExportError::NoData)
        ));

        session.feed("1.5,10,20,30\n", &mut sink);
        assert_eq!(session.export_to(tempfile.path()).unwrap(), 1);
        let csv = std::fs::read_to_string(tempfile.path()).unwrap();
        assert_eq!(csv, "time,micV,x,y,z\n42,1.5,10,20,30\n");

        session.clear_export_log();
        assert!(session.export_log().is_empty());
        assert_eq!(session.buffers().mic().last(), 1.5);
    }
}
