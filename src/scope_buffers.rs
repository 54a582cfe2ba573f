//! The four rolling windows behind the scope display, plus the trailing RMS
//! of the microphone channel and the redraw decimation counter.

use crate::ring_buffer::RingBuffer;
use crate::sample::{Channel, Raw, Sample, Volt};

/// Default window length, in samples.
pub const DEFAULT_BUFFER_LEN: usize = 400;

/// Number of most recent microphone samples the RMS is taken over.
pub const RMS_WINDOW: usize = 30;

/// The scope is redrawn on every `REDRAW_EVERY`th sample.
pub const REDRAW_EVERY: u64 = 3;

/// What a single [`RingBufferSet::push_sample`] produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushOutcome {
    /// RMS over the trailing microphone window, after this push
    pub rms: Volt,
    /// Whether this push is one the scope should redraw on
    pub redraw: bool,
}

/// Four equally sized [`RingBuffer`]s that always advance together, one
/// element per [`Sample`], so index `i` in each refers to the same instant.
#[derive(Debug, Clone)]
pub struct RingBufferSet {
    mic: RingBuffer<Volt>,
    x: RingBuffer<Raw>,
    y: RingBuffer<Raw>,
    z: RingBuffer<Raw>,
    pushes: u64,
    rms: Volt,
}

impl Default for RingBufferSet {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_LEN)
    }
}

impl RingBufferSet {
    /// Four zero-filled windows of `len` samples.
    pub fn new(len: usize) -> Self {
        Self {
            mic: RingBuffer::new(len),
            x: RingBuffer::new(len),
            y: RingBuffer::new(len),
            z: RingBuffer::new(len),
            pushes: 0,
            rms: 0.0,
        }
    }

    /// Slide every window forward by one sample.
    pub fn push_sample(&mut self, sample: &Sample) -> PushOutcome {
        self.mic.push(sample.mic);
        self.x.push(sample.x);
        self.y.push(sample.y);
        self.z.push(sample.z);

        self.pushes += 1;
        self.rms = trailing_rms(&self.mic, RMS_WINDOW);

        PushOutcome {
            rms: self.rms,
            redraw: self.pushes % REDRAW_EVERY == 0,
        }
    }

    /// The RMS as of the last push.
    pub fn rms(&self) -> Volt {
        self.rms
    }

    /// Number of samples pushed since construction.
    pub fn pushes(&self) -> u64 {
        self.pushes
    }

    /// Window length shared by all four buffers.
    pub fn len(&self) -> usize {
        self.mic.len()
    }

    /// Never true.
    pub fn is_empty(&self) -> bool {
        self.mic.is_empty()
    }

    /// The microphone window.
    pub fn mic(&self) -> &RingBuffer<Volt> {
        &self.mic
    }

    /// The window of one accelerometer axis. `Channel::Mic` is not an axis
    /// and yields `None`.
    pub fn axis(&self, channel: Channel) -> Option<&RingBuffer<Raw>> {
        match channel {
            Channel::Mic => None,
            Channel::X => Some(&self.x),
            Channel::Y => Some(&self.y),
            Channel::Z => Some(&self.z),
        }
    }

    /// `channel`'s window as plottable `(index, value)` points, oldest first.
    pub fn points(&self, channel: Channel) -> Vec<(f64, f64)> {
        let values: Vec<f64> = match self.axis(channel) {
            Some(buf) => buf.iter().map(f64::from).collect(),
            None => self.mic.iter().collect(),
        };
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i as f64, v))
            .collect()
    }
}

/// Root mean square of the newest `window` values of `buf`.
pub fn trailing_rms(buf: &RingBuffer<Volt>, window: usize) -> Volt {
    let (sum, n) = buf
        .latest(window)
        .fold((0.0, 0usize), |(sum, n), v| (sum + v * v, n + 1));
    if n == 0 {
        0.0
    } else {
        (sum / n as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(mic: Volt, x: Raw, y: Raw, z: Raw) -> Sample {
        Sample {
            timestamp: 0,
            mic,
            x,
            y,
            z,
        }
    }

    #[test]
    fn buffers_advance_together() {
        let mut set = RingBufferSet::new(5);
        set.push_sample(&sample(1.5, 10, 20, 30));
        set.push_sample(&sample(0.8, 11, 21, 31));

        assert_eq!(set.mic().to_vec(), vec![0.0, 0.0, 0.0, 1.5, 0.8]);
        for (channel, a, b) in [(Channel::X, 10, 11), (Channel::Y, 20, 21), (Channel::Z, 30, 31)] {
            let buf = set.axis(channel).unwrap();
            assert_eq!(buf.len(), 5);
            assert_eq!(&buf.to_vec()[3..], &[a, b]);
        }
    }

    #[test]
    fn rms_of_constant_signal() {
        let mut set = RingBufferSet::new(64);
        for _ in 0..RMS_WINDOW {
            set.push_sample(&sample(-1.25, 0, 0, 0));
        }
        assert!((set.rms() - 1.25).abs() < 1e-12);
    }

    #[test]
    fn rms_counts_zero_fill() {
        let mut set = RingBufferSet::new(100);
        let out = set.push_sample(&sample(3.0, 0, 0, 0));
        // one 3.0 among 29 zeros
        let expected = (9.0 / RMS_WINDOW as f64).sqrt();
        assert!((out.rms - expected).abs() < 1e-12);
    }

    #[test]
    fn rms_on_short_buffer_uses_whole_window() {
        let mut set = RingBufferSet::new(4);
        for v in [1.0, 1.0, 1.0, 1.0] {
            set.push_sample(&sample(v, 0, 0, 0));
        }
        assert!((set.rms() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn redraw_every_third_push() {
        let mut set = RingBufferSet::new(8);
        let redraws: Vec<bool> = (0..9)
            .map(|_| set.push_sample(&sample(0.0, 0, 0, 0)).redraw)
            .collect();
        assert_eq!(
            redraws,
            vec![false, false, true, false, false, true, false, false, true]
        );
        assert_eq!(set.pushes(), 9);
    }

    #[test]
    fn points_are_indexed() {
        let mut set = RingBufferSet::new(3);
        set.push_sample(&sample(0.5, 7, 8, 9));
        assert_eq!(set.points(Channel::Mic), vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.5)]);
        assert_eq!(set.points(Channel::Z)[2], (2.0, 9.0));
    }
}
