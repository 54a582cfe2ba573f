//! Collects decoded values into a pending frame and hands out a [`Sample`]
//! once all four channels are present.
//!
//! In the delimited format every record carries all four values, so a frame
//! completes on every line. In the tagged format the values trickle in one
//! line at a time and the pending frame holds partial state across many
//! lines and chunks.

use crate::record_parser::{FieldUpdate, FrameValues, Record};
use crate::sample::{Raw, Sample, Volt};

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the timestamp stamped on each completed [`Sample`].
pub type Clock = fn() -> u64;

/// Wall-clock milliseconds since the unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// What to do when a field arrives a second time before its frame completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// The newer value replaces the older one
    #[default]
    LastWriteWins,
    /// The older value is kept and the newer one dropped
    KeepFirst,
}

/// The frame currently being filled in.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PendingFrame {
    /// Microphone voltage, if seen
    pub mic: Option<Volt>,
    /// X axis, if seen
    pub x: Option<Raw>,
    /// Y axis, if seen
    pub y: Option<Raw>,
    /// Z axis, if seen
    pub z: Option<Raw>,
}

impl PendingFrame {
    /// How many of the four fields are present.
    pub fn filled(&self) -> usize {
        [
            self.mic.is_some(),
            self.x.is_some(),
            self.y.is_some(),
            self.z.is_some(),
        ]
        .iter()
        .filter(|&&present| present)
        .count()
    }

    /// True when no field is present.
    pub fn is_empty(&self) -> bool {
        self.filled() == 0
    }

    fn set(&mut self, update: FieldUpdate, policy: DuplicatePolicy) {
        fn write<T>(slot: &mut Option<T>, value: T, policy: DuplicatePolicy) {
            if slot.is_none() || policy == DuplicatePolicy::LastWriteWins {
                *slot = Some(value);
            }
        }

        match update {
            FieldUpdate::Mic(v) => write(&mut self.mic, v, policy),
            FieldUpdate::X(v) => write(&mut self.x, v, policy),
            FieldUpdate::Y(v) => write(&mut self.y, v, policy),
            FieldUpdate::Z(v) => write(&mut self.z, v, policy),
        }
    }

    /// If every field is present, empty the frame and return its values.
    fn take_complete(&mut self) -> Option<FrameValues> {
        match *self {
            PendingFrame {
                mic: Some(mic),
                x: Some(x),
                y: Some(y),
                z: Some(z),
            } => {
                *self = PendingFrame::default();
                Some(FrameValues { mic, x, y, z })
            }
            _ => None,
        }
    }
}

/// Where the assembler is between completed frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// No field set
    Empty,
    /// Between one and three fields set
    Partial(usize),
}

/// Owns the [`PendingFrame`] and turns [`Record`]s into [`Sample`]s.
#[derive(Debug)]
pub struct FrameAssembler {
    pending: PendingFrame,
    policy: DuplicatePolicy,
    clock: Clock,
    completed: u64,
}

impl FrameAssembler {
    /// An assembler that stamps samples with the wall clock.
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self::with_clock(policy, unix_millis)
    }

    /// An assembler that stamps samples with `clock`.
    pub fn with_clock(policy: DuplicatePolicy, clock: Clock) -> Self {
        Self {
            pending: PendingFrame::default(),
            policy,
            clock,
            completed: 0,
        }
    }

    /// Apply one decoded record. Returns the finished [`Sample`] if this
    /// record completed the frame, in which case the pending frame is
    /// already empty again when this returns.
    pub fn accept(&mut self, record: Record) -> Option<Sample> {
        match record {
            Record::Frame(FrameValues { mic, x, y, z }) => {
                self.pending = PendingFrame {
                    mic: Some(mic),
                    x: Some(x),
                    y: Some(y),
                    z: Some(z),
                };
            }
            Record::Field(update) => self.pending.set(update, self.policy),
        }

        let FrameValues { mic, x, y, z } = self.pending.take_complete()?;
        self.completed += 1;
        Some(Sample {
            timestamp: (self.clock)(),
            mic,
            x,
            y,
            z,
        })
    }

    /// The frame being filled in.
    pub fn pending(&self) -> &PendingFrame {
        &self.pending
    }

    /// [`AssemblerState::Empty`] or [`AssemblerState::Partial`]; a complete
    /// frame is never observable.
    pub fn state(&self) -> AssemblerState {
        match self.pending.filled() {
            0 => AssemblerState::Empty,
            n => AssemblerState::Partial(n),
        }
    }

    /// Number of samples produced so far.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Forget any partially filled frame.
    pub fn reset(&mut self) {
        self.pending = PendingFrame::default();
    }
}
