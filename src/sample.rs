//! The values that flow out of the pipeline: synchronized [`Sample`]s, the
//! four [`Channel`]s they carry, and which of those channels the scope
//! should currently draw.

use std::fmt;

/// Volts, as read by the microphone ADC.
pub type Volt = f64;

/// A raw accelerometer ADC count.
pub type Raw = i32;

/// One fully synchronized reading. Built only by the
/// [`FrameAssembler`](crate::frame_assembler::FrameAssembler) once all four
/// values for a frame have arrived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Milliseconds since the unix epoch, taken when the frame completed
    pub timestamp: u64,
    /// Microphone voltage
    pub mic: Volt,
    /// X axis
    pub x: Raw,
    /// Y axis
    pub y: Raw,
    /// Z axis
    pub z: Raw,
}

/// The four signals carried by every [`Sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Microphone voltage
    Mic,
    /// X axis of the accelerometer
    X,
    /// Y axis of the accelerometer
    Y,
    /// Z axis of the accelerometer
    Z,
}

impl Channel {
    /// All channels, in wire order.
    pub const ALL: [Channel; 4] = [Channel::Mic, Channel::X, Channel::Y, Channel::Z];

    /// The marker that tags this channel in the tagged wire format.
    pub fn marker(&self) -> &'static str {
        match self {
            Channel::Mic => "Voltage",
            Channel::X => "X_raw",
            Channel::Y => "Y_raw",
            Channel::Z => "Z_raw",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Mic => "Mic",
            Channel::X => "X",
            Channel::Y => "Y",
            Channel::Z => "Z",
        };
        write!(f, "{}", name)
    }
}

/// Per-channel visibility toggles. Only the renderer looks at these, every
/// channel is buffered and exported regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelVisibility {
    mic: bool,
    x: bool,
    y: bool,
    z: bool,
}

impl Default for ChannelVisibility {
    fn default() -> Self {
        Self {
            mic: true,
            x: true,
            y: true,
            z: true,
        }
    }
}

impl ChannelVisibility {
    fn slot(&mut self, channel: Channel) -> &mut bool {
        match channel {
            Channel::Mic => &mut self.mic,
            Channel::X => &mut self.x,
            Channel::Y => &mut self.y,
            Channel::Z => &mut self.z,
        }
    }

    /// Is `channel` currently drawn?
    pub fn is_visible(&self, channel: Channel) -> bool {
        match channel {
            Channel::Mic => self.mic,
            Channel::X => self.x,
            Channel::Y => self.y,
            Channel::Z => self.z,
        }
    }

    /// Show or hide `channel`.
    pub fn set(&mut self, channel: Channel, visible: bool) {
        *self.slot(channel) = visible;
    }

    /// Flip `channel` and return its new visibility.
    pub fn toggle(&mut self, channel: Channel) -> bool {
        let slot = self.slot(channel);
        *slot = !*slot;
        *slot
    }
}
