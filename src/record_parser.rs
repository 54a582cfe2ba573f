//! Decodes one framed line into sensor values. The firmware speaks one of
//! two line formats, picked by configuration when the session starts:
//!
//! - [`WireFormat::Delimited`]: every line carries a whole frame,
//!   `voltage,x,y,z`, e.g. `1.500,2048,2051,1990`.
//! - [`WireFormat::Tagged`]: each value arrives on its own line, labelled by
//!   a marker, e.g. `Voltage: 1.50 V` then `X_raw: 2048` and so on. Lines
//!   without a marker are chatter and are ignored.
//!
//! Neither parser ever panics or aborts on bad input. A malformed line comes
//! back as a [`ParseError`] which the caller logs and skips.

use crate::sample::{Channel, Raw, Volt};

use nom::{
    bytes::complete::take_till,
    character::complete::{anychar, char, digit0, digit1, i32},
    combinator::{all_consuming, opt, recognize, verify},
    multi::{many_till, separated_list1},
    number::complete::double,
    sequence::{pair, tuple},
    Finish, IResult,
};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt};

/// Number of fields in a delimited record.
pub const FIELD_COUNT: usize = 4;

/// The line format the firmware was flashed to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum WireFormat {
    /// `voltage<sep>x<sep>y<sep>z` on every line
    #[default]
    Delimited,
    /// One `Voltage`/`X_raw`/`Y_raw`/`Z_raw` tagged value per line
    Tagged,
}

/// All four values of a frame, as they arrive on one delimited line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameValues {
    /// Microphone voltage
    pub mic: Volt,
    /// X axis
    pub x: Raw,
    /// Y axis
    pub y: Raw,
    /// Z axis
    pub z: Raw,
}

/// A single value, as it arrives on one tagged line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldUpdate {
    /// Microphone voltage
    Mic(Volt),
    /// X axis
    X(Raw),
    /// Y axis
    Y(Raw),
    /// Z axis
    Z(Raw),
}

impl FieldUpdate {
    /// The channel this value belongs to.
    pub fn channel(&self) -> Channel {
        match self {
            FieldUpdate::Mic(_) => Channel::Mic,
            FieldUpdate::X(_) => Channel::X,
            FieldUpdate::Y(_) => Channel::Y,
            FieldUpdate::Z(_) => Channel::Z,
        }
    }
}

/// What a successfully decoded line contributes to the pending frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Record {
    /// Every field at once
    Frame(FrameValues),
    /// Exactly one field
    Field(FieldUpdate),
}

/// Why a line was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A delimited line split into the wrong number of fields.
    FieldCount {
        /// How many fields the line actually had
        found: usize,
    },

    /// A field was present but is not a number of the expected kind.
    BadNumber {
        /// Which field
        channel: Channel,
        /// The offending text
        text: String,
    },

    /// A tagged line carried a marker but no number to go with it.
    MissingValue {
        /// The channel whose marker was seen
        channel: Channel,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ParseError::FieldCount { found } => Cow::from(format!(
                "expected {} fields, found {}",
                FIELD_COUNT, found
            )),
            ParseError::BadNumber { channel, text } => {
                Cow::from(format!("{} field is not a number: {:?}", channel, text))
            }
            ParseError::MissingValue { channel } => {
                Cow::from(format!("{} marker without a value", channel))
            }
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ParseError {}

/// Turns one framed line into a [`Record`].
///
/// `Ok(None)` means the line carried nothing to record (blank, or chatter
/// in the tagged format). That is not an error.
pub trait RecordParser {
    /// Decode `line`, which has already had its terminator removed.
    fn parse(&self, line: &str) -> Result<Option<Record>, ParseError>;

    /// The wire format this parser understands.
    fn format(&self) -> WireFormat;
}

/// Builds the parser for `format`. `separator` only matters for
/// [`WireFormat::Delimited`].
pub fn parser_for(format: WireFormat, separator: char) -> Box<dyn RecordParser> {
    match format {
        WireFormat::Delimited => Box::new(DelimitedParser::new(separator)),
        WireFormat::Tagged => Box::new(TaggedParser),
    }
}

fn volt(s: &str) -> IResult<&str, Volt> {
    verify(double, |v: &f64| v.is_finite())(s)
}

fn raw(s: &str) -> IResult<&str, Raw> {
    i32(s)
}

// The whole (trimmed) field has to be the number, trailing junk is rejected.
fn whole_field<'a, O>(
    parser: fn(&'a str) -> IResult<&'a str, O>,
    field: &'a str,
    channel: Channel,
) -> Result<O, ParseError> {
    all_consuming(parser)(field.trim())
        .finish()
        .map(|(_, value)| value)
        .map_err(|_| ParseError::BadNumber {
            channel,
            text: field.to_owned(),
        })
}

/// Parser for lines like `1.500,2048,2051,1990`.
#[derive(Debug, Clone, Copy)]
pub struct DelimitedParser {
    separator: char,
}

impl DelimitedParser {
    /// A parser splitting fields on `separator`.
    pub fn new(separator: char) -> Self {
        Self { separator }
    }

    fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        let sep = self.separator;
        let fields: IResult<&str, Vec<&str>> =
            all_consuming(separated_list1(char(sep), take_till(move |c| c == sep)))(line);
        match fields.finish() {
            Ok((_, fields)) => fields,
            // take_till accepts anything short of a separator, so the list
            // always covers the whole line
            Err(_) => vec![line],
        }
    }
}

impl RecordParser for DelimitedParser {
    fn parse(&self, line: &str) -> Result<Option<Record>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let fields = self.split(line);
        if fields.len() != FIELD_COUNT {
            return Err(ParseError::FieldCount {
                found: fields.len(),
            });
        }

        Ok(Some(Record::Frame(FrameValues {
            mic: whole_field(volt, fields[0], Channel::Mic)?,
            x: whole_field(raw, fields[1], Channel::X)?,
            y: whole_field(raw, fields[2], Channel::Y)?,
            z: whole_field(raw, fields[3], Channel::Z)?,
        })))
    }

    fn format(&self) -> WireFormat {
        WireFormat::Delimited
    }
}

fn decimal(s: &str) -> IResult<&str, &str> {
    recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit0)),
    )))(s)
}

fn integer(s: &str) -> IResult<&str, &str> {
    recognize(pair(opt(char('-')), digit1))(s)
}

/// Skip ahead to the first place `pattern` matches and return what it matched.
fn first_match<'a>(
    text: &'a str,
    pattern: fn(&'a str) -> IResult<&'a str, &'a str>,
) -> Option<&'a str> {
    let found: IResult<&str, (Vec<char>, &str)> = many_till(anychar, pattern)(text);
    found.ok().map(|(_, (_, matched))| matched)
}

/// Parser for lines like `Voltage: 1.50 V` or `X_raw = 2048`.
///
/// The markers are tried in the order `Voltage`, `X_raw`, `Y_raw`, `Z_raw`
/// and the first one present decides the field, so a line never updates
/// more than one value. The voltage is the first decimal number anywhere
/// on the line; an axis value is the first integer after its marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedParser;

impl RecordParser for TaggedParser {
    fn parse(&self, line: &str) -> Result<Option<Record>, ParseError> {
        let line = line.trim();
        let Some((channel, at)) = Channel::ALL
            .iter()
            .find_map(|&c| line.find(c.marker()).map(|at| (c, at)))
        else {
            return Ok(None);
        };

        let update = match channel {
            Channel::Mic => {
                let text = first_match(line, decimal).ok_or(ParseError::MissingValue { channel })?;
                let value: Volt = text
                    .parse()
                    .ok()
                    .filter(|v: &f64| v.is_finite())
                    .ok_or_else(|| ParseError::BadNumber {
                        channel,
                        text: text.to_owned(),
                    })?;
                FieldUpdate::Mic(value)
            }
            _ => {
                let after = &line[at + channel.marker().len()..];
                let text = first_match(after, integer).ok_or(ParseError::MissingValue { channel })?;
                let value: Raw = text.parse().map_err(|_| ParseError::BadNumber {
                    channel,
                    text: text.to_owned(),
                })?;
                match channel {
                    Channel::X => FieldUpdate::X(value),
                    Channel::Y => FieldUpdate::Y(value),
                    _ => FieldUpdate::Z(value),
                }
            }
        };

        Ok(Some(Record::Field(update)))
    }

    fn format(&self) -> WireFormat {
        WireFormat::Tagged
    }
}
