// Commandline argument parser using clap for sensorscope

use crate::config::{ConfigError, ScopeConfig};
use crate::frame_assembler::DuplicatePolicy;
use crate::record_parser::WireFormat;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct ScopeArgs {
    #[command(subcommand)]
    /// Watch the signals live, or record them headless
    pub command: CommandTask,

    /// RON file with session settings; flags below override it
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Serial line speed, e.g. 115200
    #[arg(short = 'b', long = "baud", global = true)]
    pub baud_rate: Option<u32>,

    /// Number of samples kept on screen per channel
    #[arg(short = 'n', long = "buffer-len", global = true)]
    pub buffer_len: Option<usize>,

    /// Line format the firmware prints
    #[arg(short = 'f', long = "format", value_enum, global = true)]
    pub format: Option<WireFormat>,

    /// Field separator for the delimited format
    #[arg(short = 's', long = "separator", global = true)]
    pub separator: Option<char>,

    /// In the tagged format, keep the first of two values for the same field
    #[arg(long = "keep-first", global = true)]
    pub keep_first: bool,

    /// Where to write the CSV export
    #[arg(short = 'o', long = "export", global = true)]
    pub export_path: Option<PathBuf>,
}

/// Where the data comes from. At most one may be given.
#[derive(Debug, Args, Clone)]
#[group(multiple = false)]
pub struct SourceArgs {
    /// Serial device the board is attached to, e.g. /dev/ttyUSB0
    #[arg(short = 'p', long = "port")]
    pub port: Option<PathBuf>,

    /// Replay a captured stream from a file, `-` for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Use a built-in simulated board
    #[arg(long = "simulate")]
    pub simulate: bool,
}

/// The resolved choice of [`SourceArgs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Port(PathBuf),
    Input(PathBuf),
    Simulate,
    /// Nothing given, the user has to pick a port
    Unspecified,
}

impl SourceArgs {
    pub fn source(&self) -> Source {
        if let Some(port) = &self.port {
            Source::Port(port.clone())
        } else if let Some(input) = &self.input {
            Source::Input(input.clone())
        } else if self.simulate {
            Source::Simulate
        } else {
            Source::Unspecified
        }
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Live oscilloscope in the terminal
    #[command(about)]
    Monitor(MonitorCommand),

    /// Record without a display, then export to CSV
    #[command(about)]
    Record(RecordCommand),
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct MonitorCommand {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct RecordCommand {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Stop after this many samples
    #[arg(long = "samples")]
    pub samples: Option<u64>,

    /// Stop after this many seconds
    #[arg(long = "seconds")]
    pub seconds: Option<f64>,
}

impl CommandTask {
    pub fn source(&self) -> Source {
        match self {
            CommandTask::Monitor(cmd) => cmd.source.source(),
            CommandTask::Record(cmd) => cmd.source.source(),
        }
    }
}

impl ScopeArgs {
    /// The config file (or the defaults) with any flags applied on top,
    /// validated.
    pub fn resolve_config(&self) -> Result<ScopeConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ScopeConfig::from_path(path)?,
            None => ScopeConfig::default(),
        };

        if let Some(baud_rate) = self.baud_rate {
            config.baud_rate = baud_rate;
        }
        if let Some(buffer_len) = self.buffer_len {
            config.buffer_len = buffer_len;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(separator) = self.separator {
            config.separator = separator;
        }
        if self.keep_first {
            config.duplicate_policy = DuplicatePolicy::KeepFirst;
        }
        if let Some(export_path) = &self.export_path {
            config.export_path = export_path.clone();
        }

        config.validate()?;
        Ok(config)
    }
}
