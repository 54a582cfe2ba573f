//! Session settings. They can come from a [RON](ron) file, e.g.
//!
//! ```text
//! (
//!     baud_rate: 115200,
//!     buffer_len: 400,
//!     format: Tagged,
//! )
//! ```
//!
//! Any field left out takes its default. Settings are fixed once a session
//! starts.

use crate::export_log::DEFAULT_EXPORT_FILE;
use crate::frame_assembler::DuplicatePolicy;
use crate::record_parser::WireFormat;
use crate::scope_buffers::DEFAULT_BUFFER_LEN;

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, fs, io, path::Path, path::PathBuf};

/// Baud rates the firmware can be set to.
pub const SUPPORTED_BAUD_RATES: [u32; 8] =
    [9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

/// Baud rate used when none is configured.
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Everything needed to start a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Serial line speed, one of [`SUPPORTED_BAUD_RATES`]
    pub baud_rate: u32,
    /// Samples kept per channel for display
    pub buffer_len: usize,
    /// Line format the firmware emits
    pub format: WireFormat,
    /// Field separator for [`WireFormat::Delimited`]
    pub separator: char,
    /// How a repeated tagged field is handled before its frame completes
    pub duplicate_policy: DuplicatePolicy,
    /// Where exports are written
    pub export_path: PathBuf,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            buffer_len: DEFAULT_BUFFER_LEN,
            format: WireFormat::default(),
            separator: ',',
            duplicate_policy: DuplicatePolicy::default(),
            export_path: PathBuf::from(DEFAULT_EXPORT_FILE),
        }
    }
}

/// Problems loading or validating a [`ScopeConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    IoError(io::Error),

    /// The config file is not valid RON for a [`ScopeConfig`].
    RonSpannedError(ron::de::SpannedError),

    /// `buffer_len` was zero.
    InvalidBufferLength,

    /// `baud_rate` is not one of [`SUPPORTED_BAUD_RATES`].
    UnsupportedBaudRate(u32),

    /// The separator would be confused with whitespace or part of a number.
    InvalidSeparator(char),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ConfigError as CE;
        let msg = match self {
            CE::IoError(error) => Cow::from(format!("io error: {}", error)),
            CE::RonSpannedError(error) => Cow::from(format!("ron error: {}", error)),
            CE::InvalidBufferLength => Cow::from("buffer length must be at least 1"),
            CE::UnsupportedBaudRate(rate) => Cow::from(format!(
                "unsupported baud rate {}, pick one of {:?}",
                rate, SUPPORTED_BAUD_RATES
            )),
            CE::InvalidSeparator(c) => Cow::from(format!("{:?} cannot separate fields", c)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<ron::de::SpannedError> for ConfigError {
    fn from(value: ron::de::SpannedError) -> Self {
        Self::RonSpannedError(value)
    }
}

impl ScopeConfig {
    /// Read and validate a config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Parse and validate RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: ScopeConfig = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings make sense together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_len == 0 {
            return Err(ConfigError::InvalidBufferLength);
        }
        if !SUPPORTED_BAUD_RATES.contains(&self.baud_rate) {
            return Err(ConfigError::UnsupportedBaudRate(self.baud_rate));
        }
        let sep = self.separator;
        if sep.is_whitespace() || sep.is_ascii_digit() || matches!(sep, '.' | '-' | '+') {
            return Err(ConfigError::InvalidSeparator(sep));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ScopeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_len, 400);
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.export_path, PathBuf::from("esp32_data.csv"));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config = ScopeConfig::from_ron("(baud_rate: 9600, format: Tagged)").unwrap();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.format, WireFormat::Tagged);
        assert_eq!(config.separator, ',');
        assert_eq!(config.duplicate_policy, DuplicatePolicy::LastWriteWins);
    }

    #[test]
    fn full_file() {
        let text = r#"(
            baud_rate: 921600,
            buffer_len: 1000,
            format: Delimited,
            separator: ';',
            duplicate_policy: KeepFirst,
            export_path: "run.csv",
        )"#;
        let config = ScopeConfig::from_ron(text).unwrap();
        assert_eq!(config.buffer_len, 1000);
        assert_eq!(config.separator, ';');
        assert_eq!(config.duplicate_policy, DuplicatePolicy::KeepFirst);
        assert_eq!(config.export_path, PathBuf::from("run.csv"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ScopeConfig::from_ron("(buffer_len: 0)"),
            Err(ConfigError::InvalidBufferLength)
        ));
        assert!(matches!(
            ScopeConfig::from_ron("(baud_rate: 1234)"),
            Err(ConfigError::UnsupportedBaudRate(1234))
        ));
        assert!(matches!(
            ScopeConfig::from_ron("(separator: '.')"),
            Err(ConfigError::InvalidSeparator('.'))
        ));
        assert!(matches!(
            ScopeConfig::from_ron("(format: Binary)"),
            Err(ConfigError::RonSpannedError(_))
        ));
    }

    #[test]
    fn from_path_reads_file() {
        let tempfile = tempfile::NamedTempFile::new().unwrap();
        fs::write(tempfile.path(), "(buffer_len: 64)").unwrap();
        let config = ScopeConfig::from_path(tempfile.path()).unwrap();
        assert_eq!(config.buffer_len, 64);
        assert!(matches!(
            ScopeConfig::from_path("/definitely/not/here.ron"),
            Err(ConfigError::IoError(_))
        ));
    }
}
