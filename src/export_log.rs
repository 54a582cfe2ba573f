//! Every sample recorded this session, kept in arrival order until it is
//! exported as CSV or cleared.
//!
//! The exported file looks like:
//!
//! ```text
//! time,micV,x,y,z
//! 1700000000000,1.5,10,20,30
//! 1700000000004,0.8,11,21,31
//! ```

use crate::sample::Sample;

use std::{
    borrow::Cow,
    fmt::{self, Write as _},
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

/// Header row of the exported table.
pub const CSV_HEADER: &str = "time,micV,x,y,z";

/// File name offered for exports when none is configured.
pub const DEFAULT_EXPORT_FILE: &str = "esp32_data.csv";

/// Returned when an export cannot be produced.
#[derive(Debug)]
pub enum ExportError {
    /// Nothing has been recorded yet, so there is nothing to write.
    NoData,

    /// Writing the file failed.
    IoError(io::Error),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ExportError::NoData => Cow::from("no data to export"),
            ExportError::IoError(error) => Cow::from(format!("io error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ExportError {}

impl From<io::Error> for ExportError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

/// Append-only record of completed samples.
#[derive(Debug, Clone, Default)]
pub struct ExportLog {
    samples: Vec<Sample>,
}

impl ExportLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `sample` after everything recorded so far.
    pub fn append(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Number of recorded samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True before anything has been recorded (or after a clear).
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Recorded samples in arrival order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Forget everything recorded so far.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Render the log as CSV text.
    pub fn serialize(&self) -> Result<String, ExportError> {
        if self.samples.is_empty() {
            return Err(ExportError::NoData);
        }

        let mut csv = String::with_capacity(CSV_HEADER.len() + 1 + self.samples.len() * 32);
        csv.push_str(CSV_HEADER);
        csv.push('\n');
        for s in &self.samples {
            // writing into a String cannot fail
            let _ = writeln!(csv, "{},{},{},{},{}", s.timestamp, s.mic, s.x, s.y, s.z);
        }
        Ok(csv)
    }

    /// Write the CSV to `out`. Nothing is written when the log is empty.
    pub fn write_to(&self, out: &mut impl Write) -> Result<(), ExportError> {
        let csv = self.serialize()?;
        out.write_all(csv.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Write the CSV to a file at `path`. When the log is empty the file is
    /// not created at all.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let csv = self.serialize()?;
        let mut handle = BufWriter::new(File::create(path)?);
        handle.write_all(csv.as_bytes())?;
        handle.flush()?;
        Ok(())
    }
}
