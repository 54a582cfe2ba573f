use std::{error::Error, fmt::Display};

use crate::transport::TransportError;

/// Failures while driving the terminal or opening the picked device.
#[derive(Debug)]
pub enum ScopeGuiError {
    /// The terminal could not be set up or drawn to
    IOError(std::io::Error),
    /// Listing or opening serial devices failed
    TransportError(TransportError),
}

impl Display for ScopeGuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScopeGuiError::IOError(e) => write!(f, "terminal error: {}", e),
            ScopeGuiError::TransportError(e) => write!(f, "{}", e),
        }
    }
}

impl Error for ScopeGuiError {}

impl From<std::io::Error> for ScopeGuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<TransportError> for ScopeGuiError {
    fn from(value: TransportError) -> Self {
        Self::TransportError(value)
    }
}
