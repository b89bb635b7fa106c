//! Error types shared by every layer of the library.
//!
//! Failures from external tools are classified into one of these kinds by the
//! [`ToolAdapter`](crate::adapter::ToolAdapter) before they reach the device
//! handle or the automation facade, so callers can match on them selectively.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by device and automation operations.
#[derive(Error, Debug)]
pub enum IosError {
    /// No attached device matches the request (or none are attached at all).
    #[error("{0}")]
    DeviceNotFound(String),

    /// Communication with an identified device failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The device refused the host (not paired, not trusted, or locked).
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// No installed backend implements the requested capability.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// An input path does not resolve to an existing file of the expected
    /// kind (for installs, an `.ipa` archive or `.app` bundle).
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The bundle identifier is not installed on the device.
    #[error("App not installed: {0}")]
    AppNotFound(String),

    /// No element in the current UI hierarchy matched the text.
    #[error("Element with text '{0}' not found")]
    ElementNotFound(String),

    /// Backend output could not be interpreted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A local I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IosError {
    pub(crate) fn not_connected() -> Self {
        IosError::Connection("Device not connected".to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IosError>;
