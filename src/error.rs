//! Custom error types for the application.
//!
//! `CollectError` consolidates the failure sources of the capture pipeline
//! behind one enum: configuration loading, file I/O, image encoding,
//! calibration parsing and driver faults. The job queue itself contributes no
//! variants; its two outcome signals (a `false` push and a `None` pop) are
//! ordinary values, not errors.

use thiserror::Error;

use crate::calibration::CalibrationError;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, CollectError>;

/// Primary error type for the capture application.
#[derive(Error, Debug)]
pub enum CollectError {
    /// Configuration file could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// File or directory I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Calibration file could not be read or written.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// Image encoding failed.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The hardware driver reported a fault.
    #[error("Driver error: {0}")]
    Driver(String),

    /// A frame payload did not match its declared geometry.
    #[error("Frame geometry error: {0}")]
    Frame(String),
}
