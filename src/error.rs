//! Custom error types for the application.
//!
//! This module defines the primary error type, `VnaError`, used by drivers and the
//! measurement worker, and `TouchstoneError` for the file codec.
//!
//! ## Error Hierarchy
//!
//! `VnaError` consolidates the failure modes of an instrument session:
//!
//! - **`Configuration`**: missing or invalid address fields. Raised before anything
//!   is sent to the instrument.
//! - **`HostUnreachable`**: the pre-flight TCP probe found nothing listening. Fast and local.
//! - **`ConnectionFailed`**: the host answered the probe but the VISA handshake or
//!   `*IDN?` failed.
//! - **`SweepTimeout`**: `*OPC?` never reported completion within the configured bound.
//! - **`NotConnected`**: an operation was attempted on a driver without a session.
//! - **`InvalidResponse`**: the instrument answered with something that cannot be parsed
//!   or that breaks the shape of a measurement.
//! - **`Transport`**: wraps I/O failures reported by the transport adapter.
//! - **`Touchstone`**: wraps codec validation failures.
//! - **`Io`**: local file system failures outside the codec.
//!
//! By using `#[from]`, `VnaError` can be created from the transport's `anyhow::Error`
//! and from `TouchstoneError`, so the `?` operator works across layers.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type VnaResult<T> = std::result::Result<T, VnaError>;

/// Errors raised by drivers, the registry and the measurement worker.
#[derive(Error, Debug)]
pub enum VnaError {
    /// Address or settings are incomplete. Never reaches the instrument.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Pre-flight reachability probe failed.
    #[error("Host {host} not reachable")]
    HostUnreachable {
        /// Host that was probed
        host: String,
    },

    /// Handshake failed on a reachable host.
    #[error("Handshake failed: {0}")]
    ConnectionFailed(String),

    /// Operation-complete poll exceeded its bound.
    #[error("Operation did not complete within {0:?}")]
    SweepTimeout(Duration),

    /// Driver has no active session.
    #[error("Not connected to VNA")]
    NotConnected,

    /// Response could not be interpreted.
    #[error("Invalid instrument response: {0}")]
    InvalidResponse(String),

    /// Failure reported by the transport adapter.
    #[error("Transport error: {0:#}")]
    Transport(#[from] anyhow::Error),

    /// Touchstone codec failure.
    #[error(transparent)]
    Touchstone(#[from] TouchstoneError),

    /// Local file system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while encoding or decoding Touchstone files.
#[derive(Error, Debug)]
pub enum TouchstoneError {
    /// A trace does not line up with the frequency axis.
    #[error(
        "S-parameter {parameter} data length mismatch with frequencies \
         (expected {expected}, magnitude {magnitude}, phase {phase})"
    )]
    LengthMismatch {
        /// Offending parameter name
        parameter: String,
        /// Length of the frequency axis
        expected: usize,
        /// Length of the magnitude array
        magnitude: usize,
        /// Length of the phase array
        phase: usize,
    },

    /// Nothing to export.
    #[error("No valid S-parameters provided for export")]
    NoParameters,

    /// No parsable data line in the input.
    #[error("No valid data found in file")]
    NoData,

    /// Reading or writing the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
