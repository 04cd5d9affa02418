//! Message types for worker-based communication
//!
//! This module defines the command and response types exchanged between the
//! caller (GUI, CLI) and the [`MeasurementWorker`](crate::worker::MeasurementWorker).
//! Commands travel on one unbounded queue, responses on another. For every
//! command the worker emits any number of [`WorkerResponse::Progress`] and
//! [`WorkerResponse::Log`] messages followed by exactly one terminal response.

use crate::instrument::InstrumentAddress;
use crate::measurement::{InstrumentParams, MeasurementResult, SweepConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag shared by commands and responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Command: open a session
    Connect,
    /// Command: close the session
    Disconnect,
    /// Command: read current instrument settings
    ReadParams,
    /// Command: run a sweep
    Measure,
    /// Command: stop the worker
    Shutdown,
    /// Response: session open
    Connected,
    /// Response: session closed
    Disconnected,
    /// Response: settings read
    ParamsRead,
    /// Response: sweep finished
    MeasurementComplete,
    /// Response: command failed
    Error,
    /// Response: intermediate progress
    Progress,
    /// Response: instrument traffic or info line
    Log,
}

impl MessageKind {
    /// Returns true for responses that end the handling of a command.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Connected
                | Self::Disconnected
                | Self::ParamsRead
                | Self::MeasurementComplete
                | Self::Error
        )
    }
}

/// Commands that can be sent to the worker
#[derive(Clone, Debug)]
pub enum WorkerCommand {
    /// Connect to the instrument at the given address
    Connect(InstrumentAddress),

    /// Disconnect from the instrument
    Disconnect,

    /// Query current sweep settings without changing them
    ReadParams,

    /// Configure and run one sweep, read all four S-parameters
    Measure(SweepConfig),

    /// Disconnect if needed and terminate the worker loop
    Shutdown,
}

impl WorkerCommand {
    /// Type tag of this command.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Connect(_) => MessageKind::Connect,
            Self::Disconnect => MessageKind::Disconnect,
            Self::ReadParams => MessageKind::ReadParams,
            Self::Measure(_) => MessageKind::Measure,
            Self::Shutdown => MessageKind::Shutdown,
        }
    }
}

/// Progress update data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Human-readable step description
    pub message: String,
    /// Completion estimate, 0-100
    pub percent: f64,
}

/// Origin of a log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogDirection {
    /// Sent to the instrument
    Tx,
    /// Received from the instrument
    Rx,
    /// Worker information
    Info,
    /// Worker diagnostics
    Debug,
}

impl fmt::Display for LogDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tx => "tx",
            Self::Rx => "rx",
            Self::Info => "info",
            Self::Debug => "debug",
        })
    }
}

/// Log message data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Where the line came from
    pub direction: LogDirection,
    /// Line content
    pub message: String,
}

impl LogEntry {
    /// Creates a log entry.
    pub fn new(direction: LogDirection, message: impl Into<String>) -> Self {
        Self {
            direction,
            message: message.into(),
        }
    }
}

/// Responses emitted by the worker
#[derive(Clone, Debug)]
pub enum WorkerResponse {
    /// Session open; payload is `"<idn> [<driver name>]"`
    Connected(String),

    /// Session closed
    Disconnected,

    /// Current instrument settings
    ParamsRead(InstrumentParams),

    /// Completed sweep
    MeasurementComplete(Box<MeasurementResult>),

    /// Command failed; payload is a human-readable message
    Error(String),

    /// Intermediate progress of the current command
    Progress(ProgressUpdate),

    /// Instrument traffic or worker information
    Log(LogEntry),
}

impl WorkerResponse {
    /// Type tag of this response.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Connected(_) => MessageKind::Connected,
            Self::Disconnected => MessageKind::Disconnected,
            Self::ParamsRead(_) => MessageKind::ParamsRead,
            Self::MeasurementComplete(_) => MessageKind::MeasurementComplete,
            Self::Error(_) => MessageKind::Error,
            Self::Progress(_) => MessageKind::Progress,
            Self::Log(_) => MessageKind::Log,
        }
    }

    /// Returns true if this response ends the current command.
    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    /// Error text for [`WorkerResponse::Error`], `None` otherwise.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Helper to create a progress response
    pub fn progress(message: impl Into<String>, percent: f64) -> Self {
        Self::Progress(ProgressUpdate {
            message: message.into(),
            percent,
        })
    }

    /// Helper to create a log response
    pub fn log(direction: LogDirection, message: impl Into<String>) -> Self {
        Self::Log(LogEntry::new(direction, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_kinds() {
        assert!(WorkerResponse::Disconnected.is_terminal());
        assert!(WorkerResponse::Error("x".into()).is_terminal());
        assert!(!WorkerResponse::progress("Connecting...", 10.0).is_terminal());
        assert!(!WorkerResponse::log(LogDirection::Tx, "*IDN?").is_terminal());
        assert!(!MessageKind::Measure.is_terminal());
    }

    #[test]
    fn test_error_accessor() {
        let response = WorkerResponse::Error("Measurement failed: timeout".into());
        assert_eq!(response.error(), Some("Measurement failed: timeout"));
        assert_eq!(WorkerResponse::Disconnected.error(), None);
    }

    #[test]
    fn test_command_kind() {
        assert_eq!(WorkerCommand::ReadParams.kind(), MessageKind::ReadParams);
        assert_eq!(
            WorkerCommand::Measure(SweepConfig::default()).kind(),
            MessageKind::Measure
        );
    }
}
