//! Core library for the vna_daq application.
//!
//! Controls a vector network analyzer over VISA/SCPI, runs S-parameter sweeps
//! and stores the results as Touchstone (`.s2p`) files.
//!
//! - [`adapters`]: SCPI transports (VISA, raw socket, traffic logging, simulation)
//! - [`instrument`]: the driver trait, the HP E5071B driver and the driver registry
//! - [`worker`]: background task serializing commands against one driver
//! - [`data`]: Touchstone codec
//! - [`config`]: layered settings for the `vna_measure` runner

pub mod adapters;
pub mod config;
pub mod data;
pub mod error;
pub mod instrument;
pub mod measurement;
pub mod messages;
pub mod worker;

pub use error::{TouchstoneError, VnaError, VnaResult};
pub use worker::MeasurementWorker;
