//! Measurement data model.
//!
//! Types that flow between the driver, the worker and the Touchstone codec:
//!
//! - [`SweepConfig`]: what the caller asks the instrument to do
//! - [`TriggerState`]: the instrument's trigger mode, saved and restored around a sweep
//! - [`InstrumentParams`]: settings read back from the instrument
//! - [`MeasurementResult`]: frequency axis plus an [`SParameterSet`]

pub mod sparams;
pub mod sweep;

pub use sparams::{MeasurementResult, SParameter, SParameterSet, Trace, LOG_EPSILON};
pub use sweep::{InstrumentParams, SweepConfig, TriggerSource, TriggerState};
