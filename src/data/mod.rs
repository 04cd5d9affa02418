//! Measurement persistence.

pub mod touchstone;

pub use touchstone::{decode, encode, export, import_file, FrequencyUnit, TouchstoneOptions};
