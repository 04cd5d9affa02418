//! S-parameter traces and sweep results.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Added to |z| before taking log10 so an exact null maps to a finite dB value.
pub const LOG_EPSILON: f64 = 1e-15;

/// One of the four two-port scattering parameters.
///
/// The declaration order is the canonical Touchstone column order
/// (S11, S21, S12, S22), and `Ord` follows it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SParameter {
    /// Port 1 reflection
    S11,
    /// Forward transmission
    S21,
    /// Reverse transmission
    S12,
    /// Port 2 reflection
    S22,
}

impl SParameter {
    /// All parameters in canonical order.
    pub const ALL: [SParameter; 4] = [Self::S11, Self::S21, Self::S12, Self::S22];

    /// Instrument trace index (1-based) this parameter is measured on.
    pub fn trace_index(self) -> u8 {
        match self {
            Self::S11 => 1,
            Self::S21 => 2,
            Self::S12 => 3,
            Self::S22 => 4,
        }
    }

    /// Parameter name as used in SCPI and Touchstone ("S11", ...).
    pub fn name(self) -> &'static str {
        match self {
            Self::S11 => "S11",
            Self::S21 => "S21",
            Self::S12 => "S12",
            Self::S22 => "S22",
        }
    }
}

impl fmt::Display for SParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SParameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "S11" => Ok(Self::S11),
            "S21" => Ok(Self::S21),
            "S12" => Ok(Self::S12),
            "S22" => Ok(Self::S22),
            other => Err(format!(
                "Unknown S-parameter '{}'. Must be one of: S11, S21, S12, S22",
                other
            )),
        }
    }
}

/// Magnitude/phase arrays for one parameter, index-aligned with the frequency axis.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Magnitude in dB
    pub magnitude_db: Vec<f64>,
    /// Phase in degrees
    pub phase_deg: Vec<f64>,
}

impl Trace {
    /// Creates a trace from already converted arrays.
    pub fn new(magnitude_db: Vec<f64>, phase_deg: Vec<f64>) -> Self {
        Self {
            magnitude_db,
            phase_deg,
        }
    }

    /// Converts interleaved `re, im, re, im, ...` values into dB magnitude and
    /// degree phase. A dangling final value is ignored.
    pub fn from_interleaved_complex(values: &[f64]) -> Self {
        let (magnitude_db, phase_deg) = values
            .chunks_exact(2)
            .map(|pair| {
                let z = Complex64::new(pair[0], pair[1]);
                (
                    20.0 * (z.norm() + LOG_EPSILON).log10(),
                    z.arg().to_degrees(),
                )
            })
            .unzip();

        Self {
            magnitude_db,
            phase_deg,
        }
    }

    /// Number of points, or `None` when magnitude and phase disagree.
    pub fn consistent_len(&self) -> Option<usize> {
        (self.magnitude_db.len() == self.phase_deg.len()).then_some(self.magnitude_db.len())
    }

    /// Number of magnitude points.
    pub fn len(&self) -> usize {
        self.magnitude_db.len()
    }

    /// Returns true if the trace holds no points.
    pub fn is_empty(&self) -> bool {
        self.magnitude_db.is_empty()
    }
}

/// Traces keyed by parameter, iterated in canonical order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SParameterSet(BTreeMap<SParameter, Trace>);

impl SParameterSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a trace.
    pub fn insert(&mut self, parameter: SParameter, trace: Trace) -> Option<Trace> {
        self.0.insert(parameter, trace)
    }

    /// Returns the trace for `parameter`, if present.
    pub fn get(&self, parameter: SParameter) -> Option<&Trace> {
        self.0.get(&parameter)
    }

    /// Returns true if `parameter` is present.
    pub fn contains(&self, parameter: SParameter) -> bool {
        self.0.contains_key(&parameter)
    }

    /// Iterates traces in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (SParameter, &Trace)> {
        self.0.iter().map(|(p, t)| (*p, t))
    }

    /// Parameters present, in canonical order.
    pub fn parameters(&self) -> Vec<SParameter> {
        self.0.keys().copied().collect()
    }

    /// Number of traces.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no trace is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy restricted to `selection`. Parameters not present are skipped.
    pub fn subset(&self, selection: &[SParameter]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(p, _)| selection.contains(p))
                .map(|(p, t)| (*p, t.clone()))
                .collect(),
        )
    }
}

impl FromIterator<(SParameter, Trace)> for SParameterSet {
    fn from_iter<I: IntoIterator<Item = (SParameter, Trace)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Frequency axis plus S-parameters of one completed sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    /// Frequencies in Hz, ascending for a linear sweep
    pub frequencies_hz: Vec<f64>,
    /// Traces sharing the frequency axis
    pub sparams: SParameterSet,
}

impl MeasurementResult {
    /// Bundles an axis and its traces.
    pub fn new(frequencies_hz: Vec<f64>, sparams: SParameterSet) -> Self {
        Self {
            frequencies_hz,
            sparams,
        }
    }

    /// Number of frequency points.
    pub fn points(&self) -> usize {
        self.frequencies_hz.len()
    }

    /// First and last frequency, if any.
    pub fn span_hz(&self) -> Option<(f64, f64)> {
        Some((*self.frequencies_hz.first()?, *self.frequencies_hz.last()?))
    }
}
