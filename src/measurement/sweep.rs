//! Sweep configuration and instrument trigger state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-requested sweep settings.
///
/// The `override_*` flags decide whether a field is ever written to the
/// instrument. An unset flag leaves the instrument's own value in place.
/// Values are not range-checked here; the instrument rejects what it cannot do.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Start frequency in Hz
    pub start_freq_hz: f64,
    /// Stop frequency in Hz
    pub stop_freq_hz: f64,
    /// Number of sweep points
    pub points: u32,
    /// Averaging on/off (always written)
    pub enable_averaging: bool,
    /// Averaging factor
    pub averaging_count: u32,
    /// Write start/stop frequency
    pub override_freq_range: bool,
    /// Write sweep points
    pub override_points: bool,
    /// Write averaging count
    pub override_averaging_count: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start_freq_hz: 1e6,
            stop_freq_hz: 1100e6,
            points: 601,
            enable_averaging: false,
            averaging_count: 16,
            override_freq_range: false,
            override_points: true,
            override_averaging_count: false,
        }
    }
}

/// Trigger source of the analyzer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSource {
    /// Free-running internal trigger
    Internal,
    /// Front-panel trigger key
    Manual,
    /// Rear-panel trigger input
    External,
    /// Remote (`*TRG`/`INIT`) trigger
    Bus,
}

impl TriggerSource {
    /// SCPI mnemonic.
    pub fn as_scpi(self) -> &'static str {
        match self {
            Self::Internal => "INT",
            Self::Manual => "MAN",
            Self::External => "EXT",
            Self::Bus => "BUS",
        }
    }

    /// Parses a `TRIG:SOUR?` response. Long forms ("INTernal") are accepted.
    pub fn from_scpi(response: &str) -> Option<Self> {
        let upper = response.trim().to_ascii_uppercase();
        match upper.get(..3)? {
            "INT" => Some(Self::Internal),
            "MAN" => Some(Self::Manual),
            "EXT" => Some(Self::External),
            "BUS" => Some(Self::Bus),
            _ => None,
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_scpi())
    }
}

/// Trigger configuration captured before a sweep and restored after the reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerState {
    /// Trigger source
    pub source: TriggerSource,
    /// `INIT1:CONT` state
    pub continuous: bool,
}

/// Settings read back from the instrument by READ_PARAMS.
///
/// Each field is queried on its own; `None` means that query failed or did not parse.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentParams {
    /// Start frequency in Hz
    pub start_freq_hz: Option<f64>,
    /// Stop frequency in Hz
    pub stop_freq_hz: Option<f64>,
    /// Sweep points
    pub points: Option<u32>,
    /// Averaging state
    pub averaging_enabled: Option<bool>,
    /// Averaging factor
    pub averaging_count: Option<u32>,
}

/// Parses SCPI boolean responses ("1", "0", "ON", "OFF").
pub(crate) fn parse_scpi_bool(response: &str) -> Option<bool> {
    match response.trim().to_ascii_uppercase().as_str() {
        "1" | "+1" | "ON" => Some(true),
        "0" | "+0" | "OFF" => Some(false),
        _ => None,
    }
}

/// Parses SCPI integer responses, tolerating a float rendering ("+6.01E+02").
pub(crate) fn parse_scpi_u32(response: &str) -> Option<u32> {
    let trimmed = response.trim();
    trimmed.parse::<u32>().ok().or_else(|| {
        let value = trimmed.parse::<f64>().ok()?;
        (value >= 0.0 && value <= f64::from(u32::MAX) && value.fract() == 0.0)
            .then_some(value as u32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sweep_config() {
        let config = SweepConfig::default();
        assert_eq!(config.points, 601);
        assert!(!config.override_freq_range);
        assert!(config.override_points);
        assert!(!config.override_averaging_count);
    }

    #[test]
    fn test_trigger_source_parsing() {
        assert_eq!(TriggerSource::from_scpi("INT\n"), Some(TriggerSource::Internal));
        assert_eq!(TriggerSource::from_scpi("bus"), Some(TriggerSource::Bus));
        assert_eq!(TriggerSource::from_scpi("EXTernal"), Some(TriggerSource::External));
        assert_eq!(TriggerSource::from_scpi("MAN"), Some(TriggerSource::Manual));
        assert_eq!(TriggerSource::from_scpi("X"), None);
        assert_eq!(TriggerSource::from_scpi(""), None);
    }

    #[test]
    fn test_scpi_value_parsing() {
        assert_eq!(parse_scpi_bool("ON"), Some(true));
        assert_eq!(parse_scpi_bool("0\n"), Some(false));
        assert_eq!(parse_scpi_bool("maybe"), None);
        assert_eq!(parse_scpi_u32("+601"), Some(601));
        assert_eq!(parse_scpi_u32("+6.01E+02"), Some(601));
        assert_eq!(parse_scpi_u32("-1"), None);
    }

    #[test]
    fn test_sweep_config_partial_deserialize() {
        let config: SweepConfig = toml::from_str("points = 201\noverride_freq_range = true").unwrap();
        assert_eq!(config.points, 201);
        assert!(config.override_freq_range);
        assert_eq!(config.averaging_count, 16);
    }
}
