//! Touchstone (.s2p) encoding and decoding.
//!
//! Files are written in dB/angle form:
//!
//! ```text
//! ! HP E5071B S-Parameter Data
//! ! Date: 2024-05-01 14:03:12
//! ! Frequency Range: 1.000 - 1100.000 MHz
//! ! Points: 601
//! !
//! # MHz S DB R 50.0
//! 1.000000  -0.012345  -1.234567  -45.678901  12.345678 ...
//! ```
//!
//! Each data line holds the frequency followed by magnitude/phase pairs for
//! the exported parameters in canonical order (S11, S21, S12, S22). Decoding
//! is positional: the first pair is read back as S11, the second as S21 and
//! so on, so a file holding only S21 decodes as S11.

use crate::error::TouchstoneError;
use crate::measurement::{MeasurementResult, SParameter, SParameterSet, Trace};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// File extension for two-port Touchstone files.
pub const S2P_EXTENSION: &str = "s2p";

/// Header title written by default.
pub const DEFAULT_TITLE: &str = "HP E5071B S-Parameter Data";

/// Frequency unit of the option line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FrequencyUnit {
    /// Hertz
    Hz,
    /// Kilohertz
    KHz,
    /// Megahertz
    #[default]
    MHz,
    /// Gigahertz
    GHz,
}

impl FrequencyUnit {
    /// All units, smallest first.
    pub const ALL: [FrequencyUnit; 4] = [Self::Hz, Self::KHz, Self::MHz, Self::GHz];

    /// Hz per unit.
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Hz => 1.0,
            Self::KHz => 1e3,
            Self::MHz => 1e6,
            Self::GHz => 1e9,
        }
    }

    /// Spelling used in files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hz => "Hz",
            Self::KHz => "kHz",
            Self::MHz => "MHz",
            Self::GHz => "GHz",
        }
    }
}

impl fmt::Display for FrequencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrequencyUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|unit| unit.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "Invalid frequency unit '{}'. Must be one of: Hz, kHz, MHz, GHz",
                    s
                )
            })
    }
}

impl TryFrom<String> for FrequencyUnit {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FrequencyUnit> for String {
    fn from(unit: FrequencyUnit) -> Self {
        unit.as_str().to_string()
    }
}

/// Encoding options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchstoneOptions {
    /// Unit of the frequency column
    pub freq_unit: FrequencyUnit,
    /// Reference impedance in ohms
    pub reference_impedance: f64,
    /// First header comment
    pub title: String,
}

impl Default for TouchstoneOptions {
    fn default() -> Self {
        Self {
            freq_unit: FrequencyUnit::MHz,
            reference_impedance: 50.0,
            title: DEFAULT_TITLE.to_string(),
        }
    }
}

/// Render `sparams` over `frequencies_hz` as Touchstone text.
///
/// Every trace must match the frequency axis length. Parameters are written
/// in canonical order; absent ones are left out.
pub fn encode(
    frequencies_hz: &[f64],
    sparams: &SParameterSet,
    options: &TouchstoneOptions,
) -> Result<String, TouchstoneError> {
    for (parameter, trace) in sparams.iter() {
        if trace.magnitude_db.len() != frequencies_hz.len()
            || trace.phase_deg.len() != frequencies_hz.len()
        {
            return Err(TouchstoneError::LengthMismatch {
                parameter: parameter.to_string(),
                expected: frequencies_hz.len(),
                magnitude: trace.magnitude_db.len(),
                phase: trace.phase_deg.len(),
            });
        }
    }
    if sparams.is_empty() {
        return Err(TouchstoneError::NoParameters);
    }

    let mut out = String::new();
    out.push_str(&format!("! {}\n", options.title));
    out.push_str(&format!(
        "! Date: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    if let (Some(first), Some(last)) = (frequencies_hz.first(), frequencies_hz.last()) {
        out.push_str(&format!(
            "! Frequency Range: {:.3} - {:.3} MHz\n",
            first / 1e6,
            last / 1e6
        ));
    }
    out.push_str(&format!("! Points: {}\n", frequencies_hz.len()));
    out.push_str("!\n");
    out.push_str(&format!(
        "# {} S DB R {:?}\n",
        options.freq_unit, options.reference_impedance
    ));

    let divisor = options.freq_unit.multiplier();
    for (i, freq_hz) in frequencies_hz.iter().enumerate() {
        let mut fields = vec![format!("{:.6}", freq_hz / divisor)];
        for (_, trace) in sparams.iter() {
            fields.push(format!("{:.6}", trace.magnitude_db[i]));
            fields.push(format!("{:.6}", trace.phase_deg[i]));
        }
        out.push_str(&fields.join("  "));
        out.push('\n');
    }

    Ok(out)
}

/// Parse Touchstone text.
///
/// Blank lines and `!` comments are ignored. The option line sets the
/// frequency unit (MHz when missing or unknown). Data lines with a
/// non-numeric token or fewer than three values are skipped. A parameter is
/// kept only if every accepted line carries it.
pub fn decode(text: &str) -> Result<MeasurementResult, TouchstoneError> {
    let mut unit = FrequencyUnit::MHz;
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for raw in text.lines() {
        let line = raw.split('!').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        if let Some(option_line) = line.strip_prefix('#') {
            if let Some(token) = option_line.split_whitespace().next() {
                unit = token.parse().unwrap_or_else(|_| {
                    debug!("Unknown frequency unit '{}', assuming MHz", token);
                    FrequencyUnit::MHz
                });
            }
            continue;
        }

        let parsed: Result<Vec<f64>, _> = line.split_whitespace().map(str::parse::<f64>).collect();
        match parsed {
            Ok(values) if values.len() >= 3 => rows.push(values),
            Ok(_) => debug!("Skipping short data line: '{}'", line),
            Err(_) => debug!("Skipping malformed data line: '{}'", line),
        }
    }

    if rows.is_empty() {
        return Err(TouchstoneError::NoData);
    }

    let multiplier = unit.multiplier();
    let frequencies_hz = rows.iter().map(|row| row[0] * multiplier).collect();

    let mut sparams = SParameterSet::new();
    for (idx, parameter) in SParameter::ALL.into_iter().enumerate() {
        let mag_idx = 1 + idx * 2;
        let phase_idx = mag_idx + 1;
        if rows.iter().all(|row| row.len() > phase_idx) {
            let trace = Trace::new(
                rows.iter().map(|row| row[mag_idx]).collect(),
                rows.iter().map(|row| row[phase_idx]).collect(),
            );
            sparams.insert(parameter, trace);
        }
    }

    Ok(MeasurementResult::new(frequencies_hz, sparams))
}

/// Write `result` into `dir` and return the file path.
///
/// Without `filename` the name is `<prefix>_<YYYYmmdd_HHMMSS>.s2p`. A missing
/// `.s2p` extension is appended. The directory is created if needed.
pub fn export(
    result: &MeasurementResult,
    dir: &Path,
    filename: Option<&str>,
    prefix: &str,
    options: &TouchstoneOptions,
) -> Result<PathBuf, TouchstoneError> {
    let text = encode(&result.frequencies_hz, &result.sparams, options)?;

    fs::create_dir_all(dir)?;
    let mut name = match filename {
        Some(name) => name.to_string(),
        None => format!("{}_{}", prefix, Local::now().format("%Y%m%d_%H%M%S")),
    };
    if !name.to_lowercase().ends_with(".s2p") {
        name.push('.');
        name.push_str(S2P_EXTENSION);
    }

    let path = dir.join(name);
    fs::write(&path, text)?;
    info!(
        "Exported {} points ({} parameters) to {}",
        result.points(),
        result.sparams.len(),
        path.display()
    );
    Ok(path)
}

/// Read and decode a Touchstone file.
pub fn import_file(path: &Path) -> Result<MeasurementResult, TouchstoneError> {
    let text = fs::read_to_string(path)?;
    decode(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set(points: usize, parameters: &[SParameter]) -> (Vec<f64>, SParameterSet) {
        let frequencies: Vec<f64> = (0..points).map(|i| 1e6 + 1e6 * i as f64).collect();
        let sparams = parameters
            .iter()
            .enumerate()
            .map(|(k, p)| {
                let mags = (0..points).map(|i| -0.5 * i as f64 - k as f64 - 1.0).collect();
                let phases = (0..points).map(|i| 1.25 * i as f64 - 90.0).collect();
                (*p, Trace::new(mags, phases))
            })
            .collect();
        (frequencies, sparams)
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("ghz".parse::<FrequencyUnit>(), Ok(FrequencyUnit::GHz));
        assert_eq!("kHz".parse::<FrequencyUnit>(), Ok(FrequencyUnit::KHz));
        assert!("THz".parse::<FrequencyUnit>().is_err());
        assert_eq!(FrequencyUnit::KHz.multiplier(), 1e3);
    }

    #[test]
    fn test_encode_header_and_option_line() {
        let (freqs, sparams) = sample_set(3, &[SParameter::S11]);
        let text = encode(&freqs, &sparams, &TouchstoneOptions::default()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "! HP E5071B S-Parameter Data");
        assert!(lines[1].starts_with("! Date: "));
        assert_eq!(lines[2], "! Frequency Range: 1.000 - 3.000 MHz");
        assert_eq!(lines[3], "! Points: 3");
        assert_eq!(lines[4], "!");
        assert_eq!(lines[5], "# MHz S DB R 50.0");
        assert_eq!(lines[6], "1.000000  -1.000000  -90.000000");
        assert_eq!(lines.len(), 9);
    }

    #[test]
    fn test_encode_in_ghz_with_custom_impedance() {
        let (freqs, sparams) = sample_set(2, &[SParameter::S21]);
        let options = TouchstoneOptions {
            freq_unit: FrequencyUnit::GHz,
            reference_impedance: 75.0,
            ..TouchstoneOptions::default()
        };
        let text = encode(&freqs, &sparams, &options).unwrap();
        assert!(text.contains("# GHz S DB R 75.0\n"));
        assert!(text.contains("\n0.001000  "));
    }

    #[test]
    fn test_encode_length_mismatch() {
        let (freqs, mut sparams) = sample_set(4, &[SParameter::S11]);
        sparams.insert(SParameter::S12, Trace::new(vec![0.0; 4], vec![0.0; 3]));
        let err = encode(&freqs, &sparams, &TouchstoneOptions::default()).unwrap_err();
        match err {
            TouchstoneError::LengthMismatch {
                parameter,
                expected,
                magnitude,
                phase,
            } => {
                assert_eq!(parameter, "S12");
                assert_eq!((expected, magnitude, phase), (4, 4, 3));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_encode_without_parameters() {
        let err = encode(&[1e6], &SParameterSet::new(), &TouchstoneOptions::default()).unwrap_err();
        assert!(matches!(err, TouchstoneError::NoParameters));
    }

    #[test]
    fn test_decode_round_trip_all_parameters() {
        let (freqs, sparams) = sample_set(25, &SParameter::ALL);
        let text = encode(&freqs, &sparams, &TouchstoneOptions::default()).unwrap();
        let decoded = decode(&text).unwrap();

        assert_eq!(decoded.points(), 25);
        for (a, b) in decoded.frequencies_hz.iter().zip(&freqs) {
            assert!((a - b).abs() < 1e-4 * b.abs().max(1.0));
        }
        for parameter in SParameter::ALL {
            let original = sparams.get(parameter).unwrap();
            let restored = decoded.sparams.get(parameter).unwrap();
            for (a, b) in original.magnitude_db.iter().zip(&restored.magnitude_db) {
                assert!((a - b).abs() < 1e-4);
            }
            for (a, b) in original.phase_deg.iter().zip(&restored.phase_deg) {
                assert!((a - b).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_decode_defaults_to_mhz() {
        let decoded = decode("1.5 -3.0 45.0\n2.5 -4.0 50.0\n").unwrap();
        assert_eq!(decoded.frequencies_hz, vec![1.5e6, 2.5e6]);
        assert_eq!(decoded.sparams.parameters(), vec![SParameter::S11]);
    }

    #[test]
    fn test_decode_unit_is_case_insensitive() {
        let decoded = decode("# ghz s db r 50\n1 0 0\n").unwrap();
        assert_eq!(decoded.frequencies_hz, vec![1e9]);
        let decoded = decode("# Hz S DB R 50\n100 0 0\n").unwrap();
        assert_eq!(decoded.frequencies_hz, vec![100.0]);
    }

    #[test]
    fn test_decode_skips_malformed_lines() {
        let text = "! comment\n\n# MHz S DB R 50.0\n1.0 -1.0 10.0\nfoo bar baz\n2.0 -2.0\n3.0 -3.0 30.0\n";
        let decoded = decode(text).unwrap();
        assert_eq!(decoded.frequencies_hz, vec![1e6, 3e6]);
        let s11 = decoded.sparams.get(SParameter::S11).unwrap();
        assert_eq!(s11.magnitude_db, vec![-1.0, -3.0]);
        assert_eq!(s11.phase_deg, vec![10.0, 30.0]);
    }

    #[test]
    fn test_decode_drops_partially_present_parameter() {
        let text = "# MHz S DB R 50\n1 -1 10 -2 20\n2 -1 10\n";
        let decoded = decode(text).unwrap();
        assert_eq!(decoded.sparams.parameters(), vec![SParameter::S11]);
    }

    #[test]
    fn test_decode_without_data() {
        assert!(matches!(decode(""), Err(TouchstoneError::NoData)));
        assert!(matches!(
            decode("! only comments\n# MHz S DB R 50\n"),
            Err(TouchstoneError::NoData)
        ));
        assert!(matches!(decode("1 2\n"), Err(TouchstoneError::NoData)));
    }

    #[test]
    fn test_export_autonames_and_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        let (freqs, sparams) = sample_set(5, &[SParameter::S11]);
        let result = MeasurementResult::new(freqs, sparams);
        let options = TouchstoneOptions::default();

        let out_dir = dir.path().join("nested").join("out");
        let auto = export(&result, &out_dir, None, "dut", &options).unwrap();
        let name = auto.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("dut_"));
        assert!(name.ends_with(".s2p"));
        assert_eq!(name.len(), "dut_20240101_120000.s2p".len());

        let named = export(&result, &out_dir, Some("filter"), "ignored", &options).unwrap();
        assert_eq!(named, out_dir.join("filter.s2p"));
        let kept = export(&result, &out_dir, Some("amp.S2P"), "ignored", &options).unwrap();
        assert_eq!(kept, out_dir.join("amp.S2P"));

        let imported = import_file(&named).unwrap();
        assert_eq!(imported.points(), 5);
    }

    #[test]
    fn test_import_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = import_file(&dir.path().join("missing.s2p")).unwrap_err();
        assert!(matches!(err, TouchstoneError::Io(_)));
    }
}
