//! SCPI command catalog for E5071-family analyzers.
//!
//! Constants are complete commands; builder functions format the variable
//! part. Every builder returns a well-formed command for any input. Channel 1
//! is the only channel used.

use crate::measurement::{SParameter, TriggerSource};

// IEEE 488.2 common commands
/// Identification query.
pub const IDN: &str = "*IDN?";
/// Operation-complete query.
pub const OPC: &str = "*OPC?";
/// Instrument reset.
pub const RESET: &str = "*RST";

// Data format
/// ASCII transfer format.
pub const SET_FORMAT_ASCII: &str = "FORM:DATA ASCII";

// Sweep control
/// Abort the running sweep.
pub const ABORT: &str = "ABOR";
/// Start a sweep on channel 1.
pub const INIT: &str = "INIT1";
/// Continuous initiation on.
pub const INIT_CONTINUOUS_ON: &str = "INIT1:CONT ON";
/// Continuous initiation off.
pub const INIT_CONTINUOUS_OFF: &str = "INIT1:CONT OFF";
/// Query continuous initiation.
pub const GET_INIT_CONTINUOUS: &str = "INIT1:CONT?";
/// Query trigger source.
pub const GET_TRIGGER_SOURCE: &str = "TRIG:SOUR?";
/// Remote (bus) trigger source.
pub const SET_TRIGGER_BUS: &str = "TRIG:SOUR BUS";

// Sweep type
/// Linear frequency sweep.
pub const SET_SWEEP_LINEAR: &str = "SENS1:SWE:TYPE LIN";

// Frequency
/// Query start frequency.
pub const GET_FREQ_START: &str = "SENS1:FREQ:STAR?";
/// Query stop frequency.
pub const GET_FREQ_STOP: &str = "SENS1:FREQ:STOP?";
/// Query the stimulus (frequency) array.
pub const GET_FREQ_DATA: &str = "SENS1:FREQ:DATA?";

// Sweep points and averaging
/// Query sweep points.
pub const GET_SWEEP_POINTS: &str = "SENS1:SWE:POIN?";
/// Query averaging state.
pub const GET_AVERAGING_STATE: &str = "SENS1:AVER:STAT?";
/// Query averaging factor.
pub const GET_AVERAGING_COUNT: &str = "SENS1:AVER:COUN?";

// Trace data
/// Complex (re, im) data of the active trace.
pub const GET_SDATA: &str = "CALC1:DATA:SDAT?";

/// `SENS1:FREQ:STAR <hz>`
pub fn set_freq_start(freq_hz: f64) -> String {
    format!("SENS1:FREQ:STAR {}", numeric_value(freq_hz))
}

/// `SENS1:FREQ:STOP <hz>`
pub fn set_freq_stop(freq_hz: f64) -> String {
    format!("SENS1:FREQ:STOP {}", numeric_value(freq_hz))
}

/// `SENS1:SWE:POIN <n>`
pub fn set_sweep_points(points: u32) -> String {
    format!("SENS1:SWE:POIN {}", points)
}

/// `SENS1:AVER:STAT ON|OFF`
pub fn set_averaging_state(enabled: bool) -> String {
    format!("SENS1:AVER:STAT {}", on_off(enabled))
}

/// `SENS1:AVER:COUN <n>`
pub fn set_averaging_count(count: u32) -> String {
    format!("SENS1:AVER:COUN {}", count)
}

/// `CALC1:PAR:COUN <n>`
pub fn set_param_count(count: u32) -> String {
    format!("CALC1:PAR:COUN {}", count)
}

/// `CALC1:PAR<i>:DEF <Sxy>`
pub fn define_param(index: u8, parameter: SParameter) -> String {
    format!("CALC1:PAR{}:DEF {}", index, parameter)
}

/// `CALC1:PAR<i>:SEL`
pub fn select_param(index: u8) -> String {
    format!("CALC1:PAR{}:SEL", index)
}

/// `TRIG:SOUR <src>`
pub fn set_trigger_source(source: TriggerSource) -> String {
    format!("TRIG:SOUR {}", source.as_scpi())
}

/// `INIT1:CONT ON|OFF`
pub fn set_init_continuous(enabled: bool) -> String {
    format!("INIT1:CONT {}", on_off(enabled))
}

/// SCPI numeric parameter. Non-finite values map to the `MIN`/`MAX` keywords;
/// NaN is sent as `MIN`.
fn numeric_value(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else if value == f64::INFINITY {
        "MAX".to_string()
    } else {
        "MIN".to_string()
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "ON"
    } else {
        "OFF"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_builders() {
        assert_eq!(set_freq_start(1e6), "SENS1:FREQ:STAR 1000000");
        assert_eq!(set_freq_stop(1100e6), "SENS1:FREQ:STOP 1100000000");
        assert_eq!(set_freq_start(2.5e3), "SENS1:FREQ:STAR 2500");
    }

    #[test]
    fn test_frequency_builders_with_non_finite_input() {
        assert_eq!(set_freq_start(f64::NAN), "SENS1:FREQ:STAR MIN");
        assert_eq!(set_freq_stop(f64::INFINITY), "SENS1:FREQ:STOP MAX");
        assert_eq!(set_freq_start(f64::NEG_INFINITY), "SENS1:FREQ:STAR MIN");
        assert_eq!(set_freq_stop(-0.0), "SENS1:FREQ:STOP -0");
    }

    #[test]
    fn test_sweep_builders() {
        assert_eq!(set_sweep_points(601), "SENS1:SWE:POIN 601");
        assert_eq!(set_averaging_state(true), "SENS1:AVER:STAT ON");
        assert_eq!(set_averaging_state(false), "SENS1:AVER:STAT OFF");
        assert_eq!(set_averaging_count(16), "SENS1:AVER:COUN 16");
    }

    #[test]
    fn test_parameter_builders() {
        assert_eq!(set_param_count(4), "CALC1:PAR:COUN 4");
        assert_eq!(define_param(2, SParameter::S21), "CALC1:PAR2:DEF S21");
        assert_eq!(select_param(1), "CALC1:PAR1:SEL");
    }

    #[test]
    fn test_trigger_builders() {
        assert_eq!(set_trigger_source(TriggerSource::Internal), "TRIG:SOUR INT");
        assert_eq!(set_trigger_source(TriggerSource::Bus), SET_TRIGGER_BUS);
        assert_eq!(set_init_continuous(false), INIT_CONTINUOUS_OFF);
        assert_eq!(set_init_continuous(true), INIT_CONTINUOUS_ON);
    }
}
