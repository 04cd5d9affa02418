//! Typed settings for the measurement runner.

use crate::data::{FrequencyUnit, TouchstoneOptions};
use crate::instrument::{DriverTiming, InstrumentAddress, SettleDelays};
use crate::measurement::{SParameter, SweepConfig};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/vna.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "VNA_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The layered sources could not be merged or extracted.
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    /// A value was read but is not acceptable.
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VnaConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Instrument address
    pub connection: InstrumentAddress,
    /// Sweep settings sent with MEASURE
    pub sweep: SweepConfig,
    /// Driver timeouts and delays
    pub timing: TimingConfig,
    /// Touchstone export settings
    pub output: OutputConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "VNA Measure".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Timeouts and settle delays, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Per-port reachability probe timeout
    pub probe_timeout_ms: u64,
    /// Transport open and per-command timeout
    pub command_timeout_ms: u64,
    /// Bound for operation-complete waits outside a sweep
    pub operation_timeout_ms: u64,
    /// Bound for a triggered sweep
    pub sweep_timeout_ms: u64,
    /// Pause between `*OPC?` polls
    pub opc_poll_interval_ms: u64,
    /// Bound for joining the worker on exit
    pub shutdown_timeout_ms: u64,
    /// Delay after frequency writes
    pub settle_frequency_ms: u64,
    /// Delay after the measurement settings block
    pub settle_measurement_ms: u64,
    /// Delay after the parameter count write
    pub settle_parameter_count_ms: u64,
    /// Delay after each trace definition
    pub settle_define_ms: u64,
    /// Delay after each trace selection
    pub settle_select_ms: u64,
    /// Delay after `ABOR`
    pub settle_abort_ms: u64,
    /// Delay after the other trigger writes
    pub settle_trigger_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let timing = DriverTiming::default();
        let ms = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        Self {
            probe_timeout_ms: ms(timing.probe_timeout),
            command_timeout_ms: ms(timing.command_timeout),
            operation_timeout_ms: ms(timing.operation_timeout),
            sweep_timeout_ms: ms(timing.sweep_timeout),
            opc_poll_interval_ms: ms(timing.opc_poll_interval),
            shutdown_timeout_ms: 5000,
            settle_frequency_ms: ms(timing.settle.frequency),
            settle_measurement_ms: ms(timing.settle.measurement),
            settle_parameter_count_ms: ms(timing.settle.parameter_count),
            settle_define_ms: ms(timing.settle.define),
            settle_select_ms: ms(timing.settle.select),
            settle_abort_ms: ms(timing.settle.abort),
            settle_trigger_ms: ms(timing.settle.trigger),
        }
    }
}

impl TimingConfig {
    /// Driver timing built from these values.
    pub fn driver_timing(&self) -> DriverTiming {
        DriverTiming {
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            operation_timeout: Duration::from_millis(self.operation_timeout_ms),
            sweep_timeout: Duration::from_millis(self.sweep_timeout_ms),
            opc_poll_interval: Duration::from_millis(self.opc_poll_interval_ms),
            settle: SettleDelays {
                frequency: Duration::from_millis(self.settle_frequency_ms),
                measurement: Duration::from_millis(self.settle_measurement_ms),
                parameter_count: Duration::from_millis(self.settle_parameter_count_ms),
                define: Duration::from_millis(self.settle_define_ms),
                select: Duration::from_millis(self.settle_select_ms),
                abort: Duration::from_millis(self.settle_abort_ms),
                trigger: Duration::from_millis(self.settle_trigger_ms),
            },
        }
    }

    /// Worker shutdown bound.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Touchstone export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving exported files
    pub folder: PathBuf,
    /// Prefix of generated file names
    pub filename_prefix: String,
    /// Frequency unit of the data column (Hz, kHz, MHz, GHz)
    pub freq_unit: String,
    /// Reference impedance in ohms
    pub reference_impedance: f64,
    /// Exported parameters, e.g. `["S11", "S21"]`
    pub sparams: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("measurement"),
            filename_prefix: "measurement".to_string(),
            freq_unit: FrequencyUnit::MHz.to_string(),
            reference_impedance: 50.0,
            sparams: SParameter::ALL.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl OutputConfig {
    /// Parsed frequency unit.
    pub fn frequency_unit(&self) -> Result<FrequencyUnit, ConfigError> {
        self.freq_unit
            .parse()
            .map_err(ConfigError::ValidationError)
    }

    /// Parsed parameter selection, in the order given.
    pub fn selected_parameters(&self) -> Result<Vec<SParameter>, ConfigError> {
        self.sparams
            .iter()
            .map(|name| {
                name.parse::<SParameter>().map_err(|_| {
                    ConfigError::ValidationError(format!(
                        "Invalid S-parameter '{}'. Must be one of: S11, S21, S12, S22",
                        name
                    ))
                })
            })
            .collect()
    }

    /// Codec options for these settings.
    pub fn touchstone_options(&self) -> Result<TouchstoneOptions, ConfigError> {
        Ok(TouchstoneOptions {
            freq_unit: self.frequency_unit()?,
            reference_impedance: self.reference_impedance,
            ..TouchstoneOptions::default()
        })
    }
}

impl VnaConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a source is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path
    ///
    /// Precedence, highest first:
    /// 1. Environment variables (`VNA_` prefix, `__` between key segments)
    /// 2. The TOML file at `path`, if it exists
    /// 3. Built-in defaults
    ///
    /// ```text
    /// VNA_CONNECTION__HOST=192.168.1.20
    /// VNA_SWEEP__POINTS=1601
    /// VNA_APPLICATION__LOG_LEVEL=debug
    /// ```
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks the log level, frequency unit, reference impedance and the
    /// exported parameter names. An empty host is allowed here; connecting
    /// reports it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        self.output.frequency_unit()?;

        let impedance = self.output.reference_impedance;
        if impedance.is_nan() || impedance <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid reference_impedance {}. Must be > 0",
                impedance
            )));
        }

        self.output.selected_parameters()?;

        if self.timing.opc_poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "opc_poll_interval_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
