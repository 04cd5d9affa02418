//! Analyzer drivers.
//!
//! [`VnaDriver`] is the seam between the measurement worker and a concrete
//! instrument model. A driver owns at most one transport session and walks
//! through [`DriverState`]:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> (Configuring -> Sweeping -> Reading)* -> Connected -> Disconnected
//! ```
//!
//! A failed connect falls back to `Disconnected`. A failed operation on a
//! connected driver returns it to `Connected`.
//!
//! Concrete drivers are listed in [`registry::DriverRegistry`] and picked by
//! their `*IDN?` answer.

pub mod address;
pub mod e5071b;
pub mod registry;
pub mod scpi_commands;

pub use address::InstrumentAddress;
pub use e5071b::HpE5071b;
pub use registry::{DriverDescriptor, DriverRegistry};

use crate::error::{VnaError, VnaResult};
use crate::measurement::{
    InstrumentParams, MeasurementResult, SParameter, SParameterSet, SweepConfig, Trace,
    TriggerState,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Progress callback: `(step description, percent 0-100)`.
pub type ProgressFn<'a> = &'a (dyn Fn(&str, f64) + Send + Sync);

/// Progress callback that drops every update.
pub fn no_progress(_message: &str, _percent: f64) {}

/// Lifecycle state of a driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    /// No session
    Disconnected,
    /// Probe, open and identification in progress
    Connecting,
    /// Session open and idle
    Connected,
    /// Writing sweep or trace settings
    Configuring,
    /// Waiting for a triggered sweep to finish
    Sweeping,
    /// Transferring trace data
    Reading,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Configuring => "configuring",
            Self::Sweeping => "sweeping",
            Self::Reading => "reading",
        };
        f.write_str(name)
    }
}

/// Fixed waits after writes the instrument applies asynchronously.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SettleDelays {
    /// After start/stop frequency
    pub frequency: Duration,
    /// After the measurement settings block
    pub measurement: Duration,
    /// After `CALC1:PAR:COUN`
    pub parameter_count: Duration,
    /// After each `CALC1:PAR<i>:DEF`
    pub define: Duration,
    /// After each `CALC1:PAR<i>:SEL`
    pub select: Duration,
    /// After `ABOR`
    pub abort: Duration,
    /// After the other trigger-related writes
    pub trigger: Duration,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            frequency: Duration::from_millis(500),
            measurement: Duration::from_millis(500),
            parameter_count: Duration::from_millis(300),
            define: Duration::from_millis(200),
            select: Duration::from_millis(100),
            abort: Duration::from_millis(200),
            trigger: Duration::from_millis(100),
        }
    }
}

impl SettleDelays {
    /// All delays zero.
    pub fn none() -> Self {
        Self {
            frequency: Duration::ZERO,
            measurement: Duration::ZERO,
            parameter_count: Duration::ZERO,
            define: Duration::ZERO,
            select: Duration::ZERO,
            abort: Duration::ZERO,
            trigger: Duration::ZERO,
        }
    }
}

/// Timeouts and delays a driver runs with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverTiming {
    /// Per-port reachability probe timeout
    pub probe_timeout: Duration,
    /// Transport open and per-command I/O timeout
    pub command_timeout: Duration,
    /// Bound for operation-complete waits outside a sweep
    pub operation_timeout: Duration,
    /// Bound for a triggered sweep to complete
    pub sweep_timeout: Duration,
    /// Pause between `*OPC?` polls
    pub opc_poll_interval: Duration,
    /// Settle delays
    pub settle: SettleDelays,
}

impl Default for DriverTiming {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(500),
            command_timeout: Duration::from_millis(5000),
            operation_timeout: Duration::from_secs(60),
            sweep_timeout: Duration::from_secs(60),
            opc_poll_interval: Duration::from_millis(100),
            settle: SettleDelays::default(),
        }
    }
}

impl DriverTiming {
    /// Default timeouts with every settle delay removed.
    pub fn without_delays() -> Self {
        Self {
            opc_poll_interval: Duration::from_millis(1),
            settle: SettleDelays::none(),
            ..Self::default()
        }
    }
}

/// One analyzer model.
///
/// Operations other than [`connect`](VnaDriver::connect) and
/// [`disconnect`](VnaDriver::disconnect) fail with [`VnaError::NotConnected`]
/// when no session is open.
#[async_trait]
pub trait VnaDriver: Send {
    /// Human-readable model name, as registered
    fn name(&self) -> &'static str;

    /// `*IDN?` answer of the open session
    fn idn(&self) -> Option<&str>;

    /// Current lifecycle state
    fn state(&self) -> DriverState;

    /// Returns true while a session is open
    fn is_connected(&self) -> bool {
        !matches!(
            self.state(),
            DriverState::Disconnected | DriverState::Connecting
        )
    }

    /// Probe the host, open a session and identify the instrument.
    ///
    /// An already open session is closed first. Returns the identification string.
    async fn connect(
        &mut self,
        address: &InstrumentAddress,
        progress: ProgressFn<'_>,
    ) -> VnaResult<String>;

    /// Close the session. Calling it without a session is a no-op.
    async fn disconnect(&mut self) -> VnaResult<()>;

    /// Write start/stop frequency when `override_freq_range` is set.
    async fn configure_frequency(&mut self, config: &SweepConfig) -> VnaResult<()>;

    /// Write data format, sweep type, points, averaging.
    async fn configure_measurement(&mut self, config: &SweepConfig) -> VnaResult<()>;

    /// Put S11, S21, S12, S22 on traces 1 to 4.
    async fn setup_sparameters(&mut self) -> VnaResult<()>;

    /// Run one bus-triggered sweep and wait for it to complete.
    async fn trigger_sweep(&mut self) -> VnaResult<()>;

    /// Stimulus frequencies in Hz.
    async fn read_frequency_axis(&mut self) -> VnaResult<Vec<f64>>;

    /// One parameter as dB magnitude and degree phase.
    async fn read_sparameter(&mut self, parameter: SParameter) -> VnaResult<Trace>;

    /// All four parameters in canonical order.
    async fn read_all_sparameters(&mut self) -> VnaResult<SParameterSet> {
        let mut sparams = SParameterSet::new();
        for parameter in SParameter::ALL {
            let trace = self.read_sparameter(parameter).await?;
            sparams.insert(parameter, trace);
        }
        Ok(sparams)
    }

    /// Capture trigger source and continuous mode.
    async fn save_trigger_state(&mut self) -> VnaResult<TriggerState>;

    /// Write back a captured trigger configuration.
    async fn restore_trigger_state(&mut self, state: TriggerState) -> VnaResult<()>;

    /// Read sweep settings without changing anything.
    async fn read_current_params(&mut self) -> VnaResult<InstrumentParams>;

    /// Full measurement cycle.
    ///
    /// Configure, set up traces, save the trigger state, sweep, read the axis
    /// and every parameter, then restore the trigger state. When a step after
    /// the save fails the restore is still attempted.
    async fn perform_measurement(
        &mut self,
        config: &SweepConfig,
        progress: ProgressFn<'_>,
    ) -> VnaResult<MeasurementResult> {
        progress("Configuring frequency...", 5.0);
        self.configure_frequency(config).await?;

        progress("Configuring measurement settings...", 10.0);
        self.configure_measurement(config).await?;

        progress("Setting up S-parameters...", 20.0);
        self.setup_sparameters().await?;

        progress("Triggering sweep...", 30.0);
        let saved = self.save_trigger_state().await?;

        let outcome: VnaResult<MeasurementResult> = async {
            self.trigger_sweep().await?;

            progress("Reading frequency data...", 50.0);
            let frequencies = self.read_frequency_axis().await?;

            let mut sparams = SParameterSet::new();
            for (i, parameter) in SParameter::ALL.into_iter().enumerate() {
                progress(
                    &format!("Reading {}...", parameter),
                    50.0 + 10.0 * (i + 1) as f64,
                );
                let trace = self.read_sparameter(parameter).await?;
                if trace.consistent_len() != Some(frequencies.len()) {
                    return Err(VnaError::InvalidResponse(format!(
                        "{} returned {} magnitude / {} phase points for {} frequencies",
                        parameter,
                        trace.magnitude_db.len(),
                        trace.phase_deg.len(),
                        frequencies.len()
                    )));
                }
                sparams.insert(parameter, trace);
            }

            Ok(MeasurementResult::new(frequencies, sparams))
        }
        .await;

        match outcome {
            Ok(result) => {
                self.restore_trigger_state(saved).await?;
                progress("Measurement complete", 100.0);
                Ok(result)
            }
            Err(e) => {
                if let Err(restore_err) = self.restore_trigger_state(saved).await {
                    warn!("Failed to restore trigger state after error: {}", restore_err);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let timing = DriverTiming::default();
        assert_eq!(timing.probe_timeout, Duration::from_millis(500));
        assert_eq!(timing.command_timeout, Duration::from_secs(5));
        assert_eq!(timing.sweep_timeout, Duration::from_secs(60));
        assert_eq!(timing.settle.frequency, Duration::from_millis(500));
        assert_eq!(timing.settle.select, Duration::from_millis(100));
    }

    #[test]
    fn test_without_delays_keeps_timeouts() {
        let timing = DriverTiming::without_delays();
        assert_eq!(timing.settle, SettleDelays::none());
        assert_eq!(timing.sweep_timeout, DriverTiming::default().sweep_timeout);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(DriverState::Sweeping.to_string(), "sweeping");
    }
}
