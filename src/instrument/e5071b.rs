//! HP/Agilent/Keysight E5071 series driver.
//!
//! Single channel, four traces (S11, S21, S12, S22 on traces 1 to 4), ASCII
//! data transfer. Sweeps run with the bus trigger so completion can be awaited
//! with `*OPC?`; the trigger configuration found on the instrument is saved
//! before and restored after a measurement.

use super::scpi_commands as scpi;
use super::{DriverState, DriverTiming, InstrumentAddress, ProgressFn, VnaDriver};
use crate::adapters::{Connector, ScpiTransport};
use crate::error::{VnaError, VnaResult};
use crate::measurement::sweep::{parse_scpi_bool, parse_scpi_u32};
use crate::measurement::{InstrumentParams, SParameter, SweepConfig, Trace, TriggerSource, TriggerState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Registered name of this driver.
pub const DRIVER_NAME: &str = "HP E5071B";

/// Model tokens recognized in `*IDN?` answers (lowercase).
const IDN_TOKENS: [&str; 4] = ["e5071", "e5071a", "e5071b", "e5071c"];

/// E5071 family analyzer.
pub struct HpE5071b {
    connector: Arc<dyn Connector>,
    timing: DriverTiming,
    transport: Option<Box<dyn ScpiTransport>>,
    idn: Option<String>,
    state: DriverState,
}

impl HpE5071b {
    /// Creates a disconnected driver.
    pub fn new(connector: Arc<dyn Connector>, timing: DriverTiming) -> Self {
        Self {
            connector,
            timing,
            transport: None,
            idn: None,
            state: DriverState::Disconnected,
        }
    }

    /// Registry constructor.
    pub fn boxed(connector: Arc<dyn Connector>, timing: DriverTiming) -> Box<dyn VnaDriver> {
        Box::new(Self::new(connector, timing))
    }

    /// Returns true if `idn` names an E5071 family instrument.
    pub fn idn_matches(idn: &str) -> bool {
        let lower = idn.to_lowercase();
        IDN_TOKENS.iter().any(|token| lower.contains(token))
    }

    /// Timing this driver runs with.
    pub fn timing(&self) -> &DriverTiming {
        &self.timing
    }

    /// Send `*RST` and wait for the instrument to settle.
    pub async fn reset(&mut self) -> VnaResult<()> {
        self.begin(DriverState::Configuring)?;
        let result: VnaResult<_> = async {
            self.send(scpi::RESET).await?;
            self.wait_for_operation_complete(self.timing.operation_timeout)
                .await
        }
        .await;
        self.finish(result)
    }

    /// Checks for a session and enters `phase`.
    fn begin(&mut self, phase: DriverState) -> VnaResult<()> {
        if self.transport.is_none() {
            return Err(VnaError::NotConnected);
        }
        self.state = phase;
        Ok(())
    }

    /// Returns to `Connected` after an operation, whatever its outcome.
    fn finish<T>(&mut self, result: VnaResult<T>) -> VnaResult<T> {
        if self.transport.is_some() {
            self.state = DriverState::Connected;
        }
        result
    }

    fn transport(&mut self) -> VnaResult<&mut Box<dyn ScpiTransport>> {
        self.transport.as_mut().ok_or(VnaError::NotConnected)
    }

    async fn send(&mut self, command: &str) -> VnaResult<()> {
        self.transport()?.write(command).await?;
        Ok(())
    }

    async fn send_settled(&mut self, command: &str, delay: Duration) -> VnaResult<()> {
        self.send(command).await?;
        settle(delay).await;
        Ok(())
    }

    async fn query(&mut self, command: &str) -> VnaResult<String> {
        let response = self.transport()?.query(command).await?;
        Ok(response.trim().to_string())
    }

    async fn query_values(&mut self, command: &str) -> VnaResult<Vec<f64>> {
        Ok(self.transport()?.query_values(command).await?)
    }

    /// Poll `*OPC?` until it reports completion or `timeout` elapses.
    async fn wait_for_operation_complete(&mut self, timeout: Duration) -> VnaResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(VnaError::SweepTimeout(timeout));
            }

            let response = match tokio::time::timeout(remaining, self.query(scpi::OPC)).await {
                Ok(response) => response?,
                Err(_) => return Err(VnaError::SweepTimeout(timeout)),
            };
            if matches!(response.as_str(), "1" | "+1") {
                return Ok(());
            }

            tokio::time::sleep(self.timing.opc_poll_interval).await;
        }
    }

    async fn query_parsed<T>(&mut self, command: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
        match self.query(command).await {
            Ok(response) => {
                let parsed = parse(&response);
                if parsed.is_none() {
                    debug!("Unparsable response to {}: '{}'", command, response);
                }
                parsed
            }
            Err(e) => {
                debug!("{} failed: {}", command, e);
                None
            }
        }
    }
}

async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn parse_f64(response: &str) -> Option<f64> {
    response.trim().parse().ok()
}

#[async_trait]
impl VnaDriver for HpE5071b {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn idn(&self) -> Option<&str> {
        self.idn.as_deref()
    }

    fn state(&self) -> DriverState {
        self.state
    }

    async fn connect(
        &mut self,
        address: &InstrumentAddress,
        progress: ProgressFn<'_>,
    ) -> VnaResult<String> {
        let resource = address.resource_string()?;
        if self.transport.is_some() {
            self.disconnect().await?;
        }
        self.state = DriverState::Connecting;

        progress("Checking host...", 10.0);
        if !self
            .connector
            .probe(&address.host, self.timing.probe_timeout)
            .await
        {
            self.state = DriverState::Disconnected;
            return Err(VnaError::HostUnreachable {
                host: address.host.clone(),
            });
        }

        progress("Initializing VISA...", 25.0);
        progress("Opening connection...", 50.0);
        let mut transport = match self
            .connector
            .open(address, self.timing.command_timeout)
            .await
        {
            Ok(transport) => transport,
            Err(e) => {
                self.state = DriverState::Disconnected;
                return Err(VnaError::ConnectionFailed(format!(
                    "Failed to open {}: {:#}",
                    resource, e
                )));
            }
        };

        progress("Verifying connection...", 80.0);
        let idn = match transport.query(scpi::IDN).await {
            Ok(idn) => idn.trim().to_string(),
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    warn!("Failed to close {} after handshake error: {}", resource, close_err);
                }
                self.state = DriverState::Disconnected;
                return Err(VnaError::ConnectionFailed(format!(
                    "No identification from {}: {:#}",
                    resource, e
                )));
            }
        };

        info!("Connected to {} ({})", resource, idn);
        self.transport = Some(transport);
        self.idn = Some(idn.clone());
        self.state = DriverState::Connected;
        progress("Connected", 100.0);
        Ok(idn)
    }

    async fn disconnect(&mut self) -> VnaResult<()> {
        self.idn = None;
        self.state = DriverState::Disconnected;
        if let Some(mut transport) = self.transport.take() {
            let resource = transport.resource_name().to_string();
            if let Err(e) = transport.close().await {
                warn!("Error while closing {}: {}", resource, e);
            }
            info!("Disconnected from {}", resource);
        }
        Ok(())
    }

    async fn configure_frequency(&mut self, config: &SweepConfig) -> VnaResult<()> {
        self.begin(DriverState::Configuring)?;
        let result: VnaResult<_> = async {
            if config.override_freq_range {
                self.send(&scpi::set_freq_start(config.start_freq_hz)).await?;
                self.send(&scpi::set_freq_stop(config.stop_freq_hz)).await?;
                settle(self.timing.settle.frequency).await;
            }
            Ok(())
        }
        .await;
        self.finish(result)
    }

    async fn configure_measurement(&mut self, config: &SweepConfig) -> VnaResult<()> {
        self.begin(DriverState::Configuring)?;
        let result: VnaResult<_> = async {
            self.send(scpi::SET_FORMAT_ASCII).await?;
            self.send(scpi::SET_SWEEP_LINEAR).await?;
            if config.override_points {
                self.send(&scpi::set_sweep_points(config.points)).await?;
            }
            self.send(&scpi::set_averaging_state(config.enable_averaging))
                .await?;
            if config.override_averaging_count {
                self.send(&scpi::set_averaging_count(config.averaging_count))
                    .await?;
            }
            settle(self.timing.settle.measurement).await;
            Ok(())
        }
        .await;
        self.finish(result)
    }

    async fn setup_sparameters(&mut self) -> VnaResult<()> {
        self.begin(DriverState::Configuring)?;
        let settle_delays = self.timing.settle;
        let result: VnaResult<_> = async {
            self.send_settled(
                &scpi::set_param_count(SParameter::ALL.len() as u32),
                settle_delays.parameter_count,
            )
            .await?;
            for parameter in SParameter::ALL {
                let index = parameter.trace_index();
                self.send_settled(&scpi::define_param(index, parameter), settle_delays.define)
                    .await?;
                self.send_settled(&scpi::select_param(index), settle_delays.select)
                    .await?;
            }
            self.send_settled(&scpi::select_param(1), settle_delays.select)
                .await
        }
        .await;
        self.finish(result)
    }

    async fn trigger_sweep(&mut self) -> VnaResult<()> {
        self.begin(DriverState::Sweeping)?;
        let settle_delays = self.timing.settle;
        let sweep_timeout = self.timing.sweep_timeout;
        let result: VnaResult<_> = async {
            self.send_settled(scpi::ABORT, settle_delays.abort).await?;
            self.send_settled(scpi::INIT_CONTINUOUS_OFF, settle_delays.trigger)
                .await?;
            self.send_settled(scpi::SET_TRIGGER_BUS, settle_delays.trigger)
                .await?;
            self.send_settled(scpi::INIT, settle_delays.trigger).await?;
            self.wait_for_operation_complete(sweep_timeout).await
        }
        .await;
        if let Err(VnaError::SweepTimeout(limit)) = &result {
            warn!("Sweep did not complete within {:?}", limit);
        }
        self.finish(result)
    }

    async fn read_frequency_axis(&mut self) -> VnaResult<Vec<f64>> {
        self.begin(DriverState::Reading)?;
        let result = self.query_values(scpi::GET_FREQ_DATA).await;
        self.finish(result)
    }

    async fn read_sparameter(&mut self, parameter: SParameter) -> VnaResult<Trace> {
        self.begin(DriverState::Reading)?;
        let select_delay = self.timing.settle.select;
        let result: VnaResult<_> = async {
            self.send_settled(&scpi::select_param(parameter.trace_index()), select_delay)
                .await?;
            let values = self.query_values(scpi::GET_SDATA).await?;
            if values.len() % 2 != 0 {
                debug!(
                    "{} returned an odd value count ({}), dropping the last value",
                    parameter,
                    values.len()
                );
            }
            Ok(Trace::from_interleaved_complex(&values))
        }
        .await;
        self.finish(result)
    }

    async fn save_trigger_state(&mut self) -> VnaResult<TriggerState> {
        self.begin(DriverState::Configuring)?;
        let result: VnaResult<_> = async {
            let source_text = self.query(scpi::GET_TRIGGER_SOURCE).await?;
            let source = TriggerSource::from_scpi(&source_text).ok_or_else(|| {
                VnaError::InvalidResponse(format!("Unknown trigger source '{}'", source_text))
            })?;
            let continuous_text = self.query(scpi::GET_INIT_CONTINUOUS).await?;
            let continuous = parse_scpi_bool(&continuous_text).ok_or_else(|| {
                VnaError::InvalidResponse(format!(
                    "Unexpected continuous mode '{}'",
                    continuous_text
                ))
            })?;
            debug!("Saved trigger state: {} continuous={}", source, continuous);
            Ok(TriggerState { source, continuous })
        }
        .await;
        self.finish(result)
    }

    async fn restore_trigger_state(&mut self, state: TriggerState) -> VnaResult<()> {
        self.begin(DriverState::Configuring)?;
        let delay = self.timing.settle.trigger;
        let result: VnaResult<_> = async {
            self.send_settled(&scpi::set_trigger_source(state.source), delay)
                .await?;
            self.send_settled(&scpi::set_init_continuous(state.continuous), delay)
                .await
        }
        .await;
        self.finish(result)
    }

    async fn read_current_params(&mut self) -> VnaResult<InstrumentParams> {
        self.begin(DriverState::Reading)?;
        let params = InstrumentParams {
            start_freq_hz: self.query_parsed(scpi::GET_FREQ_START, parse_f64).await,
            stop_freq_hz: self.query_parsed(scpi::GET_FREQ_STOP, parse_f64).await,
            points: self.query_parsed(scpi::GET_SWEEP_POINTS, parse_scpi_u32).await,
            averaging_enabled: self
                .query_parsed(scpi::GET_AVERAGING_STATE, parse_scpi_bool)
                .await,
            averaging_count: self
                .query_parsed(scpi::GET_AVERAGING_COUNT, parse_scpi_u32)
                .await,
        };
        self.finish(Ok(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock_adapter::{OpcBehavior, SimulatedVna};
    use crate::instrument::no_progress;
    use tracing_test::traced_test;

    fn driver_for(vna: &SimulatedVna) -> HpE5071b {
        HpE5071b::new(Arc::new(vna.clone()), DriverTiming::without_delays())
    }

    async fn connected(vna: &SimulatedVna) -> HpE5071b {
        let mut driver = driver_for(vna);
        driver
            .connect(&InstrumentAddress::new("10.0.0.5"), &no_progress)
            .await
            .unwrap();
        vna.clear_history();
        driver
    }

    #[test]
    fn test_idn_matching() {
        assert!(HpE5071b::idn_matches("HEWLETT-PACKARD,E5071B,MY12345678,A.01.02"));
        assert!(HpE5071b::idn_matches("Agilent Technologies,e5071c,MY46100000,B.13.10"));
        assert!(!HpE5071b::idn_matches("Keysight,N9913A,12345,A.10"));
        assert!(!HpE5071b::idn_matches(""));
    }

    #[tokio::test]
    async fn test_connect_reports_progress_and_idn() {
        let vna = SimulatedVna::new();
        let mut driver = driver_for(&vna);
        let steps = std::sync::Mutex::new(Vec::new());
        let progress = |message: &str, percent: f64| {
            steps.lock().unwrap().push((message.to_string(), percent));
        };

        let idn = driver
            .connect(&InstrumentAddress::new("10.0.0.5"), &progress)
            .await
            .unwrap();

        assert!(idn.contains("E5071B"));
        assert_eq!(driver.idn(), Some(idn.as_str()));
        assert_eq!(driver.state(), DriverState::Connected);
        let percents: Vec<f64> = steps.lock().unwrap().iter().map(|s| s.1).collect();
        assert_eq!(percents, vec![10.0, 25.0, 50.0, 80.0, 100.0]);
    }

    #[tokio::test]
    async fn test_connect_without_host() {
        let vna = SimulatedVna::new();
        let mut driver = driver_for(&vna);
        let err = driver
            .connect(&InstrumentAddress::default(), &no_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, VnaError::Configuration(_)));
        assert_eq!(vna.open_count(), 0);
        assert_eq!(driver.state(), DriverState::Disconnected);
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let vna = SimulatedVna::new();
        vna.set_reachable(false);
        let mut driver = driver_for(&vna);
        let err = driver
            .connect(&InstrumentAddress::new("10.0.0.99"), &no_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, VnaError::HostUnreachable { ref host } if host == "10.0.0.99"));
        assert!(!driver.is_connected());
    }

    #[tokio::test]
    async fn test_failed_handshake_closes_transport() {
        let vna = SimulatedVna::new();
        vna.fail_on("*IDN?");
        let mut driver = driver_for(&vna);
        let err = driver
            .connect(&InstrumentAddress::new("10.0.0.5"), &no_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, VnaError::ConnectionFailed(_)));
        assert_eq!(vna.open_count(), 1);
        assert_eq!(vna.close_count(), 1);
        assert_eq!(driver.state(), DriverState::Disconnected);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let vna = SimulatedVna::new();
        let mut driver = driver_for(&vna);
        assert!(matches!(
            driver.trigger_sweep().await,
            Err(VnaError::NotConnected)
        ));
        assert!(matches!(
            driver.read_current_params().await,
            Err(VnaError::NotConnected)
        ));
        assert!(matches!(
            driver.configure_frequency(&SweepConfig::default()).await,
            Err(VnaError::NotConnected)
        ));
        driver.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_frequency_not_overridden_writes_nothing() {
        let vna = SimulatedVna::new();
        let mut driver = connected(&vna).await;
        let config = SweepConfig {
            override_freq_range: false,
            ..SweepConfig::default()
        };
        driver.configure_frequency(&config).await.unwrap();
        assert!(vna.writes().is_empty());
    }

    #[tokio::test]
    async fn test_frequency_override_writes_start_then_stop() {
        let vna = SimulatedVna::new();
        let mut driver = connected(&vna).await;
        let config = SweepConfig {
            start_freq_hz: 10e6,
            stop_freq_hz: 20e6,
            override_freq_range: true,
            ..SweepConfig::default()
        };
        driver.configure_frequency(&config).await.unwrap();
        assert_eq!(
            vna.writes(),
            vec!["SENS1:FREQ:STAR 10000000", "SENS1:FREQ:STOP 20000000"]
        );
    }

    #[tokio::test]
    async fn test_measurement_configuration_respects_overrides() {
        let vna = SimulatedVna::new();
        let mut driver = connected(&vna).await;
        let config = SweepConfig {
            points: 101,
            enable_averaging: true,
            averaging_count: 8,
            override_points: false,
            override_averaging_count: true,
            ..SweepConfig::default()
        };
        driver.configure_measurement(&config).await.unwrap();
        assert_eq!(
            vna.writes(),
            vec![
                "FORM:DATA ASCII",
                "SENS1:SWE:TYPE LIN",
                "SENS1:AVER:STAT ON",
                "SENS1:AVER:COUN 8",
            ]
        );
    }

    #[tokio::test]
    async fn test_setup_sparameters_sequence() {
        let vna = SimulatedVna::new();
        let mut driver = connected(&vna).await;
        driver.setup_sparameters().await.unwrap();
        assert_eq!(
            vna.writes(),
            vec![
                "CALC1:PAR:COUN 4",
                "CALC1:PAR1:DEF S11",
                "CALC1:PAR1:SEL",
                "CALC1:PAR2:DEF S21",
                "CALC1:PAR2:SEL",
                "CALC1:PAR3:DEF S12",
                "CALC1:PAR3:SEL",
                "CALC1:PAR4:DEF S22",
                "CALC1:PAR4:SEL",
                "CALC1:PAR1:SEL",
            ]
        );
        assert_eq!(vna.parameter_count(), 4);
        assert_eq!(vna.trace_definition(3), Some(SParameter::S12));
        assert_eq!(vna.selected_trace(), 1);
    }

    #[tokio::test]
    async fn test_trigger_sweep_sequence() {
        let vna = SimulatedVna::new().with_opc(OpcBehavior::AfterPolls(3));
        let mut driver = connected(&vna).await;
        driver.trigger_sweep().await.unwrap();
        assert_eq!(
            vna.writes(),
            vec!["ABOR", "INIT1:CONT OFF", "TRIG:SOUR BUS", "INIT1"]
        );
        assert_eq!(vna.queries(), vec!["*OPC?"; 4]);
        assert_eq!(driver.state(), DriverState::Connected);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_sweep_timeout() {
        let vna = SimulatedVna::new().with_opc(OpcBehavior::Never);
        let mut timing = DriverTiming::without_delays();
        timing.sweep_timeout = Duration::from_millis(200);
        timing.opc_poll_interval = Duration::from_millis(10);
        let mut driver = HpE5071b::new(Arc::new(vna.clone()), timing);
        driver
            .connect(&InstrumentAddress::new("10.0.0.5"), &no_progress)
            .await
            .unwrap();

        let started = std::time::Instant::now();
        let err = driver.trigger_sweep().await.unwrap_err();
        assert!(matches!(err, VnaError::SweepTimeout(d) if d == Duration::from_millis(200)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(driver.is_connected());
        assert!(logs_contain("Sweep did not complete"));
    }

    #[tokio::test]
    async fn test_read_sparameter_reselects_trace() {
        let vna = SimulatedVna::new();
        vna.set_trace_value(SParameter::S12, 0.0, 1.0);
        let mut driver = connected(&vna).await;
        driver.setup_sparameters().await.unwrap();
        vna.clear_history();

        let trace = driver.read_sparameter(SParameter::S12).await.unwrap();
        assert_eq!(vna.writes(), vec!["CALC1:PAR3:SEL"]);
        assert_eq!(vna.queries(), vec!["CALC1:DATA:SDAT?"]);
        assert!(trace.magnitude_db.iter().all(|m| m.abs() < 1e-9));
        assert!(trace.phase_deg.iter().all(|p| (p - 90.0).abs() < 1e-9));
    }

    #[tokio::test]
    async fn test_trigger_state_round_trip() {
        let vna = SimulatedVna::new();
        let original = TriggerState {
            source: TriggerSource::External,
            continuous: false,
        };
        vna.set_trigger_state(original);
        let mut driver = connected(&vna).await;

        let saved = driver.save_trigger_state().await.unwrap();
        assert_eq!(saved, original);
        driver.trigger_sweep().await.unwrap();
        assert_eq!(vna.trigger_state().source, TriggerSource::Bus);
        driver.restore_trigger_state(saved).await.unwrap();
        assert_eq!(vna.trigger_state(), original);
    }

    #[tokio::test]
    async fn test_perform_measurement() {
        let vna = SimulatedVna::new();
        let mut driver = connected(&vna).await;
        let config = SweepConfig {
            start_freq_hz: 1e6,
            stop_freq_hz: 2e6,
            points: 11,
            override_freq_range: true,
            ..SweepConfig::default()
        };

        let result = driver.perform_measurement(&config, &no_progress).await.unwrap();
        assert_eq!(result.points(), 11);
        assert_eq!(result.span_hz(), Some((1e6, 2e6)));
        assert_eq!(result.sparams.parameters(), SParameter::ALL.to_vec());
        for (_, trace) in result.sparams.iter() {
            assert_eq!(trace.len(), 11);
            assert!(trace.magnitude_db.iter().all(|m| m.abs() < 1e-9));
        }
        assert_eq!(
            vna.trigger_state(),
            TriggerState {
                source: TriggerSource::Internal,
                continuous: true
            }
        );
    }

    #[tokio::test]
    async fn test_measurement_length_mismatch_restores_trigger() {
        let vna = SimulatedVna::new();
        vna.set_trace_points(SParameter::S21, 5);
        let mut driver = connected(&vna).await;

        let err = driver
            .perform_measurement(&SweepConfig::default(), &no_progress)
            .await
            .unwrap_err();
        assert!(matches!(err, VnaError::InvalidResponse(_)));
        assert!(driver.is_connected());
        assert_eq!(vna.trigger_state().source, TriggerSource::Internal);
        assert!(vna.trigger_state().continuous);
    }

    #[tokio::test]
    async fn test_read_current_params() {
        let vna = SimulatedVna::new();
        let mut driver = connected(&vna).await;
        let params = driver.read_current_params().await.unwrap();
        assert_eq!(params.start_freq_hz, Some(300e3));
        assert_eq!(params.stop_freq_hz, Some(3e9));
        assert_eq!(params.points, Some(201));
        assert_eq!(params.averaging_enabled, Some(false));
        assert_eq!(params.averaging_count, Some(16));
        assert!(vna.writes().is_empty());
    }

    #[tokio::test]
    async fn test_read_current_params_tolerates_failed_query() {
        let vna = SimulatedVna::new();
        let mut driver = connected(&vna).await;
        vna.fail_on("SENS1:AVER");
        let params = driver.read_current_params().await.unwrap();
        assert_eq!(params.points, Some(201));
        assert_eq!(params.averaging_enabled, None);
        assert_eq!(params.averaging_count, None);
    }

    #[tokio::test]
    async fn test_reset_waits_for_completion() {
        let vna = SimulatedVna::new();
        let mut driver = connected(&vna).await;
        driver.reset().await.unwrap();
        assert_eq!(vna.writes(), vec!["*RST"]);
        assert_eq!(vna.queries(), vec!["*OPC?"]);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let vna = SimulatedVna::new();
        let mut driver = connected(&vna).await;
        driver.disconnect().await.unwrap();
        driver.disconnect().await.unwrap();
        assert_eq!(vna.close_count(), 1);
        assert_eq!(driver.idn(), None);
        assert_eq!(driver.state(), DriverState::Disconnected);
    }
}
