//! Simulated network analyzer for testing
//!
//! [`SimulatedVna`] is a [`Connector`] whose transports talk to an in-memory
//! E5071-style instrument instead of hardware. It provides:
//! - SCPI state tracking (sweep settings, trace definitions, trigger mode)
//! - Canned trace data per S-parameter
//! - Controllable failure injection (unreachable host, open failure, failing command)
//! - Call logging for test verification
//!
//! Clones share state, so a test keeps one handle for inspection and hands
//! another to the worker.

use super::{Connector, ScpiTransport};
use crate::instrument::InstrumentAddress;
use crate::measurement::{SParameter, TriggerSource, TriggerState};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Identification string reported by default.
pub const SIMULATED_IDN: &str = "HEWLETT-PACKARD,E5071B,MY12345678,A.01.02";

/// How `*OPC?` answers after a sweep was started with `INIT1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpcBehavior {
    /// Complete on the first poll
    Immediate,
    /// Answer "0" this many times, then "+1"
    AfterPolls(u32),
    /// Never complete
    Never,
}

struct SimState {
    idn: String,
    reachable: bool,
    fail_open: bool,
    fail_prefix: Option<String>,
    opc: OpcBehavior,
    pending_polls: u32,
    start_hz: f64,
    stop_hz: f64,
    points: u32,
    averaging: bool,
    averaging_count: u32,
    trigger: TriggerState,
    parameter_count: u32,
    definitions: HashMap<u32, SParameter>,
    selected: u32,
    trace_values: HashMap<SParameter, (f64, f64)>,
    trace_points: HashMap<SParameter, usize>,
    writes: Vec<String>,
    queries: Vec<String>,
    open_count: usize,
    close_count: usize,
}

impl SimState {
    fn new() -> Self {
        Self {
            idn: SIMULATED_IDN.to_string(),
            reachable: true,
            fail_open: false,
            fail_prefix: None,
            opc: OpcBehavior::Immediate,
            pending_polls: 0,
            start_hz: 300e3,
            stop_hz: 3e9,
            points: 201,
            averaging: false,
            averaging_count: 16,
            trigger: TriggerState {
                source: TriggerSource::Internal,
                continuous: true,
            },
            parameter_count: 1,
            definitions: HashMap::new(),
            selected: 1,
            trace_values: HashMap::new(),
            trace_points: HashMap::new(),
            writes: Vec::new(),
            queries: Vec::new(),
            open_count: 0,
            close_count: 0,
        }
    }

    fn check_failure(&self, command: &str) -> Result<()> {
        match &self.fail_prefix {
            Some(prefix) if command.starts_with(prefix.as_str()) => {
                bail!("Injected failure on '{}'", command)
            }
            _ => Ok(()),
        }
    }

    fn frequencies(&self) -> Vec<f64> {
        let n = self.points.max(1) as usize;
        if n == 1 {
            return vec![self.start_hz];
        }
        let step = (self.stop_hz - self.start_hz) / (n - 1) as f64;
        (0..n).map(|i| self.start_hz + step * i as f64).collect()
    }

    fn selected_parameter(&self) -> SParameter {
        self.definitions
            .get(&self.selected)
            .copied()
            .or_else(|| {
                SParameter::ALL
                    .iter()
                    .copied()
                    .find(|p| u32::from(p.trace_index()) == self.selected)
            })
            .unwrap_or(SParameter::S11)
    }

    fn apply_write(&mut self, command: &str) -> Result<()> {
        let (header, argument) = match command.split_once(' ') {
            Some((h, a)) => (h, Some(a.trim())),
            None => (command, None),
        };
        let arg = || argument.ok_or_else(|| anyhow!("Missing parameter for '{}'", header));

        match header {
            "SENS1:FREQ:STAR" => self.start_hz = arg()?.parse()?,
            "SENS1:FREQ:STOP" => self.stop_hz = arg()?.parse()?,
            "SENS1:SWE:POIN" => self.points = arg()?.parse()?,
            "SENS1:AVER:STAT" => self.averaging = arg()? == "ON",
            "SENS1:AVER:COUN" => self.averaging_count = arg()?.parse()?,
            "CALC1:PAR:COUN" => self.parameter_count = arg()?.parse()?,
            "TRIG:SOUR" => {
                self.trigger.source = TriggerSource::from_scpi(arg()?)
                    .ok_or_else(|| anyhow!("Illegal trigger source in '{}'", command))?
            }
            "INIT1:CONT" => self.trigger.continuous = arg()? == "ON",
            "INIT1" => {
                self.pending_polls = match self.opc {
                    OpcBehavior::Immediate | OpcBehavior::Never => 0,
                    OpcBehavior::AfterPolls(n) => n,
                }
            }
            "ABOR" | "*RST" | "FORM:DATA" | "SENS1:SWE:TYPE" => {}
            _ => {
                let index = header
                    .strip_prefix("CALC1:PAR")
                    .and_then(|rest| rest.split_once(':'))
                    .and_then(|(n, verb)| Some((n.parse::<u32>().ok()?, verb)));
                match index {
                    Some((n, "DEF")) => {
                        let parameter = arg()?.parse::<SParameter>().map_err(|e| anyhow!(e))?;
                        self.definitions.insert(n, parameter);
                    }
                    Some((n, "SEL")) => self.selected = n,
                    _ => bail!("Undefined header '{}'", header),
                }
            }
        }
        Ok(())
    }

    fn answer_query(&mut self, command: &str) -> Result<String> {
        let bool_text = |b: bool| (if b { "1" } else { "0" }).to_string();
        let response = match command {
            "*IDN?" => self.idn.clone(),
            "*OPC?" => match self.opc {
                OpcBehavior::Never => "0".to_string(),
                _ if self.pending_polls > 0 => {
                    self.pending_polls -= 1;
                    "0".to_string()
                }
                _ => "+1".to_string(),
            },
            "TRIG:SOUR?" => self.trigger.source.as_scpi().to_string(),
            "INIT1:CONT?" => bool_text(self.trigger.continuous),
            "SENS1:FREQ:STAR?" => format!("{:E}", self.start_hz),
            "SENS1:FREQ:STOP?" => format!("{:E}", self.stop_hz),
            "SENS1:SWE:POIN?" => self.points.to_string(),
            "SENS1:AVER:STAT?" => bool_text(self.averaging),
            "SENS1:AVER:COUN?" => self.averaging_count.to_string(),
            "SENS1:FREQ:DATA?" => join_values(&self.frequencies()),
            "CALC1:DATA:SDAT?" => {
                let parameter = self.selected_parameter();
                let (re, im) = self
                    .trace_values
                    .get(&parameter)
                    .copied()
                    .unwrap_or((1.0, 0.0));
                let n = self
                    .trace_points
                    .get(&parameter)
                    .copied()
                    .unwrap_or(self.points as usize);
                let values: Vec<f64> = (0..n).flat_map(|_| [re, im]).collect();
                join_values(&values)
            }
            _ => bail!("Undefined header '{}'", command),
        };
        Ok(response)
    }
}

fn join_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{:E}", v))
        .collect::<Vec<_>>()
        .join(",")
}

/// In-memory analyzer; see the module docs.
#[derive(Clone)]
pub struct SimulatedVna {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedVna {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedVna {
    /// Create a reachable E5071B with internal continuous triggering
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the `*IDN?` answer
    pub fn with_idn(self, idn: &str) -> Self {
        self.lock().idn = idn.to_string();
        self
    }

    /// Set the `*OPC?` behavior
    pub fn with_opc(self, behavior: OpcBehavior) -> Self {
        self.lock().opc = behavior;
        self
    }

    /// Make the reachability probe fail
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Make `open` fail although the host is reachable
    pub fn set_fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    /// Fail every command starting with `prefix`
    pub fn fail_on(&self, prefix: &str) {
        self.lock().fail_prefix = Some(prefix.to_string());
    }

    /// Remove the injected command failure
    pub fn clear_failure(&self) {
        self.lock().fail_prefix = None;
    }

    /// Complex value returned at every point of `parameter`'s trace
    pub fn set_trace_value(&self, parameter: SParameter, re: f64, im: f64) {
        self.lock().trace_values.insert(parameter, (re, im));
    }

    /// Force `parameter`'s trace to `points` points regardless of the sweep setting
    pub fn set_trace_points(&self, parameter: SParameter, points: usize) {
        self.lock().trace_points.insert(parameter, points);
    }

    /// Preset the instrument trigger configuration
    pub fn set_trigger_state(&self, state: TriggerState) {
        self.lock().trigger = state;
    }

    /// Current trigger configuration
    pub fn trigger_state(&self) -> TriggerState {
        self.lock().trigger
    }

    /// Current start/stop frequency and points
    pub fn sweep_settings(&self) -> (f64, f64, u32) {
        let state = self.lock();
        (state.start_hz, state.stop_hz, state.points)
    }

    /// Current averaging state and count
    pub fn averaging(&self) -> (bool, u32) {
        let state = self.lock();
        (state.averaging, state.averaging_count)
    }

    /// Parameter defined on trace `index`, if any
    pub fn trace_definition(&self, index: u32) -> Option<SParameter> {
        self.lock().definitions.get(&index).copied()
    }

    /// Last value written with `CALC1:PAR:COUN`
    pub fn parameter_count(&self) -> u32 {
        self.lock().parameter_count
    }

    /// Currently selected trace index
    pub fn selected_trace(&self) -> u32 {
        self.lock().selected
    }

    /// All writes received, in order
    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.clone()
    }

    /// All queries received, in order
    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }

    /// Clear the write and query logs
    pub fn clear_history(&self) {
        let mut state = self.lock();
        state.writes.clear();
        state.queries.clear();
    }

    /// Number of sessions opened
    pub fn open_count(&self) -> usize {
        self.lock().open_count
    }

    /// Number of sessions closed
    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }
}

#[async_trait]
impl Connector for SimulatedVna {
    async fn probe(&self, _host: &str, _timeout: Duration) -> bool {
        self.lock().reachable
    }

    async fn open(
        &self,
        address: &InstrumentAddress,
        _timeout: Duration,
    ) -> Result<Box<dyn ScpiTransport>> {
        let resource = address.resource_string()?;
        let mut state = self.lock();
        if state.fail_open {
            bail!("Injected open failure for {}", resource);
        }
        state.open_count += 1;
        Ok(Box::new(SimulatedTransport {
            state: self.state.clone(),
            resource,
            open: true,
        }))
    }
}

/// Session on a [`SimulatedVna`].
struct SimulatedTransport {
    state: Arc<Mutex<SimState>>,
    resource: String,
    open: bool,
}

impl SimulatedTransport {
    fn lock(&self) -> Result<MutexGuard<'_, SimState>> {
        if !self.open {
            bail!("Session '{}' is closed", self.resource);
        }
        Ok(self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl ScpiTransport for SimulatedTransport {
    async fn write(&mut self, command: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.writes.push(command.to_string());
        state.check_failure(command)?;
        state.apply_write(command)
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        let mut state = self.lock()?;
        state.queries.push(command.to_string());
        state.check_failure(command)?;
        state.answer_query(command)
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .close_count += 1;
        }
        Ok(())
    }

    fn resource_name(&self) -> &str {
        &self.resource
    }
}
