//! Background measurement worker
//!
//! The worker owns the instrument connection in a single Tokio task and
//! processes [`WorkerCommand`]s strictly one after another. Callers never touch
//! the driver: they enqueue commands and poll [`WorkerResponse`]s.
//!
//! For each command the worker emits zero or more `Progress`/`Log` messages
//! and then exactly one terminal response. A failing handler produces an
//! `Error` response and the loop keeps running.
//!
//! ```no_run
//! # use vna_daq::worker::MeasurementWorker;
//! # use vna_daq::messages::{WorkerCommand, WorkerResponse};
//! # use vna_daq::instrument::InstrumentAddress;
//! # use std::time::Duration;
//! # async fn demo() {
//! let mut worker = MeasurementWorker::default();
//! worker.start();
//! worker.send_command(WorkerCommand::Connect(InstrumentAddress::new("192.168.1.100")));
//! let (_progress, terminal) = worker.wait_for_terminal(Duration::from_secs(30)).await;
//! if let Some(WorkerResponse::Connected(info)) = terminal {
//!     println!("Connected to {}", info);
//! }
//! worker.stop(Duration::from_secs(5)).await;
//! # }
//! ```

use crate::adapters::{Connector, LogSink, LoggingConnector, NetworkConnector};
use crate::error::{VnaError, VnaResult};
use crate::instrument::{DriverRegistry, DriverTiming, InstrumentAddress, VnaDriver};
use crate::measurement::SweepConfig;
use crate::messages::{LogDirection, LogEntry, WorkerCommand, WorkerResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Default bound for [`MeasurementWorker::stop`].
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Caller-side handle of the worker task.
pub struct MeasurementWorker {
    registry: Arc<DriverRegistry>,
    connector: Arc<dyn Connector>,
    timing: DriverTiming,
    command_tx: mpsc::UnboundedSender<WorkerCommand>,
    command_rx: Option<mpsc::UnboundedReceiver<WorkerCommand>>,
    response_tx: mpsc::UnboundedSender<WorkerResponse>,
    response_rx: mpsc::UnboundedReceiver<WorkerResponse>,
    task: Option<JoinHandle<()>>,
    outstanding: usize,
}

impl Default for MeasurementWorker {
    /// Built-in drivers over real network transports with default timing.
    fn default() -> Self {
        Self::new(
            Arc::new(DriverRegistry::builtin()),
            Arc::new(NetworkConnector),
            DriverTiming::default(),
        )
    }
}

impl MeasurementWorker {
    /// Creates a stopped worker. Commands sent before [`start`](Self::start) are kept.
    pub fn new(
        registry: Arc<DriverRegistry>,
        connector: Arc<dyn Connector>,
        timing: DriverTiming,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            connector,
            timing,
            command_tx,
            command_rx: Some(command_rx),
            response_tx,
            response_rx,
            task: None,
            outstanding: 0,
        }
    }

    /// Spawns the worker task. Does nothing if it is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let command_rx = match self.command_rx.take() {
            Some(rx) => rx,
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.command_tx = tx;
                rx
            }
        };

        let responder = Responder(self.response_tx.clone());
        let log_responder = responder.clone();
        let sink: LogSink =
            Arc::new(move |entry: LogEntry| log_responder.send(WorkerResponse::Log(entry)));
        let connector: Arc<dyn Connector> =
            Arc::new(LoggingConnector::new(self.connector.clone(), sink));

        let worker_loop = WorkerLoop {
            registry: self.registry.clone(),
            connector,
            timing: self.timing,
            responder,
            driver: None,
        };
        self.task = Some(tokio::spawn(worker_loop.run(command_rx)));
    }

    /// Returns true while the worker task is alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Enqueue SHUTDOWN and wait up to `timeout` for the task to end.
    ///
    /// If the task does not finish in time it is left running detached.
    pub async fn stop(&mut self, timeout: Duration) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.send_command(WorkerCommand::Shutdown);

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(())) => debug!("Measurement worker joined"),
            Ok(Err(e)) => error!("Measurement worker task failed: {}", e),
            Err(_) => warn!(
                "Measurement worker did not stop within {:?}, detaching",
                timeout
            ),
        }
    }

    /// Enqueue a command without waiting.
    pub fn send_command(&mut self, command: WorkerCommand) {
        if self.command_tx.send(command).is_err() {
            warn!("Measurement worker has exited, command dropped");
        } else {
            self.outstanding += 1;
        }
    }

    /// Commands sent whose terminal response has not been received yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Next response, or `None` if nothing arrives within `timeout`.
    pub async fn get_response(&mut self, timeout: Duration) -> Option<WorkerResponse> {
        let response = tokio::time::timeout(timeout, self.response_rx.recv())
            .await
            .ok()
            .flatten();
        self.track(response)
    }

    /// Next response if one is already queued.
    pub fn try_get_response(&mut self) -> Option<WorkerResponse> {
        let response = self.response_rx.try_recv().ok();
        self.track(response)
    }

    fn track(&mut self, response: Option<WorkerResponse>) -> Option<WorkerResponse> {
        if response.as_ref().is_some_and(WorkerResponse::is_terminal) {
            self.outstanding = self.outstanding.saturating_sub(1);
        }
        response
    }

    /// Collect responses until a terminal one arrives or `timeout` elapses.
    ///
    /// Returns the intermediate `Progress`/`Log` messages and the terminal
    /// response, which is `None` on timeout.
    pub async fn wait_for_terminal(
        &mut self,
        timeout: Duration,
    ) -> (Vec<WorkerResponse>, Option<WorkerResponse>) {
        let deadline = Instant::now() + timeout;
        let mut intermediate = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.get_response(remaining).await {
                Some(response) if response.is_terminal() => {
                    return (intermediate, Some(response));
                }
                Some(response) => intermediate.push(response),
                None => return (intermediate, None),
            }
        }
    }

    /// Like [`wait_for_terminal`](Self::wait_for_terminal), but answers the most
    /// recently sent command.
    ///
    /// Terminal responses of earlier commands that are still queued (for
    /// example after a previous wait timed out) are skipped and returned with
    /// the intermediate messages.
    pub async fn wait_for_reply(
        &mut self,
        timeout: Duration,
    ) -> (Vec<WorkerResponse>, Option<WorkerResponse>) {
        let deadline = Instant::now() + timeout;
        let mut intermediate = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.get_response(remaining).await {
                Some(response) if response.is_terminal() && self.outstanding == 0 => {
                    return (intermediate, Some(response));
                }
                Some(response) => {
                    if response.is_terminal() {
                        debug!("Skipping late {:?} response", response.kind());
                    }
                    intermediate.push(response);
                }
                None => return (intermediate, None),
            }
        }
    }
}

/// Response queue handle shared by the loop and the traffic sink.
#[derive(Clone)]
struct Responder(mpsc::UnboundedSender<WorkerResponse>);

impl Responder {
    fn send(&self, response: WorkerResponse) {
        // The caller may already be gone during shutdown.
        let _ = self.0.send(response);
    }

    fn progress(&self, message: &str, percent: f64) {
        self.send(WorkerResponse::progress(message, percent));
    }

    fn log(&self, direction: LogDirection, message: impl Into<String>) {
        self.send(WorkerResponse::log(direction, message));
    }
}

/// State owned by the worker task.
struct WorkerLoop {
    registry: Arc<DriverRegistry>,
    connector: Arc<dyn Connector>,
    timing: DriverTiming,
    responder: Responder,
    driver: Option<Box<dyn VnaDriver>>,
}

impl WorkerLoop {
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<WorkerCommand>) {
        info!("Measurement worker started");

        while let Some(command) = command_rx.recv().await {
            debug!("Processing {:?} command", command.kind());
            match command {
                WorkerCommand::Connect(address) => {
                    let result = self.handle_connect(&address).await;
                    self.reply(result, "Connection failed");
                }

                WorkerCommand::Disconnect => {
                    let result = self.handle_disconnect().await;
                    self.reply(result, "Disconnect failed");
                }

                WorkerCommand::ReadParams => {
                    let result = self.handle_read_params().await;
                    self.reply(result, "Failed to read parameters");
                }

                WorkerCommand::Measure(config) => {
                    let result = self.handle_measure(&config).await;
                    self.reply(result, "Measurement failed");
                }

                WorkerCommand::Shutdown => {
                    self.release_driver().await;
                    self.responder.send(WorkerResponse::Disconnected);
                    break;
                }
            }
        }

        // Channel closed without SHUTDOWN: the handle was dropped.
        self.release_driver().await;
        info!("Measurement worker stopped");
    }

    fn reply(&self, result: VnaResult<WorkerResponse>, context: &str) {
        match result {
            Ok(response) => self.responder.send(response),
            Err(e) => {
                error!("{}: {}", context, e);
                self.responder
                    .send(WorkerResponse::Error(format!("{}: {}", context, e)));
            }
        }
    }

    async fn release_driver(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.disconnect().await {
                warn!("Error while disconnecting {}: {}", driver.name(), e);
            }
        }
    }

    /// Probe with the default driver, then bind the driver matching `*IDN?`.
    async fn handle_connect(&mut self, address: &InstrumentAddress) -> VnaResult<WorkerResponse> {
        self.release_driver().await;

        let default = *self
            .registry
            .default_descriptor()
            .ok_or_else(|| VnaError::Configuration("No VNA drivers registered".to_string()))?;

        let responder = self.responder.clone();
        let progress = move |message: &str, percent: f64| responder.progress(message, percent);

        self.responder.progress("Connecting...", 10.0);
        let mut probe = default.build(self.connector.clone(), self.timing);
        let idn = probe.connect(address, &progress).await?;

        self.responder.progress("Detecting VNA type...", 90.0);
        let driver = match self.registry.detect(&idn).copied() {
            None => {
                self.responder.log(
                    LogDirection::Info,
                    format!("No specific driver found for: {}", idn),
                );
                self.responder.log(LogDirection::Info, "Using default driver");
                probe
            }
            Some(matched) if matched.name == probe.name() => probe,
            Some(matched) => {
                probe.disconnect().await?;
                self.responder
                    .log(LogDirection::Info, format!("Detected: {}", matched.name));
                let mut driver = matched.build(self.connector.clone(), self.timing);
                driver.connect(address, &progress).await?;
                driver
            }
        };

        let info = format!("{} [{}]", driver.idn().unwrap_or(&idn), driver.name());
        info!("Connected: {}", info);
        self.driver = Some(driver);
        Ok(WorkerResponse::Connected(info))
    }

    async fn handle_disconnect(&mut self) -> VnaResult<WorkerResponse> {
        if let Some(mut driver) = self.driver.take() {
            driver.disconnect().await?;
        }
        Ok(WorkerResponse::Disconnected)
    }

    fn connected_driver(&mut self) -> VnaResult<&mut Box<dyn VnaDriver>> {
        self.driver
            .as_mut()
            .filter(|driver| driver.is_connected())
            .ok_or(VnaError::NotConnected)
    }

    async fn handle_read_params(&mut self) -> VnaResult<WorkerResponse> {
        let responder = self.responder.clone();
        let driver = self.connected_driver()?;

        responder.progress("Reading VNA parameters...", 50.0);
        let params = driver.read_current_params().await?;
        responder.progress("Done reading parameters", 100.0);
        Ok(WorkerResponse::ParamsRead(params))
    }

    async fn handle_measure(&mut self, config: &SweepConfig) -> VnaResult<WorkerResponse> {
        let responder = self.responder.clone();
        let driver = self.connected_driver()?;

        let progress_responder = responder.clone();
        let progress =
            move |message: &str, percent: f64| progress_responder.progress(message, percent);
        let result = driver.perform_measurement(config, &progress).await?;

        responder.log(
            LogDirection::Debug,
            format!(
                "Sending measurement result: {} freqs, {} sparams",
                result.points(),
                result.sparams.len()
            ),
        );
        Ok(WorkerResponse::MeasurementComplete(Box::new(result)))
    }
}
