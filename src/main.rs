//! `vna_measure`: connect, sweep, export one `.s2p` file, disconnect.
//!
//! ```text
//! vna_measure --host 192.168.1.100
//! vna_measure --host 192.168.1.100 --start-freq 10 --stop-freq 1000 --points 201 --set-freq-range
//! vna_measure --config lab.toml --sparams S11,S21 --freq-unit GHz
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use vna_daq::adapters::NetworkConnector;
use vna_daq::config::{VnaConfig, DEFAULT_CONFIG_PATH};
use vna_daq::data::touchstone;
use vna_daq::instrument::DriverRegistry;
use vna_daq::measurement::{MeasurementResult, SParameter};
use vna_daq::messages::{WorkerCommand, WorkerResponse};
use vna_daq::MeasurementWorker;

/// Extra wait on top of the driver timeouts before the runner gives up on a response.
const RESPONSE_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "vna_measure", version, about = "Run one VNA sweep and save it as Touchstone")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// VNA IP address (e.g. 192.168.1.100)
    #[arg(long, help_heading = "Connection")]
    host: Option<String>,

    /// VISA device name, or TCP port with --suffix SOCKET
    #[arg(long, help_heading = "Connection")]
    port: Option<String>,

    /// VISA resource class (INSTR or SOCKET)
    #[arg(long, help_heading = "Connection")]
    suffix: Option<String>,

    /// Command timeout in milliseconds
    #[arg(long, help_heading = "Connection")]
    timeout: Option<u64>,

    /// Start frequency in MHz
    #[arg(long, help_heading = "Frequency")]
    start_freq: Option<f64>,

    /// Stop frequency in MHz
    #[arg(long, help_heading = "Frequency")]
    stop_freq: Option<f64>,

    /// Frequency unit of the output file
    #[arg(long, value_parser = ["Hz", "kHz", "MHz", "GHz"], help_heading = "Frequency")]
    freq_unit: Option<String>,

    /// Number of sweep points
    #[arg(long, help_heading = "Measurement")]
    points: Option<u32>,

    /// Enable averaging
    #[arg(long, help_heading = "Measurement")]
    averaging: bool,

    /// Averaging count
    #[arg(long, help_heading = "Measurement")]
    avg_count: Option<u32>,

    /// Write the frequency range to the VNA
    #[arg(long, help_heading = "Overrides")]
    set_freq_range: bool,

    /// Write the sweep points to the VNA
    #[arg(long, help_heading = "Overrides")]
    set_sweep_points: bool,

    /// Write the averaging count to the VNA
    #[arg(long, help_heading = "Overrides")]
    set_avg_count: bool,

    /// Output folder
    #[arg(long, help_heading = "Output")]
    output_folder: Option<PathBuf>,

    /// Prefix of the generated file name
    #[arg(long, help_heading = "Output")]
    filename_prefix: Option<String>,

    /// File name to use instead of the generated one
    #[arg(long, alias = "custom-filename", help_heading = "Output")]
    filename: Option<String>,

    /// Exported S-parameters, comma separated (e.g. S11,S21)
    #[arg(long, value_delimiter = ',', help_heading = "Output")]
    sparams: Vec<SParameter>,

    /// Print a JSON summary after saving
    #[arg(long, help_heading = "Output")]
    json: bool,
}

impl Cli {
    fn apply(&self, config: &mut VnaConfig) {
        if let Some(host) = &self.host {
            config.connection.host = host.clone();
        }
        if let Some(port) = &self.port {
            config.connection.port = port.clone();
        }
        if let Some(suffix) = &self.suffix {
            config.connection.suffix = suffix.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timing.command_timeout_ms = timeout;
        }

        let sweep = &mut config.sweep;
        if let Some(start) = self.start_freq {
            sweep.start_freq_hz = start * 1e6;
        }
        if let Some(stop) = self.stop_freq {
            sweep.stop_freq_hz = stop * 1e6;
        }
        if let Some(points) = self.points {
            sweep.points = points;
        }
        if self.averaging {
            sweep.enable_averaging = true;
        }
        if let Some(count) = self.avg_count {
            sweep.averaging_count = count;
        }
        if self.set_freq_range {
            sweep.override_freq_range = true;
        }
        if self.set_sweep_points {
            sweep.override_points = true;
        }
        if self.set_avg_count {
            sweep.override_averaging_count = true;
        }

        let output = &mut config.output;
        if let Some(unit) = &self.freq_unit {
            output.freq_unit = unit.clone();
        }
        if let Some(folder) = &self.output_folder {
            output.folder = folder.clone();
        }
        if let Some(prefix) = &self.filename_prefix {
            output.filename_prefix = prefix.clone();
        }
        if !self.sparams.is_empty() {
            output.sparams = self.sparams.iter().map(|p| p.to_string()).collect();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.application.log_level)),
        )
        .with_target(false)
        .init();

    if cli.print_config {
        return match toml::to_string_pretty(&config) {
            Ok(text) => {
                print!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    match run(&cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<VnaConfig> {
    let mut config = VnaConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn run(cli: &Cli, config: VnaConfig) -> Result<()> {
    if config.connection.host.trim().is_empty() {
        bail!("No host IP configured. Use --host or set connection.host in the config file");
    }

    let timing = config.timing.driver_timing();
    let mut worker = MeasurementWorker::new(
        Arc::new(DriverRegistry::builtin()),
        Arc::new(NetworkConnector),
        timing,
    );
    worker.start();

    let outcome = measure(&mut worker, &config).await;

    worker.send_command(WorkerCommand::Disconnect);
    if let Err(e) = await_terminal(&mut worker, timing.command_timeout + RESPONSE_GRACE).await {
        warn!("Disconnect: {:#}", e);
    }
    worker.stop(config.timing.shutdown_timeout()).await;

    let result = outcome?;
    println!("Measurement complete: {} points", result.points());

    let mut selection = config.output.selected_parameters()?;
    if selection.is_empty() {
        println!("Warning: No S-parameters selected for export, exporting all");
        selection = SParameter::ALL.to_vec();
    }
    let exported = MeasurementResult::new(
        result.frequencies_hz.clone(),
        result.sparams.subset(&selection),
    );

    let path = touchstone::export(
        &exported,
        &config.output.folder,
        cli.filename.as_deref(),
        &config.output.filename_prefix,
        &config.output.touchstone_options()?,
    )?;
    println!("S2P file saved: {}", path.display());

    if cli.json {
        let summary = serde_json::json!({
            "file": path.display().to_string(),
            "points": exported.points(),
            "span_hz": exported.span_hz(),
            "sparams": exported.sparams.parameters(),
            "sweep": &config.sweep,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

async fn measure(worker: &mut MeasurementWorker, config: &VnaConfig) -> Result<MeasurementResult> {
    let timing = config.timing.driver_timing();

    println!("Connecting to VNA at {}...", config.connection.host);
    worker.send_command(WorkerCommand::Connect(config.connection.clone()));
    let connect_budget = timing.probe_timeout * 2 + timing.command_timeout * 2 + RESPONSE_GRACE;
    match await_terminal(worker, connect_budget).await? {
        WorkerResponse::Connected(idn) => println!("Connected: {}", idn),
        WorkerResponse::Error(message) => bail!(message),
        other => bail!("Unexpected response to CONNECT: {:?}", other.kind()),
    }

    println!("Starting measurement...");
    worker.send_command(WorkerCommand::Measure(config.sweep.clone()));
    let measure_budget = timing.sweep_timeout + timing.operation_timeout + RESPONSE_GRACE;
    match await_terminal(worker, measure_budget).await? {
        WorkerResponse::MeasurementComplete(result) => Ok(*result),
        WorkerResponse::Error(message) => bail!(message),
        other => bail!("Unexpected response to MEASURE: {:?}", other.kind()),
    }
}

/// Print progress until the terminal response of the last sent command arrives.
///
/// Terminal responses of earlier commands that timed out are discarded.
async fn await_terminal(worker: &mut MeasurementWorker, budget: Duration) -> Result<WorkerResponse> {
    let deadline = Instant::now() + budget;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            bail!("No response from the measurement worker within {:?}", budget);
        }
        match worker.get_response(remaining.min(Duration::from_millis(250))).await {
            Some(WorkerResponse::Progress(update)) => {
                println!("  {} ({:.0}%)", update.message, update.percent);
            }
            Some(WorkerResponse::Log(entry)) => debug!("[{}] {}", entry.direction, entry.message),
            Some(response) if worker.outstanding() > 0 => {
                warn!("Discarding late {:?} response", response.kind());
            }
            Some(response) => {
                info!("Worker responded {:?}", response.kind());
                return Ok(response);
            }
            None if !worker.is_running() => bail!("Measurement worker stopped unexpectedly"),
            None => {}
        }
    }
}
