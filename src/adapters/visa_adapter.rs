//! VISA Hardware Adapter for GPIB/USB/Ethernet instruments
//!
//! Wraps the visa-rs crate for `TCPIP0::<host>::inst0::INSTR` style resources.
//! VISA calls are synchronous, so every I/O runs on Tokio's blocking pool.
//! Without the `instrument_visa` feature opening a session fails with a
//! rebuild hint.

use super::ScpiTransport;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "instrument_visa")]
use anyhow::Context;
#[cfg(feature = "instrument_visa")]
use std::io::{BufRead, BufReader, Write};
#[cfg(feature = "instrument_visa")]
use std::sync::Arc;
#[cfg(feature = "instrument_visa")]
use tokio::sync::Mutex;
#[cfg(feature = "instrument_visa")]
use tracing::debug;
#[cfg(feature = "instrument_visa")]
use visa_rs::prelude::*;

/// VISA session.
///
/// Supports resource strings like:
/// - "TCPIP0::192.168.1.100::inst0::INSTR" (VXI-11)
/// - "TCPIP0::192.168.1.100::hislip0::INSTR" (HiSLIP)
/// - "GPIB0::17::INSTR" (GPIB)
#[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
pub struct VisaAdapter {
    /// VISA resource string
    pub(crate) resource_string: String,

    /// Open and read/write timeout
    pub(crate) timeout: Duration,

    /// Line terminator for commands (typically "\n" for SCPI)
    pub(crate) line_terminator: String,

    /// The actual VISA instrument (behind Arc<Mutex> for async access)
    #[cfg(feature = "instrument_visa")]
    instrument: Option<Arc<Mutex<Instrument>>>,
}

impl VisaAdapter {
    /// Open `resource_string` with `timeout` as open and I/O timeout.
    #[cfg(feature = "instrument_visa")]
    pub async fn open(resource_string: String, timeout: Duration) -> Result<Self> {
        let resource = resource_string.clone();
        let instrument = tokio::task::spawn_blocking(move || {
            let rm = DefaultRM::new()
                .map_err(|e| anyhow!("Failed to create VISA resource manager: {:?}", e))?;
            let c_string = std::ffi::CString::new(resource.clone())
                .context("Resource string contains a NUL byte")?;
            let visa_string = visa_rs::VisaString::from(c_string);
            rm.open(&visa_string, AccessMode::NO_LOCK, timeout)
                .map_err(|e| anyhow!("Failed to open VISA resource {}: {:?}", resource, e))
        })
        .await
        .context("VISA open task panicked")??;

        debug!(
            "VISA resource '{}' opened with {}ms timeout",
            resource_string,
            timeout.as_millis()
        );

        Ok(Self {
            resource_string,
            timeout,
            line_terminator: "\n".to_string(),
            instrument: Some(Arc::new(Mutex::new(instrument))),
        })
    }

    #[cfg(not(feature = "instrument_visa"))]
    pub async fn open(resource_string: String, timeout: Duration) -> Result<Self> {
        let _ = (resource_string, timeout);
        Err(anyhow!(
            "VISA support not enabled. Rebuild with --features instrument_visa"
        ))
    }

    /// Set line terminator for commands
    pub fn with_line_terminator(mut self, terminator: String) -> Self {
        self.line_terminator = terminator;
        self
    }

    /// Returns true while the VISA session is open.
    pub fn is_connected(&self) -> bool {
        #[cfg(feature = "instrument_visa")]
        {
            self.instrument.is_some()
        }

        #[cfg(not(feature = "instrument_visa"))]
        {
            false
        }
    }

    /// Write `command`, then read one line if `read_response` is set.
    #[cfg(feature = "instrument_visa")]
    async fn transact(&self, command: &str, read_response: bool) -> Result<String> {
        let instrument = self
            .instrument
            .as_ref()
            .ok_or_else(|| anyhow!("VISA instrument not connected"))?
            .clone();

        let command_str = format!("{}{}", command, self.line_terminator);
        let command_for_log = command.to_string();

        let io = tokio::task::spawn_blocking(move || {
            let mut instr_guard = instrument.blocking_lock();

            instr_guard
                .write_all(command_str.as_bytes())
                .with_context(|| format!("VISA write failed for: {}", command_for_log))?;

            if !read_response {
                debug!("VISA write sent: {}", command_for_log);
                return Ok(String::new());
            }

            let mut response = String::new();
            BufReader::new(&*instr_guard)
                .read_line(&mut response)
                .with_context(|| format!("VISA query failed for: {}", command_for_log))?;
            let response = response.trim_end_matches(['\r', '\n']).to_string();
            debug!("VISA query '{}' -> '{}'", command_for_log, response);
            Ok(response)
        });

        tokio::time::timeout(self.timeout, io)
            .await
            .map_err(|_| anyhow!("VISA I/O timed out after {:?} for: {}", self.timeout, command))?
            .context("VISA I/O task panicked")?
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn transact(&self, _command: &str, _read_response: bool) -> Result<String> {
        Err(anyhow!(
            "VISA support not enabled. Rebuild with --features instrument_visa"
        ))
    }
}

#[async_trait]
impl ScpiTransport for VisaAdapter {
    async fn write(&mut self, command: &str) -> Result<()> {
        self.transact(command, false).await.map(|_| ())
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        self.transact(command, true).await
    }

    async fn close(&mut self) -> Result<()> {
        #[cfg(feature = "instrument_visa")]
        {
            if self.instrument.take().is_some() {
                debug!("VISA resource '{}' closed", self.resource_string);
            }
        }
        Ok(())
    }

    fn resource_name(&self) -> &str {
        &self.resource_string
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "instrument_visa"))]
    #[tokio::test]
    async fn test_open_without_feature_fails() {
        let err = VisaAdapter::open(
            "TCPIP0::192.168.1.100::inst0::INSTR".to_string(),
            Duration::from_secs(5),
        )
        .await
        .err()
        .unwrap();
        assert!(err.to_string().contains("instrument_visa"));
    }
}
