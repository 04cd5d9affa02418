//! Hardware adapter implementations
//!
//! This module contains the transport seam of the crate: [`ScpiTransport`] is
//! the write/query interface a driver talks to, and [`Connector`] opens one for
//! an [`InstrumentAddress`] after a cheap reachability probe.
//!
//! Implementations:
//! - [`socket_adapter::SocketAdapter`]: raw SCPI over TCP (`::SOCKET` resources)
//! - [`visa_adapter::VisaAdapter`]: VISA sessions (`instrument_visa` feature)
//! - [`logging_adapter::LoggingTransport`]: decorator mirroring traffic to a log sink
//! - [`mock_adapter::SimulatedVna`]: in-memory analyzer for tests

pub mod logging_adapter;
pub mod mock_adapter;
pub mod socket_adapter;
pub mod visa_adapter;

pub use logging_adapter::{LogSink, LoggingConnector, LoggingTransport};
pub use mock_adapter::SimulatedVna;
pub use socket_adapter::SocketAdapter;
pub use visa_adapter::VisaAdapter;

use crate::instrument::InstrumentAddress;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// VXI-11 portmapper port.
pub const VXI11_PORTMAPPER_PORT: u16 = 111;

/// Raw SCPI socket port.
pub const SCPI_RAW_PORT: u16 = 5025;

/// Ports tried by the reachability probe, in order.
pub const PROBE_PORTS: [u16; 2] = [VXI11_PORTMAPPER_PORT, SCPI_RAW_PORT];

/// Open session with an instrument.
///
/// Commands are passed without terminator; implementations append their own.
/// Responses are returned with the line terminator removed.
#[async_trait]
pub trait ScpiTransport: Send {
    /// Send a command without reading a response.
    async fn write(&mut self, command: &str) -> Result<()>;

    /// Send a query and read one response line.
    async fn query(&mut self, command: &str) -> Result<String>;

    /// Send a query and parse a comma-separated list of numbers.
    async fn query_values(&mut self, command: &str) -> Result<Vec<f64>> {
        let response = self.query(command).await?;
        parse_ascii_values(&response)
            .with_context(|| format!("Failed to parse ASCII values for: {}", command))
    }

    /// Release the session. Calling it twice is harmless.
    async fn close(&mut self) -> Result<()>;

    /// Resource string this session was opened on.
    fn resource_name(&self) -> &str;
}

/// Opens transports. Shared by every driver the worker constructs.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns true if anything answers on the probe ports within `timeout` each.
    async fn probe(&self, host: &str, timeout: Duration) -> bool {
        probe_tcp(host, &PROBE_PORTS, timeout).await
    }

    /// Open a session on `address`. `timeout` bounds each I/O operation.
    async fn open(
        &self,
        address: &InstrumentAddress,
        timeout: Duration,
    ) -> Result<Box<dyn ScpiTransport>>;
}

/// Tries a TCP connect on each port; true on the first success.
pub async fn probe_tcp(host: &str, ports: &[u16], timeout: Duration) -> bool {
    for &port in ports {
        match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => {
                debug!("Probe {}:{} answered", host, port);
                return true;
            }
            Ok(Err(e)) => debug!("Probe {}:{} refused: {}", host, port, e),
            Err(_) => debug!("Probe {}:{} timed out after {:?}", host, port, timeout),
        }
    }
    false
}

/// Parses an ASCII SCPI number list ("1.0E6,2.0E6,...").
pub fn parse_ascii_values(response: &str) -> Result<Vec<f64>> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split(',')
        .map(|token| {
            let token = token.trim();
            token
                .parse::<f64>()
                .with_context(|| format!("Invalid numeric value '{}'", token))
        })
        .collect()
}

/// Connector for real instruments.
///
/// `SOCKET` resources go through [`SocketAdapter`], everything else through
/// [`VisaAdapter`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkConnector;

#[async_trait]
impl Connector for NetworkConnector {
    async fn open(
        &self,
        address: &InstrumentAddress,
        timeout: Duration,
    ) -> Result<Box<dyn ScpiTransport>> {
        if address.is_socket() {
            let port = address.socket_port().with_context(|| {
                format!("Socket resource needs a numeric port, got '{}'", address.port)
            })?;
            let adapter = SocketAdapter::connect(&address.host, port, timeout).await?;
            Ok(Box::new(adapter))
        } else {
            let adapter = VisaAdapter::open(address.resource_string()?, timeout).await?;
            Ok(Box::new(adapter))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_ascii_values() {
        let values = parse_ascii_values("+1.0E+06, 2.5E6,-3\n").unwrap();
        assert_eq!(values, vec![1.0e6, 2.5e6, -3.0]);
        assert!(parse_ascii_values("").unwrap().is_empty());
        assert!(parse_ascii_values("1,abc").is_err());
    }

    #[tokio::test]
    async fn test_probe_finds_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(probe_tcp("127.0.0.1", &[port], Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn test_probe_fails_on_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!probe_tcp("127.0.0.1", &[port], Duration::from_millis(200)).await);
    }
}
