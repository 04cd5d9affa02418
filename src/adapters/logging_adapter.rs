//! Traffic-mirroring transport decorator.
//!
//! [`LoggingConnector`] wraps another [`Connector`] so that every transport it
//! opens is a [`LoggingTransport`]. Each command is reported to the sink as a
//! `Tx` entry and each response as an `Rx` entry, with bulk trace data
//! shortened to a summary.

use super::{Connector, ScpiTransport};
use crate::instrument::InstrumentAddress;
use crate::messages::{LogDirection, LogEntry};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Receiver of mirrored traffic.
pub type LogSink = Arc<dyn Fn(LogEntry) + Send + Sync>;

/// Responses longer than this are summarized.
pub const MAX_LOGGED_RESPONSE_LEN: usize = 200;

/// Numeric responses with more values than this are summarized.
pub const MAX_LOGGED_VALUES: usize = 10;

/// Shortens a long comma-separated response to `[N values: a,b,c...]`.
pub fn summarize_response(response: &str) -> String {
    if response.len() <= MAX_LOGGED_RESPONSE_LEN {
        return response.to_string();
    }
    let tokens: Vec<&str> = response.split(',').collect();
    let head: Vec<&str> = tokens.iter().take(3).map(|t| t.trim()).collect();
    format!("[{} values: {}...]", tokens.len(), head.join(","))
}

/// Shortens a long numeric response to `[N values: x.xxxe0,...]`.
pub fn summarize_values(values: &[f64]) -> String {
    if values.len() <= MAX_LOGGED_VALUES {
        let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        return joined.join(",");
    }
    let head: Vec<String> = values.iter().take(3).map(|v| format!("{:.3e}", v)).collect();
    format!("[{} values: {}...]", values.len(), head.join(","))
}

/// Transport decorator reporting traffic to a [`LogSink`].
pub struct LoggingTransport {
    inner: Box<dyn ScpiTransport>,
    sink: LogSink,
}

impl LoggingTransport {
    /// Wraps `inner`.
    pub fn new(inner: Box<dyn ScpiTransport>, sink: LogSink) -> Self {
        Self { inner, sink }
    }

    fn emit(&self, direction: LogDirection, message: String) {
        (self.sink)(LogEntry::new(direction, message));
    }
}

#[async_trait]
impl ScpiTransport for LoggingTransport {
    async fn write(&mut self, command: &str) -> Result<()> {
        self.emit(LogDirection::Tx, command.to_string());
        self.inner.write(command).await
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        self.emit(LogDirection::Tx, command.to_string());
        let response = self.inner.query(command).await?;
        self.emit(LogDirection::Rx, summarize_response(&response));
        Ok(response)
    }

    async fn query_values(&mut self, command: &str) -> Result<Vec<f64>> {
        self.emit(LogDirection::Tx, command.to_string());
        let values = self.inner.query_values(command).await?;
        self.emit(LogDirection::Rx, summarize_values(&values));
        Ok(values)
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }

    fn resource_name(&self) -> &str {
        self.inner.resource_name()
    }
}

/// Connector that hands out [`LoggingTransport`]s.
pub struct LoggingConnector {
    inner: Arc<dyn Connector>,
    sink: LogSink,
}

impl LoggingConnector {
    /// Wraps `inner`; every opened transport reports to `sink`.
    pub fn new(inner: Arc<dyn Connector>, sink: LogSink) -> Self {
        Self { inner, sink }
    }
}

#[async_trait]
impl Connector for LoggingConnector {
    async fn probe(&self, host: &str, timeout: Duration) -> bool {
        self.inner.probe(host, timeout).await
    }

    async fn open(
        &self,
        address: &InstrumentAddress,
        timeout: Duration,
    ) -> Result<Box<dyn ScpiTransport>> {
        let transport = self.inner.open(address, timeout).await?;
        Ok(Box::new(LoggingTransport::new(transport, self.sink.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimulatedVna;
    use std::sync::Mutex;

    fn collecting_sink() -> (LogSink, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let captured = entries.clone();
        let sink: LogSink =
            Arc::new(move |entry: LogEntry| captured.lock().unwrap().push(entry));
        (sink, entries)
    }

    #[test]
    fn test_short_response_is_unchanged() {
        assert_eq!(summarize_response("+1"), "+1");
    }

    #[test]
    fn test_long_response_is_summarized() {
        let response = vec!["1.000000E+06"; 50].join(",");
        assert_eq!(
            summarize_response(&response),
            "[50 values: 1.000000E+06,1.000000E+06,1.000000E+06...]"
        );
    }

    #[test]
    fn test_values_summary() {
        assert_eq!(summarize_values(&[1.0, 2.5]), "1,2.5");
        let many: Vec<f64> = (0..11).map(|i| 1e6 * f64::from(i + 1)).collect();
        assert_eq!(
            summarize_values(&many),
            "[11 values: 1.000e6,2.000e6,3.000e6...]"
        );
    }

    #[tokio::test]
    async fn test_traffic_is_mirrored() {
        let (sink, entries) = collecting_sink();
        let vna = Arc::new(SimulatedVna::new());
        let connector = LoggingConnector::new(vna, sink);

        let address = InstrumentAddress::new("10.0.0.5");
        let mut transport = connector.open(&address, Duration::from_secs(1)).await.unwrap();
        transport.write("ABOR").await.unwrap();
        transport.query("*OPC?").await.unwrap();

        let entries = entries.lock().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], LogEntry::new(LogDirection::Tx, "ABOR"));
        assert_eq!(entries[1], LogEntry::new(LogDirection::Tx, "*OPC?"));
        assert_eq!(entries[2].direction, LogDirection::Rx);
        assert_eq!(entries[2].message, "1");
    }
}
