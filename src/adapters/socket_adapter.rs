//! Raw SCPI socket adapter
//!
//! Talks SCPI directly over TCP (port 5025 on most LAN instruments) for
//! `TCPIP0::<host>::<port>::SOCKET` resources. Commands are newline-terminated,
//! each query reads exactly one response line.

use super::ScpiTransport;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// SCPI-over-TCP session.
pub struct SocketAdapter {
    resource_string: String,
    timeout: Duration,
    line_terminator: String,
    reader: Option<BufReader<OwnedReadHalf>>,
    writer: Option<OwnedWriteHalf>,
}

impl SocketAdapter {
    /// Connect to `host:port`. `timeout` bounds the connect and every later I/O call.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let resource_string = format!("TCPIP0::{}::{}::SOCKET", host, port);
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| anyhow!("Timed out connecting to {}:{}", host, port))?
            .with_context(|| format!("Failed to connect to {}:{}", host, port))?;
        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        debug!("Socket '{}' opened", resource_string);

        Ok(Self {
            resource_string,
            timeout,
            line_terminator: "\n".to_string(),
            reader: Some(BufReader::new(read_half)),
            writer: Some(write_half),
        })
    }

    /// Set line terminator for commands
    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    /// Returns true while the socket is open.
    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    async fn send_line(&mut self, command: &str) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("Socket '{}' is closed", self.resource_string))?;
        let line = format!("{}{}", command, self.line_terminator);

        tokio::time::timeout(self.timeout, writer.write_all(line.as_bytes()))
            .await
            .map_err(|_| anyhow!("Write timed out for: {}", command))?
            .with_context(|| format!("Socket write failed for: {}", command))
    }

    async fn read_line(&mut self, command: &str) -> Result<String> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| anyhow!("Socket '{}' is closed", self.resource_string))?;
        let mut response = String::new();

        let read = tokio::time::timeout(self.timeout, reader.read_line(&mut response))
            .await
            .map_err(|_| anyhow!("Read timed out after {:?} for: {}", self.timeout, command))?
            .with_context(|| format!("Socket read failed for: {}", command))?;
        if read == 0 {
            bail!("Connection closed by instrument during: {}", command);
        }

        Ok(response.trim_end_matches(['\r', '\n']).to_string())
    }
}

#[async_trait]
impl ScpiTransport for SocketAdapter {
    async fn write(&mut self, command: &str) -> Result<()> {
        self.send_line(command).await
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        self.send_line(command).await?;
        self.read_line(command).await
    }

    async fn close(&mut self) -> Result<()> {
        self.reader = None;
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await.ok();
            debug!("Socket '{}' closed", self.resource_string);
        }
        Ok(())
    }

    fn resource_name(&self) -> &str {
        &self.resource_string
    }
}
