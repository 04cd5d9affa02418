//! VISA resource addressing.

use crate::error::{VnaError, VnaResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default VISA interface.
pub const DEFAULT_PROTOCOL: &str = "TCPIP0";
/// Default VXI-11 device name.
pub const DEFAULT_PORT: &str = "inst0";
/// Default resource class.
pub const DEFAULT_SUFFIX: &str = "INSTR";
/// Resource class selecting a raw SCPI socket.
pub const SOCKET_SUFFIX: &str = "SOCKET";

/// Device names offered for LAN instruments, most common first.
pub const COMMON_PORTS: [&str; 6] = ["inst0", "inst1", "inst2", "inst3", "hislip0", "gpib0,16"];

/// Where an instrument lives: `<protocol>::<host>::<port>::<suffix>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentAddress {
    /// IP address or hostname
    pub host: String,
    /// VISA device name (`inst0`, `hislip0`), or the TCP port for `SOCKET`
    pub port: String,
    /// VISA interface, e.g. `TCPIP0`
    pub protocol: String,
    /// Resource class, `INSTR` or `SOCKET`
    pub suffix: String,
}

impl Default for InstrumentAddress {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT.to_string(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

impl InstrumentAddress {
    /// VXI-11 address on `host` with default port, protocol and suffix.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Raw SCPI socket address on `host:port`.
    pub fn socket(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: port.to_string(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            suffix: SOCKET_SUFFIX.to_string(),
        }
    }

    /// Builds the VISA resource string. Fails when no host is set.
    pub fn resource_string(&self) -> VnaResult<String> {
        if self.host.trim().is_empty() {
            return Err(VnaError::Configuration(
                "Host IP address must be configured before connecting".to_string(),
            ));
        }
        Ok(format!(
            "{}::{}::{}::{}",
            self.protocol, self.host, self.port, self.suffix
        ))
    }

    /// Returns true for raw socket resources.
    pub fn is_socket(&self) -> bool {
        self.suffix.eq_ignore_ascii_case(SOCKET_SUFFIX)
    }

    /// TCP port of a socket resource.
    pub fn socket_port(&self) -> Option<u16> {
        self.port.trim().parse().ok()
    }
}

impl fmt::Display for InstrumentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}::{}::{}",
            self.protocol, self.host, self.port, self.suffix
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_string() {
        let address = InstrumentAddress::new("192.168.1.100");
        assert_eq!(
            address.resource_string().unwrap(),
            "TCPIP0::192.168.1.100::inst0::INSTR"
        );
        assert!(!address.is_socket());
    }

    #[test]
    fn test_custom_fields() {
        let address = InstrumentAddress {
            host: "vna.lab".to_string(),
            port: "hislip0".to_string(),
            protocol: "TCPIP1".to_string(),
            suffix: "INSTR".to_string(),
        };
        assert_eq!(
            address.resource_string().unwrap(),
            "TCPIP1::vna.lab::hislip0::INSTR"
        );
    }

    #[test]
    fn test_empty_host_is_configuration_error() {
        let err = InstrumentAddress::default().resource_string().unwrap_err();
        assert!(matches!(err, VnaError::Configuration(_)));
        let text = err.to_string();
        assert!(text.contains("Host") && text.contains("configured"));

        assert!(InstrumentAddress::new("   ").resource_string().is_err());
    }

    #[test]
    fn test_socket_address() {
        let address = InstrumentAddress::socket("10.0.0.5", 5025);
        assert!(address.is_socket());
        assert_eq!(address.socket_port(), Some(5025));
        assert_eq!(
            address.resource_string().unwrap(),
            "TCPIP0::10.0.0.5::5025::SOCKET"
        );
    }
}
