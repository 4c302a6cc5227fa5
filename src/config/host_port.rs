//! `host:port` addresses with ephemeral-port resolution.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use super::ConfigError;

/// Host used for binding when an address leaves the host empty (`:8080`).
const ANY_HOST: &str = "0.0.0.0";

/// A listen or connect address.
///
/// Port `0` requests an ephemeral port; it is replaced by the bound port
/// once the owning component has started.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct HostPort {
    host: String,
    port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`. IPv6 hosts must be bracketed (`[::1]:4222`).
    pub fn parse(address: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let (host, port) = if let Some(rest) = address.strip_prefix('[') {
            let (host, port) = rest
                .split_once("]:")
                .ok_or_else(|| invalid("missing port after bracketed host"))?;
            (host, port)
        } else {
            let (host, port) = address
                .rsplit_once(':')
                .ok_or_else(|| invalid("missing port"))?;
            if host.contains(':') {
                return Err(invalid("too many colons, bracket IPv6 hosts"));
            }
            (host, port)
        };

        let port = port
            .parse::<u16>()
            .map_err(|e| invalid(&format!("bad port '{}': {}", port, e)))?;

        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// True while the port still has to be chosen by the OS.
    pub fn is_ephemeral(&self) -> bool {
        self.port == 0
    }

    /// The same host with a concrete port.
    pub fn with_port(&self, port: u16) -> Self {
        Self::new(self.host.clone(), port)
    }

    /// Host to hand to `bind()`; an empty host means all interfaces.
    pub fn bind_host(&self) -> &str {
        if self.host.is_empty() {
            ANY_HOST
        } else {
            &self.host
        }
    }

    /// Address string suitable for `TcpListener::bind`.
    pub fn bind_target(&self) -> String {
        HostPort::new(self.bind_host(), self.port).to_string()
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for HostPort {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for HostPort {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let hp = HostPort::parse("localhost:4222").unwrap();
        assert_eq!(hp.host(), "localhost");
        assert_eq!(hp.port(), 4222);
        assert_eq!(hp.to_string(), "localhost:4222");
    }

    #[test]
    fn test_ipv6_round_trip() {
        let hp: HostPort = "[::1]:8080".parse().unwrap();
        assert_eq!(hp.host(), "::1");
        assert_eq!(hp.port(), 8080);
        assert_eq!(hp.to_string(), "[::1]:8080");
    }

    #[test]
    fn test_ephemeral_resolution() {
        let requested = HostPort::parse("127.0.0.1:0").unwrap();
        assert!(requested.is_ephemeral());

        let bound = requested.with_port(54321);
        assert!(!bound.is_ephemeral());
        assert_eq!(bound.to_string(), "127.0.0.1:54321");
    }

    #[test]
    fn test_empty_host_binds_any() {
        let hp = HostPort::parse(":8080").unwrap();
        assert_eq!(hp.host(), "");
        assert_eq!(hp.bind_target(), "0.0.0.0:8080");
        assert_eq!(hp.to_string(), ":8080");
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["localhost", "localhost:http", "localhost:70000", "::1:80", "[::1]"] {
            assert!(
                matches!(
                    HostPort::parse(bad),
                    Err(ConfigError::InvalidAddress { .. })
                ),
                "expected '{}' to be rejected",
                bad
            );
        }
    }
}
