//! Broker, listener and queue configuration types.

use std::time::Duration;

use serde::Deserialize;

use super::HostPort;

/// Default executable launched in embedded mode.
pub const DEFAULT_BROKER_BINARY: &str = "nats-server";
/// Default bound on waiting for the embedded broker to accept clients.
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 5_000;
/// Default bound on receiving a request body.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;
/// Default request body limit, matching the broker's default max payload.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Default dispatch queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
/// Port reserved for the monitor listener.
pub const DEFAULT_MONITOR_PORT: u16 = 6619;

/// Broker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Launch and supervise a broker instead of using an external one.
    pub embed: bool,
    /// Broker address. In embedded mode port 0 picks any free port.
    pub address: HostPort,
    /// Executable started in embedded mode.
    pub binary: String,
    /// Extra arguments passed to the embedded broker before the listen flags.
    pub args: Vec<String>,
    /// Upper bound on waiting for the embedded broker to become ready.
    pub ready_timeout_ms: u64,
}

impl BrokerConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            embed: true,
            address: HostPort::new("localhost", 0),
            binary: DEFAULT_BROKER_BINARY.to_string(),
            args: Vec::new(),
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
        }
    }
}

/// HTTP ingress configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address. Port 0 picks any free port.
    pub address: HostPort,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Upper bound on receiving a request body; a stalled client gets 400.
    pub read_timeout_ms: u64,
}

impl HttpConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: HostPort::new("localhost", 0),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

/// Dispatch queue configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of messages buffered between HTTP handlers and the dispatcher.
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Monitor listener configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Port for the statistics endpoint, bound on the HTTP host.
    /// `None` disables it; `0` picks any free port.
    pub port: Option<u16>,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
