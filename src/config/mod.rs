//! Application configuration.
//!
//! Aggregates the broker, HTTP, dispatch and monitor sections into a single
//! Config struct that can be loaded from YAML files or environment variables.

mod host_port;
mod server;

pub use host_port::HostPort;
pub use server::{
    BrokerConfig, ConfigError, DispatchConfig, HttpConfig, MonitorConfig, DEFAULT_BROKER_BINARY,
    DEFAULT_MAX_BODY_BYTES, DEFAULT_MONITOR_PORT, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_READ_TIMEOUT_MS, DEFAULT_READY_TIMEOUT_MS,
};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "rest-nats.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "REST_NATS_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "REST_NATS";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "REST_NATS_LOG";

use serde::Deserialize;

/// Main application configuration.
///
/// Defaults run an embedded broker and listen for HTTP on an ephemeral
/// port, both on localhost.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker configuration (embedded or external).
    pub broker: BrokerConfig,
    /// HTTP ingress configuration.
    pub http: HttpConfig,
    /// Dispatch queue configuration.
    pub dispatch: DispatchConfig,
    /// Monitor endpoint configuration.
    pub monitor: MonitorConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `rest-nats.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.broker.ready_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "broker.ready_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.http.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "http.read_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.broker.binary.is_empty() {
            return Err(ConfigError::Invalid(
                "broker.binary must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Create config for testing: external broker, loopback, ephemeral ports.
    pub fn for_test() -> Self {
        Self {
            broker: BrokerConfig {
                embed: false,
                address: HostPort::new("127.0.0.1", 4222),
                ..Default::default()
            },
            http: HttpConfig {
                address: HostPort::new("127.0.0.1", 0),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.broker.embed);
        assert!(config.broker.address.is_ephemeral());
        assert!(config.http.address.is_ephemeral());
        assert_eq!(config.dispatch.queue_capacity, 1000);
        assert!(config.monitor.port.is_none());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
broker:
  embed: false
  address: "nats.internal:4222"

http:
  address: "0.0.0.0:8080"
  max_body_bytes: 4096
  read_timeout_ms: 250

dispatch:
  queue_capacity: 64

monitor:
  port: 6619
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.broker.embed);
        assert_eq!(config.broker.address.host(), "nats.internal");
        assert_eq!(config.broker.address.port(), 4222);
        assert_eq!(config.http.address.to_string(), "0.0.0.0:8080");
        assert_eq!(config.http.max_body_bytes, 4096);
        assert_eq!(config.http.read_timeout_ms, 250);
        assert_eq!(config.dispatch.queue_capacity, 64);
        assert_eq!(config.monitor.port, Some(6619));
        // Unset fields keep their defaults
        assert_eq!(config.broker.binary, "nats-server");
    }

    #[test]
    fn test_parse_yaml_rejects_bad_address() {
        let yaml = "http:\n  address: \"no-port\"\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::for_test();
        config.dispatch.queue_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut config = Config::for_test();
        config.broker.ready_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::for_test();
        config.http.read_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        assert!(Config::for_test().validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_from_file_and_env() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "broker:\n  embed: false\n  address: \"127.0.0.1:4222\"\ndispatch:\n  queue_capacity: 10"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        std::env::set_var("REST_NATS__HTTP__ADDRESS", "127.0.0.1:9090");
        let config = Config::load(Some(&path));
        std::env::remove_var("REST_NATS__HTTP__ADDRESS");

        let config = config.unwrap();
        assert!(!config.broker.embed);
        assert_eq!(config.broker.address.port(), 4222);
        assert_eq!(config.dispatch.queue_capacity, 10);
        assert_eq!(config.http.address.to_string(), "127.0.0.1:9090");
    }

    #[test]
    #[serial]
    fn test_load_missing_required_file_fails() {
        let result = Config::load(Some("/nonexistent/rest-nats.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
