//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::time::Duration;

use rest_nats::bus::{MockConnector, MockPublisher};
use rest_nats::config::HostPort;
use rest_nats::{BridgeServer, Config};

/// Start a bridge publishing into a mock broker connection.
pub async fn start_mock(config: Config) -> (BridgeServer, MockPublisher) {
    let connector = MockConnector::new(MockPublisher::new());
    let server = BridgeServer::start_with(config, &connector)
        .await
        .expect("bridge should start");
    (server, connector.publisher().clone())
}

/// Base URL for a resolved listener address.
pub fn base_url(address: &HostPort) -> String {
    format!("http://{}", address)
}

/// A client that never reuses connections across requests.
pub fn fresh_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .expect("client should build")
}

/// POST `body` to `path` and return the status code.
pub async fn post(address: &HostPort, path: &str, body: &'static str) -> u16 {
    fresh_client()
        .post(format!("{}{}", base_url(address), path))
        .body(body)
        .send()
        .await
        .expect("request should complete")
        .status()
        .as_u16()
}

/// Whether a `nats-server` executable is on PATH.
pub fn nats_server_available() -> bool {
    std::process::Command::new("nats-server")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}
