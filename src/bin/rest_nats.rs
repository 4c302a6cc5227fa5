//! rest-nats: HTTP to NATS bridge
//!
//! Every HTTP request becomes one NATS message: `POST /orders/created`
//! publishes the request body on `orders.created`.
//!
//! ## Configuration
//! ```yaml
//! broker:
//!   embed: true             # run nats-server as a child process
//!   address: localhost:0    # port 0 picks a free port
//! http:
//!   address: localhost:8080
//!   max_body_bytes: 1048576
//!   read_timeout_ms: 5000   # stalled request bodies get 400
//! dispatch:
//!   queue_capacity: 1000
//! monitor:
//!   port: 6619              # omit to disable
//! ```
//!
//! Any key can be overridden from the environment, e.g.
//! `REST_NATS__HTTP__ADDRESS=0.0.0.0:8080`.

use tracing::{error, info};

use rest_nats::{BridgeServer, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rest_nats::utils::bootstrap::init_tracing();

    let config_path = rest_nats::utils::bootstrap::parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting rest-nats");

    let mut server = BridgeServer::start(config).await.map_err(|e| {
        error!("Failed to start bridge: {}", e);
        e
    })?;

    info!(
        http = %server.http_address(),
        broker = %server.broker_address(),
        "rest-nats ready"
    );

    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");

    let report = server.stop().await;
    info!(
        peak_queue_depth = report.peak_queue_depth,
        published = report.published,
        "rest-nats stopped"
    );

    Ok(())
}
