//! Bridge server lifecycle.
//!
//! Startup order: embedded broker → broker connection → dispatcher → HTTP
//! listener → monitor listener. Shutdown runs the pipeline down from the
//! front: stop accepting HTTP, drain the queue, close the broker
//! connection, stop the broker.
//!
//! ```text
//! [HTTP] -> [ingress] -> [DispatchQueue] -> [Dispatcher] -> [NATS]
//! ```

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bus::{
    dispatch_channel, BusError, Connector, DispatchMetrics, DispatchQueue, DrainComplete,
    NatsConnector,
};
use crate::config::{Config, ConfigError, HostPort};
use crate::handlers::{ingress, monitor};
use crate::process::{BrokerError, EmbeddedBroker};

/// Fatal startup errors. Nothing started before the failure keeps running.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Embedded broker failed: {0}")]
    Broker(#[from] BrokerError),

    #[error("Unable to connect to broker: {0}")]
    Connect(#[source] BusError),

    #[error("Cannot listen for {listener} requests on '{address}': {source}")]
    Bind {
        listener: &'static str,
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Final dispatch statistics, reported on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub peak_queue_depth: usize,
    pub published: u64,
    pub publish_failures: u64,
}

/// A running HTTP listener.
struct ListenerHandle {
    address: HostPort,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Bind and serve `router`, resolving an ephemeral port.
    ///
    /// Dropping the handle also triggers graceful shutdown.
    async fn bind(
        name: &'static str,
        requested: &HostPort,
        router: Router,
    ) -> Result<Self, StartupError> {
        let bind_error = |source| StartupError::Bind {
            listener: name,
            address: requested.to_string(),
            source,
        };

        let listener = TcpListener::bind(requested.bind_target())
            .await
            .map_err(bind_error)?;
        let port = listener.local_addr().map_err(bind_error)?.port();
        let address = requested.with_port(port);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                error!(listener = name, error = %e, "HTTP server error");
            }
        });

        info!(listener = name, address = %address, "HTTP server started");

        Ok(Self {
            address,
            shutdown_tx,
            task,
        })
    }

    /// Stop accepting connections and wait for in-flight requests.
    async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            error!(error = %e, "HTTP server task failed");
        }
    }
}

/// The HTTP → NATS bridge.
pub struct BridgeServer {
    /// Configuration with every ephemeral port resolved.
    config: Config,
    broker: Option<EmbeddedBroker>,
    queue: Arc<DispatchQueue>,
    metrics: Arc<DispatchMetrics>,
    drain: Option<oneshot::Receiver<DrainComplete>>,
    http: Option<ListenerHandle>,
    monitor: Option<ListenerHandle>,
    report: Option<ShutdownReport>,
}

impl BridgeServer {
    /// Start the bridge, publishing through NATS.
    pub async fn start(config: Config) -> Result<Self, StartupError> {
        Self::start_with(config, &NatsConnector::new()).await
    }

    /// Start the bridge with a custom broker connector.
    pub async fn start_with(
        mut config: Config,
        connector: &dyn Connector,
    ) -> Result<Self, StartupError> {
        config.validate()?;

        let mut broker = if config.broker.embed {
            let broker = EmbeddedBroker::start(&config.broker).await?;
            config.broker.address = broker.address().clone();
            Some(broker)
        } else {
            None
        };

        let publisher = match connector.connect(&config.broker.address).await {
            Ok(publisher) => publisher,
            Err(e) => {
                error!(address = %config.broker.address, error = %e, "Unable to connect to broker");
                if let Some(broker) = broker.as_mut() {
                    broker.stop().await;
                }
                return Err(StartupError::Connect(e));
            }
        };

        let metrics = Arc::new(DispatchMetrics::new());
        let (queue, dispatcher) =
            dispatch_channel(config.dispatch.queue_capacity, publisher, metrics.clone());
        let queue = Arc::new(queue);
        let drain = dispatcher.spawn();

        let mut server = Self {
            config,
            broker,
            queue,
            metrics,
            drain: Some(drain),
            http: None,
            monitor: None,
            report: None,
        };

        let app = ingress::router(server.queue.clone(), &server.config.http);
        match ListenerHandle::bind("http", &server.config.http.address, app).await {
            Ok(handle) => {
                server.config.http.address = handle.address.clone();
                server.http = Some(handle);
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for HTTP requests");
                server.stop().await;
                return Err(e);
            }
        }

        if let Some(port) = server.config.monitor.port {
            let requested = server.config.http.address.with_port(port);
            let app = monitor::router(monitor::MonitorState {
                queue: server.queue.clone(),
                metrics: server.metrics.clone(),
            });
            match ListenerHandle::bind("monitor", &requested, app).await {
                Ok(handle) => {
                    server.config.monitor.port = Some(handle.address.port());
                    server.monitor = Some(handle);
                }
                Err(e) => {
                    error!(error = %e, "Cannot listen for monitor requests");
                    server.stop().await;
                    return Err(e);
                }
            }
        }

        info!(
            broker = %server.config.broker.address,
            embedded = server.config.broker.embed,
            http = %server.config.http.address,
            queue_capacity = server.config.dispatch.queue_capacity,
            "Bridge started"
        );

        Ok(server)
    }

    /// Resolved configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn broker_address(&self) -> &HostPort {
        &self.config.broker.address
    }

    pub fn http_address(&self) -> &HostPort {
        &self.config.http.address
    }

    pub fn monitor_address(&self) -> Option<&HostPort> {
        self.monitor.as_ref().map(|m| &m.address)
    }

    pub fn is_embedded(&self) -> bool {
        self.config.broker.embed
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    pub fn peak_queue_depth(&self) -> usize {
        self.metrics.peak_depth()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// Shut down in order, draining every accepted message.
    ///
    /// 1. stop the HTTP listener, waiting for in-flight handlers
    /// 2. enqueue the shutdown sentinel
    /// 3. wait for the dispatcher to drain
    /// 4. close the broker connection
    /// 5. stop the embedded broker
    ///
    /// Calling it again returns the first report without doing anything.
    pub async fn stop(&mut self) -> ShutdownReport {
        if let Some(report) = self.report {
            return report;
        }

        info!("Stopping bridge");

        if let Some(http) = self.http.take() {
            http.shutdown().await;
            info!("HTTP server has stopped");
        }

        self.queue.shutdown().await;

        if let Some(drain) = self.drain.take() {
            match drain.await {
                Ok(complete) => {
                    if let Err(e) = complete.publisher.close().await {
                        warn!(error = %e, "Error closing broker connection");
                    }
                    info!("Broker connection closed");
                }
                Err(_) => error!("Dispatcher ended without draining"),
            }
        }

        if let Some(mut broker) = self.broker.take() {
            broker.stop().await;
        }

        if let Some(monitor) = self.monitor.take() {
            monitor.shutdown().await;
        }

        let report = ShutdownReport {
            peak_queue_depth: self.metrics.peak_depth(),
            published: self.metrics.published(),
            publish_failures: self.metrics.publish_failures(),
        };

        info!(
            peak_queue_depth = report.peak_queue_depth,
            published = report.published,
            publish_failures = report.publish_failures,
            "Bridge stopped"
        );

        self.report = Some(report);
        report
    }
}
