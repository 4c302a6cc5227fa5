//! Process management for the embedded broker.
//!
//! Spawns the broker executable as a child process, waits for it to accept
//! client connections, and resolves the port it actually bound. The broker
//! announces readiness on stderr:
//!
//! ```text
//! [4242] 2024/01/01 12:00:00.000000 [INF] Listening for client connections on 127.0.0.1:4222
//! ```

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{BrokerConfig, HostPort};

/// Log line prefix marking that the broker accepts client connections.
const LISTEN_MARKER: &str = "Listening for client connections on ";
/// Port argument asking the broker to pick any free port.
const RANDOM_PORT_ARG: &str = "-1";
/// How long a stopping broker gets before it is killed.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Errors starting the embedded broker. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Failed to spawn broker '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Broker exited before accepting connections ({status}); last output: {last_line}")]
    Exited { status: String, last_line: String },

    #[error("Broker did not accept connections within {0:?}")]
    NotReady(Duration),

    #[error("Broker output unavailable: {0}")]
    Io(#[from] std::io::Error),
}

/// A broker running as a supervised child process.
pub struct EmbeddedBroker {
    child: Child,
    address: HostPort,
    log_task: Option<JoinHandle<()>>,
    stopped: bool,
}

impl EmbeddedBroker {
    /// Spawn the broker and wait until it accepts connections.
    ///
    /// The command line is `<binary> <args...> -a <host> -p <port>`, with
    /// `-p -1` when an ephemeral port was requested. On timeout the child
    /// is killed before the error is returned.
    pub async fn start(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let requested = &config.address;
        let port_arg = if requested.is_ephemeral() {
            RANDOM_PORT_ARG.to_string()
        } else {
            requested.port().to_string()
        };

        info!(
            binary = %config.binary,
            address = %requested,
            "Starting embedded broker"
        );

        let mut cmd = Command::new(&config.binary);
        cmd.args(&config.args)
            .arg("-a")
            .arg(requested.bind_host())
            .arg("-p")
            .arg(&port_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| {
            error!(binary = %config.binary, error = %source, "Failed to spawn broker");
            BrokerError::Spawn {
                binary: config.binary.clone(),
                source,
            }
        })?;

        debug!(pid = ?child.id(), "Broker process spawned");

        let stderr = child.stderr.take().ok_or_else(|| {
            BrokerError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "broker stderr was not captured",
            ))
        })?;
        let mut lines = BufReader::new(stderr).lines();

        let timeout = config.ready_timeout();
        let port = match tokio::time::timeout(timeout, wait_for_listen(&mut lines)).await {
            Ok(Ok(port)) => port,
            Ok(Err(WaitError::Io(e))) => {
                kill_quietly(&mut child).await;
                return Err(BrokerError::Io(e));
            }
            Ok(Err(WaitError::Eof { last_line })) => {
                let status = match child.wait().await {
                    Ok(status) => status.to_string(),
                    Err(e) => e.to_string(),
                };
                error!(status = %status, last_line = %last_line, "Broker exited during startup");
                return Err(BrokerError::Exited { status, last_line });
            }
            Err(_) => {
                error!(timeout = ?timeout, "Broker not ready in time");
                kill_quietly(&mut child).await;
                return Err(BrokerError::NotReady(timeout));
            }
        };

        let address = requested.with_port(port);
        let log_task = tokio::spawn(forward_logs(lines));

        info!(address = %address, pid = ?child.id(), "Embedded broker started");

        Ok(Self {
            child,
            address,
            log_task: Some(log_task),
            stopped: false,
        })
    }

    /// The address the broker is listening on, with a concrete port.
    pub fn address(&self) -> &HostPort {
        &self.address
    }

    /// Check if the process is still running.
    pub fn is_running(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!(status = %status, "Broker process exited");
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to check broker status");
                false
            }
        }
    }

    /// Stop the broker: terminate, wait for exit, kill if it lingers.
    ///
    /// Safe to call more than once.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if !self.is_running() {
            info!("Embedded broker already exited");
            if let Some(task) = self.log_task.take() {
                task.abort();
            }
            return;
        }

        info!(pid = ?self.child.id(), "Stopping embedded broker");

        if !self.terminate() {
            kill_quietly(&mut self.child).await;
        }

        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => info!(status = %status, "Embedded broker stopped"),
            Ok(Err(e)) => warn!(error = %e, "Failed to reap broker process"),
            Err(_) => {
                warn!(grace = ?STOP_GRACE, "Broker ignored termination, killing");
                kill_quietly(&mut self.child).await;
            }
        }

        if let Some(task) = self.log_task.take() {
            task.abort();
        }
    }

    /// Ask the broker to shut down. Returns false if no signal was sent.
    #[cfg(unix)]
    fn terminate(&self) -> bool {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return false;
        };
        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => true,
            Err(e) => {
                warn!(pid, error = %e, "Failed to signal broker");
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> bool {
        false
    }
}

impl Drop for EmbeddedBroker {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            warn!(pid = ?self.child.id(), "Killing orphaned broker on drop");
            let _ = self.child.start_kill();
        }
        if let Some(task) = self.log_task.take() {
            task.abort();
        }
    }
}

enum WaitError {
    Eof { last_line: String },
    Io(std::io::Error),
}

/// Read broker output until the listen line appears.
async fn wait_for_listen(lines: &mut Lines<BufReader<ChildStderr>>) -> Result<u16, WaitError> {
    let mut last_line = String::from("<none>");
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(line = %line, "broker");
                if let Some(port) = parse_listen_port(&line) {
                    return Ok(port);
                }
                last_line = line;
            }
            Ok(None) => return Err(WaitError::Eof { last_line }),
            Err(e) => return Err(WaitError::Io(e)),
        }
    }
}

/// Forward remaining broker output to the log so the pipe never fills.
async fn forward_logs(mut lines: Lines<BufReader<ChildStderr>>) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(line = %line, "broker"),
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read broker output");
                break;
            }
        }
    }
}

async fn kill_quietly(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Broker already gone");
    }
}

/// Extract the client port from the broker's readiness line.
pub fn parse_listen_port(line: &str) -> Option<u16> {
    let (_, address) = line.split_once(LISTEN_MARKER)?;
    let (_, port) = address.trim().rsplit_once(':')?;
    port.parse().ok().filter(|port| *port > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listen_port() {
        let line = "[4242] 2024/01/01 12:00:00.000000 [INF] Listening for client connections on 127.0.0.1:4222";
        assert_eq!(parse_listen_port(line), Some(4222));

        let v6 = "[1] [INF] Listening for client connections on [::1]:39001";
        assert_eq!(parse_listen_port(v6), Some(39001));

        assert_eq!(parse_listen_port("[INF] Starting nats-server"), None);
        assert_eq!(
            parse_listen_port("[INF] Listening for client connections on localhost:0"),
            None
        );
    }

    fn shell_broker(script: &str, timeout_ms: u64) -> BrokerConfig {
        BrokerConfig {
            embed: true,
            address: HostPort::new("127.0.0.1", 0),
            binary: "sh".to_string(),
            // The listen flags land in $0.. and are ignored by the script
            args: vec!["-c".to_string(), script.to_string()],
            ready_timeout_ms: timeout_ms,
        }
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let config = BrokerConfig {
            binary: "/nonexistent/nats-server".to_string(),
            ..Default::default()
        };
        let result = EmbeddedBroker::start(&config).await;
        assert!(matches!(result, Err(BrokerError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ready_resolves_port() {
        let config = shell_broker(
            "echo '[1] [INF] Starting' >&2; \
             echo '[1] [INF] Listening for client connections on 127.0.0.1:45678' >&2; \
             exec sleep 30",
            2_000,
        );

        let mut broker = EmbeddedBroker::start(&config).await.unwrap();
        assert_eq!(broker.address().to_string(), "127.0.0.1:45678");
        assert!(broker.is_running());

        broker.stop().await;
        assert!(!broker.is_running());
        // Second stop is a no-op
        broker.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_after_broker_exited() {
        let config = shell_broker(
            "echo '[1] [INF] Listening for client connections on 127.0.0.1:45679' >&2; exit 0",
            2_000,
        );

        let mut broker = EmbeddedBroker::start(&config).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!broker.is_running());

        let started = std::time::Instant::now();
        broker.stop().await;
        assert!(started.elapsed() < STOP_GRACE);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_before_ready() {
        let config = shell_broker("echo 'bad config' >&2; exit 3", 2_000);

        match EmbeddedBroker::start(&config).await {
            Err(BrokerError::Exited { status, last_line }) => {
                assert!(status.contains('3'), "unexpected status {}", status);
                assert_eq!(last_line, "bad config");
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("broker should not become ready"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_readiness_timeout() {
        let config = shell_broker("exec sleep 30", 200);

        let started = std::time::Instant::now();
        let result = EmbeddedBroker::start(&config).await;
        assert!(matches!(result, Err(BrokerError::NotReady(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
