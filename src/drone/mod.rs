pub mod broadcaster;
pub mod error;
pub mod protocol;

use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{info, warn};

use self::broadcaster::TelemetryBroadcaster;
use self::error::DroneError;
use self::protocol::CommandProtocol;
use crate::DEFAULT_PORT;
use crate::link::{ChannelSender, LineFramer, LinkConfig, LinkError, framed_lines};
use crate::log_sink::{FileLogSink, LogSink, append_blocking};
use crate::session::{LinkState, Session};
use crate::telemetry::TelemetryState;

/// Configuration for the drone node.
#[derive(Debug, Clone, Builder)]
pub struct DroneConfig {
    /// Address to listen on.
    #[builder(default = "0.0.0.0".to_string())]
    pub bind_address: String,

    #[builder(default = DEFAULT_PORT)]
    pub port: u16,

    /// Interval between telemetry lines.
    #[builder(default = Duration::from_millis(100))]
    pub telemetry_period: Duration,

    #[builder(default)]
    pub link: LinkConfig,

    /// File receiving outgoing telemetry and received command lines. Unset disables recording.
    pub log_path: Option<PathBuf>,
}

impl DroneConfig {
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// How a finished session went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub commands_handled: u64,
    pub telemetry_sent: u64,
}

/// The simulated drone: serves one ground station, streaming telemetry and answering commands.
pub struct DroneNode {
    config: DroneConfig,
    telemetry: TelemetryState,
    log: Option<Arc<dyn LogSink>>,
}

impl DroneNode {
    pub fn new(config: DroneConfig) -> Self {
        let log = config
            .log_path
            .clone()
            .map(|path| Arc::new(FileLogSink::new(path)) as Arc<dyn LogSink>);
        Self {
            config,
            telemetry: TelemetryState::default(),
            log,
        }
    }

    /// Replace the record sink.
    pub fn with_log_sink(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn telemetry(&self) -> &TelemetryState {
        &self.telemetry
    }

    /// Bind the listening socket. Failure here is fatal.
    pub async fn bind(&self) -> Result<TcpListener, DroneError> {
        let address = self.config.listen_address();
        TcpListener::bind(&address)
            .await
            .map_err(|source| DroneError::Bind {
                address: address.clone(),
                source,
            })
    }

    /// Accept a single ground station and serve it until the link closes.
    pub async fn serve(&self, listener: TcpListener) -> Result<SessionSummary, DroneError> {
        let session = Arc::new(Session::new());
        session.transition(LinkState::Listening)?;
        info!(
            session = %session.id(),
            address = %self.config.listen_address(),
            "Drone listening"
        );

        let (stream, peer) = listener.accept().await.map_err(DroneError::Accept)?;
        info!(session = %session.id(), peer = %peer, "Ground station connected");

        self.run_session(stream, session).await
    }

    /// Serve an already-established transport.
    ///
    /// `session` must be `Listening`. It is `Closed` when this returns.
    pub async fn run_session<S>(
        &self,
        stream: S,
        session: Arc<Session>,
    ) -> Result<SessionSummary, DroneError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        session.transition(LinkState::Connected)?;

        let (reader, writer) = tokio::io::split(stream);
        let (sender, receiver) = match self.config.link.open(reader, writer) {
            Ok(halves) => halves,
            Err(e) => {
                session.close();
                return Err(e.into());
            }
        };

        let broadcaster = TelemetryBroadcaster::new(
            self.config.telemetry_period,
            self.telemetry.clone(),
            sender.clone(),
            Arc::clone(&session),
            self.log.clone(),
        );
        let broadcast_task = tokio::spawn(broadcaster.run());

        let lines = framed_lines(receiver, LineFramer::uppercase());
        let commands_handled = self.command_loop(lines, sender, &session).await;

        session.close();
        let telemetry_sent = broadcast_task.await.unwrap_or_else(|e| {
            warn!(session = %session.id(), error = %e, "Telemetry task failed");
            0
        });

        info!(session = %session.id(), commands_handled, telemetry_sent, "Session closed");
        Ok(SessionSummary {
            commands_handled,
            telemetry_sent,
        })
    }

    /// Handle framed command lines in arrival order until the link closes.
    async fn command_loop<L, W>(
        &self,
        lines: L,
        sender: ChannelSender<W>,
        session: &Session,
    ) -> u64
    where
        L: Stream<Item = Result<Bytes, LinkError>>,
        W: AsyncWrite + Unpin,
    {
        let protocol = CommandProtocol::new(self.telemetry.clone());
        let mut lines = pin!(lines);
        let mut handled = 0;

        while session.is_open() {
            let next = tokio::select! {
                next = lines.next() => next,
                _ = session.closed() => break,
            };
            let line = match next {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    warn!(session = %session.id(), error = %e, "Command read failed");
                    break;
                }
                None => {
                    info!(session = %session.id(), "Ground station disconnected");
                    break;
                }
            };

            let text = String::from_utf8_lossy(&line);
            info!(session = %session.id(), line = %text, "Received");

            let outcome = protocol.handle(&line);
            handled += 1;
            if let Err(e) = sender.send(&outcome.ack).await {
                warn!(session = %session.id(), error = %e, "Acknowledgment send failed");
                break;
            }

            if let Some(log) = &self.log {
                if let Err(e) = append_blocking(log, &*text).await {
                    warn!(error = %e, "Failed to record command");
                }
            }
        }

        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_sink::testing::MemoryLogSink;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn quiet_config() -> DroneConfig {
        DroneConfig::builder()
            .telemetry_period(Duration::from_secs(3600))
            .link(LinkConfig::builder().corruption_rate(0.0).build())
            .build()
    }

    fn listening_session() -> Arc<Session> {
        let session = Arc::new(Session::new());
        session.transition(LinkState::Listening).unwrap();
        session
    }

    #[test]
    fn test_default_config() {
        let config = DroneConfig::builder().build();
        assert_eq!(config.listen_address(), "0.0.0.0:5000");
        assert_eq!(config.telemetry_period, Duration::from_millis(100));
        assert_eq!(config.link.corruption_rate, 0.1);
        assert!(config.log_path.is_none());
    }

    #[tokio::test]
    async fn test_session_acks_each_line_in_order() {
        let log = Arc::new(MemoryLogSink::default());
        let node = DroneNode::new(quiet_config()).with_log_sink(log.clone());
        let (drone_end, mut ground_end) = tokio::io::duplex(4096);
        let session = listening_session();

        let serve = {
            let session = Arc::clone(&session);
            async move { node.run_session(drone_end, session).await }
        };
        let ground = async move {
            // Skip the immediate first telemetry line.
            let mut telemetry = [0u8; 64];
            let n = ground_end.read(&mut telemetry).await.unwrap();
            assert!(telemetry[..n].starts_with(b"BAT:"));

            ground_end.write_all(b"takeoff\ngoto 1 2 3\nhover\n").await.unwrap();
            let expected: &[u8] = b"OK TAKEOFF\nOK GOTO 1 2 3\nOK HOVER\n";
            let mut acks = vec![0u8; expected.len()];
            ground_end.read_exact(&mut acks).await.unwrap();
            assert_eq!(acks, expected);
            drop(ground_end);
        };

        let (summary, ()) = tokio::join!(serve, ground);
        let summary = summary.unwrap();
        assert_eq!(summary.commands_handled, 3);
        assert_eq!(session.state(), LinkState::Closed);
        assert_eq!(
            log.entries()
                .into_iter()
                .filter(|entry| !entry.starts_with("BAT:"))
                .collect::<Vec<_>>(),
            vec!["TAKEOFF", "GOTO 1 2 3", "HOVER"]
        );
    }

    #[tokio::test]
    async fn test_goto_updates_shared_telemetry() {
        let node = Arc::new(DroneNode::new(quiet_config()));
        let (drone_end, mut ground_end) = tokio::io::duplex(4096);

        let task = {
            let node = Arc::clone(&node);
            tokio::spawn(async move { node.run_session(drone_end, listening_session()).await })
        };

        ground_end.write_all(b"GOTO 7.9 -2.2 10\n").await.unwrap();
        let mut buf = vec![0u8; 512];
        let mut seen = Vec::new();
        while !seen.ends_with(b"OK GOTO 7.9 -2.2 10\n") {
            let n = ground_end.read(&mut buf).await.unwrap();
            assert!(n > 0);
            seen.extend_from_slice(&buf[..n]);
        }

        let t = node.telemetry().snapshot();
        assert_eq!((t.x, t.y, t.z), (7, -2, 10));

        drop(ground_end);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_closing_session_stops_idle_command_loop() {
        let node = Arc::new(DroneNode::new(quiet_config()));
        let (drone_end, _ground_end) = tokio::io::duplex(4096);
        let session = listening_session();

        let task = {
            let node = Arc::clone(&node);
            let session = Arc::clone(&session);
            tokio::spawn(async move { node.run_session(drone_end, session).await })
        };
        while !session.is_open() {
            tokio::task::yield_now().await;
        }

        // The peer stays connected and silent; only the session closes.
        session.close();
        let summary = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("command loop ignored session close")
            .unwrap()
            .unwrap();
        assert_eq!(summary.commands_handled, 0);
    }

    #[tokio::test]
    async fn test_session_must_be_listening() {
        let node = DroneNode::new(quiet_config());
        let (drone_end, _ground_end) = tokio::io::duplex(64);
        let session = Arc::new(Session::new());

        let result = node.run_session(drone_end, session).await;
        assert!(matches!(result, Err(DroneError::Session(_))));
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let node = DroneNode::new(
            DroneConfig::builder()
                .bind_address("127.0.0.1".to_string())
                .port(port)
                .build(),
        );
        assert!(matches!(node.bind().await, Err(DroneError::Bind { .. })));
    }
}
