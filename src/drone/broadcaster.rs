use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::link::ChannelSender;
use crate::log_sink::{LogSink, append_blocking};
use crate::session::Session;
use crate::telemetry::TelemetryState;

/// Periodically sends the current telemetry snapshot.
///
/// The telemetry guard is held only while copying the snapshot, never across the send.
pub struct TelemetryBroadcaster<W> {
    period: Duration,
    telemetry: TelemetryState,
    sender: ChannelSender<W>,
    session: Arc<Session>,
    log: Option<Arc<dyn LogSink>>,
}

impl<W: AsyncWrite + Unpin> TelemetryBroadcaster<W> {
    pub fn new(
        period: Duration,
        telemetry: TelemetryState,
        sender: ChannelSender<W>,
        session: Arc<Session>,
        log: Option<Arc<dyn LogSink>>,
    ) -> Self {
        Self {
            period,
            telemetry,
            sender,
            session,
            log,
        }
    }

    /// Broadcast until the session closes or a send fails. Returns the number of lines sent.
    pub async fn run(self) -> u64 {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sent = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.session.closed() => break,
            }
            if !self.session.is_open() {
                break;
            }

            let line = self.telemetry.snapshot().to_line();
            if let Err(e) = self.sender.send(line.as_bytes()).await {
                warn!(session = %self.session.id(), error = %e, "Telemetry send failed, closing session");
                self.session.close();
                break;
            }
            sent += 1;
            debug!(session = %self.session.id(), telemetry = %line.trim_end(), "Sent telemetry");

            if let Some(log) = &self.log {
                if let Err(e) = append_blocking(log, line.as_str()).await {
                    warn!(error = %e, "Failed to record telemetry");
                }
            }
        }

        info!(session = %self.session.id(), sent, "Telemetry broadcaster stopped");
        sent
    }
}
