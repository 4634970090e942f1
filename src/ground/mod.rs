//! The ground control station: sends operator commands with bounded retry and shows telemetry.

pub mod console;
pub mod error;
pub mod mailbox;
pub mod receive;
pub mod retry;

pub use console::{Console, OperatorInput, ReaderInput, StdoutConsole};
pub use error::GroundError;
pub use mailbox::AckMailbox;
pub use receive::ReceiveLoop;
pub use retry::{CommandOutcome, RetryClient};

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use bon::Builder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::DEFAULT_PORT;
use crate::link::{LineFramer, LinkConfig, LinkError, framed_lines};
use crate::session::{LinkState, Session};
use crate::state_machine::retry::RetryPolicy;

/// Configuration for the ground station.
#[derive(Debug, Clone, Builder)]
pub struct GroundConfig {
    /// Drone host to connect to.
    #[builder(default = "127.0.0.1".to_string())]
    pub address: String,

    #[builder(default = DEFAULT_PORT)]
    pub port: u16,

    #[builder(default = LinkConfig::builder().read_buffer_size(512).build())]
    pub link: LinkConfig,

    #[builder(default)]
    pub retry: RetryPolicy,
}

impl GroundConfig {
    pub fn drone_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Tallies for a finished ground session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroundSummary {
    pub commands_sent: u64,
    pub acknowledged: u64,
    pub timed_out: u64,
}

pub struct GroundStation {
    config: GroundConfig,
}

impl GroundStation {
    pub fn new(config: GroundConfig) -> Self {
        Self { config }
    }

    /// Open the TCP connection to the drone. Failure here is fatal.
    ///
    /// The returned session is `Connecting`; [`run`](GroundStation::run) moves it on.
    pub async fn connect(&self) -> Result<(TcpStream, Arc<Session>), GroundError> {
        let session = Arc::new(Session::new());
        session.transition(LinkState::Connecting)?;

        let address = self.config.drone_address();
        let stream = TcpStream::connect(&address).await.map_err(|source| {
            session.close();
            GroundError::Connect {
                address: address.clone(),
                source,
            }
        })?;

        info!(session = %session.id(), address = %address, "Connected to drone");
        Ok((stream, session))
    }

    /// Run the receive loop and the operator loop over `stream` until either ends.
    ///
    /// The session closes when the drone disconnects or when `input` is exhausted.
    pub async fn run<S, I, C>(
        &self,
        stream: S,
        session: Arc<Session>,
        mut input: I,
        console: Arc<C>,
    ) -> Result<GroundSummary, GroundError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        I: OperatorInput,
        C: Console + ?Sized + 'static,
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

        let mailbox = Arc::new(AckMailbox::new());
        let typing = Arc::new(AtomicBool::new(false));

        let receive = ReceiveLoop::new(
            Arc::clone(&mailbox),
            Arc::clone(&typing),
            Arc::clone(&console),
            Arc::clone(&session),
        );
        let receive_task = tokio::spawn(receive.run(framed_lines(receiver, LineFramer::verbatim())));

        let mut client = RetryClient::new(
            self.config.retry.clone(),
            sender,
            mailbox,
            Arc::clone(&console),
            Arc::clone(&session),
        );
        let mut summary = GroundSummary::default();

        let result = loop {
            if !session.is_open() {
                break Ok(());
            }

            let next = tokio::select! {
                next = input.next_line(&typing) => next,
                _ = session.closed() => break Ok(()),
            };
            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!(session = %session.id(), "Operator input closed");
                    break Ok(());
                }
                Err(e) => break Err(GroundError::Input(e)),
            };

            if !session.is_open() {
                break Ok(());
            }
            if line.is_empty() {
                continue;
            }

            summary.commands_sent += 1;
            match client.send_command(&line).await {
                Ok(CommandOutcome::Acknowledged { .. }) => {
                    summary.acknowledged += 1;
                    console.show("OK");
                }
                Ok(CommandOutcome::TimedOut { .. }) => {
                    summary.timed_out += 1;
                    console.show("TIMEOUT");
                }
                Err(LinkError::Closed) => break Ok(()),
                Err(e) => break Err(GroundError::Link(e)),
            }
        };

        session.close();
        if let Err(e) = receive_task.await {
            warn!(session = %session.id(), error = %e, "Receive task failed");
        }

        result.map(|()| summary)
    }
}
