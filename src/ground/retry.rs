use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tracing::{debug, info};

use super::console::Console;
use super::mailbox::AckMailbox;
use crate::link::{ChannelSender, LinkError};
use crate::session::Session;
use crate::state_machine::StateMachine;
use crate::state_machine::retry::{RetryInput, RetryMachine, RetryOutput, RetryPolicy};
use crate::state_machine::wrappers::input::system::SystemInput;

/// Result of delivering one operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Acknowledged { ack: String, attempts: u32 },
    TimedOut { attempts: u32 },
}

/// Drives a [`RetryMachine`]: sends packets, polls the ack mailbox and feeds the clock.
///
/// Commands are delivered one at a time; [`send_command`](RetryClient::send_command) returns
/// only once the previous command has either been acknowledged or timed out.
pub struct RetryClient<W, C: ?Sized> {
    machine: RetryMachine,
    poll_interval: Duration,
    sender: ChannelSender<W>,
    mailbox: Arc<AckMailbox>,
    console: Arc<C>,
    session: Arc<Session>,
}

impl<W, C> RetryClient<W, C>
where
    W: AsyncWrite + Unpin,
    C: Console + ?Sized,
{
    pub fn new(
        policy: RetryPolicy,
        sender: ChannelSender<W>,
        mailbox: Arc<AckMailbox>,
        console: Arc<C>,
        session: Arc<Session>,
    ) -> Self {
        Self {
            poll_interval: policy.poll_interval,
            machine: RetryMachine::new(policy),
            sender,
            mailbox,
            console,
            session,
        }
    }

    /// Send `line` with a trailing newline and wait for its acknowledgment, retrying per policy.
    ///
    /// Fails only if the link breaks or the session closes mid-command. The command is then
    /// abandoned and the client is ready for the next one.
    pub async fn send_command(&mut self, line: &str) -> Result<CommandOutcome, LinkError> {
        let packet = Bytes::from(format!("{line}\n"));
        self.mailbox.clear();
        self.machine
            .process_input(SystemInput::Input(RetryInput::Submit(packet)));

        let result = self.deliver(line).await;
        if result.is_err() {
            self.machine
                .process_input(SystemInput::Input(RetryInput::Abort));
        }
        result
    }

    async fn deliver(&mut self, line: &str) -> Result<CommandOutcome, LinkError> {
        loop {
            while let Some(output) = self.machine.poll_output() {
                match output {
                    RetryOutput::Transmit { packet, attempt } => {
                        debug!(attempt, command = %line, "Sending command");
                        self.sender.send(&packet).await?;
                        self.machine.process_input(SystemInput::now());
                    }
                    RetryOutput::Retrying {
                        attempt,
                        max_attempts,
                    } => {
                        info!(attempt, max_attempts, command = %line, "No acknowledgment, retrying");
                        self.console
                            .show(&format!("retrying ({attempt}/{max_attempts})..."));
                    }
                    RetryOutput::Acknowledged { ack, attempts } => {
                        return Ok(CommandOutcome::Acknowledged { ack, attempts });
                    }
                    RetryOutput::TimedOut { attempts } => {
                        info!(attempts, command = %line, "Command timed out");
                        return Ok(CommandOutcome::TimedOut { attempts });
                    }
                }
            }

            if !self.session.is_open() {
                return Err(LinkError::Closed);
            }

            tokio::time::sleep(self.poll_interval).await;

            if let Some(ack) = self.mailbox.take() {
                self.machine
                    .process_input(SystemInput::Input(RetryInput::Ack(ack)));
            }
            self.machine.process_input(SystemInput::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground::console::testing::RecordingConsole;
    use crate::link::{LineFramer, LinkConfig, framed_lines};
    use crate::session::LinkState;
    use futures::StreamExt;
    use std::io;
    use std::pin::{Pin, pin};
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, DuplexStream, ReadHalf, WriteHalf};
    use tokio::time::Instant;

    type Client = RetryClient<WriteHalf<DuplexStream>, RecordingConsole>;

    fn connected() -> Arc<Session> {
        let session = Arc::new(Session::new());
        session.transition(LinkState::Connecting).unwrap();
        session.transition(LinkState::Connected).unwrap();
        session
    }

    /// A client wired to one end of a pipe, plus the raw far end.
    fn client() -> (Client, Arc<AckMailbox>, Arc<RecordingConsole>, DuplexStream) {
        let (near, far) = tokio::io::duplex(4096);
        let (r, w) = tokio::io::split(near);
        let config = LinkConfig::builder().corruption_rate(0.0).build();
        let (sender, _receiver) = config.open(r, w).unwrap();
        let mailbox = Arc::new(AckMailbox::new());
        let console = Arc::new(RecordingConsole::default());
        let client = RetryClient::new(
            RetryPolicy::default(),
            sender,
            Arc::clone(&mailbox),
            Arc::clone(&console),
            connected(),
        );
        (client, mailbox, console, far)
    }

    async fn count_lines<R: AsyncRead + Unpin>(reader: ReadHalf<R>) -> usize {
        let config = LinkConfig::builder().corruption_rate(0.0).build();
        let (_s, receiver) = config.open(reader, tokio::io::sink()).unwrap();
        let mut lines = pin!(framed_lines(receiver, LineFramer::verbatim()));
        let mut count = 0;
        while let Some(Ok(line)) = lines.next().await {
            assert_eq!(&line[..], b"STOP");
            count += 1;
        }
        count
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_gets_five_attempts_then_timeout() {
        let (mut client, _mailbox, console, far) = client();
        let (far_read, _far_write) = tokio::io::split(far);
        let counter = tokio::spawn(count_lines(far_read));

        let start = Instant::now();
        let outcome = client.send_command("STOP").await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(outcome, CommandOutcome::TimedOut { attempts: 5 });
        assert!(elapsed >= Duration::from_secs(5), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(5200), "{elapsed:?}");
        assert_eq!(
            console.lines(),
            vec![
                "retrying (1/5)...",
                "retrying (2/5)...",
                "retrying (3/5)...",
                "retrying (4/5)...",
            ]
        );

        drop(client);
        assert_eq!(counter.await.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_completes_command() {
        let (mut client, mailbox, console, _far) = client();

        let responder = {
            let mailbox = Arc::clone(&mailbox);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(120)).await;
                mailbox.deliver("OK TAKEOFF".into());
            })
        };

        let outcome = client.send_command("takeoff").await.unwrap();
        responder.await.unwrap();

        assert_eq!(
            outcome,
            CommandOutcome::Acknowledged {
                ack: "OK TAKEOFF".into(),
                attempts: 1
            }
        );
        assert!(console.lines().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_ack_before_submit_is_discarded() {
        let (mut client, mailbox, _console, _far) = client();
        mailbox.deliver("OK LAND".into());

        let outcome = client.send_command("STOP").await.unwrap();
        assert_eq!(outcome, CommandOutcome::TimedOut { attempts: 5 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_on_third_attempt() {
        let (mut client, mailbox, console, _far) = client();

        let responder = {
            let mailbox = Arc::clone(&mailbox);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                mailbox.deliver("OK STOP".into());
            })
        };

        let outcome = client.send_command("STOP").await.unwrap();
        responder.await.unwrap();

        assert_eq!(
            outcome,
            CommandOutcome::Acknowledged {
                ack: "OK STOP".into(),
                attempts: 3
            }
        );
        assert_eq!(console.lines(), vec!["retrying (1/5)...", "retrying (2/5)..."]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_session_aborts_wait() {
        let (near, _far) = tokio::io::duplex(4096);
        let (r, w) = tokio::io::split(near);
        let config = LinkConfig::builder().corruption_rate(0.0).build();
        let (sender, _receiver) = config.open(r, w).unwrap();
        let session = connected();
        let mut client = RetryClient::new(
            RetryPolicy::default(),
            sender,
            Arc::new(AckMailbox::new()),
            Arc::new(RecordingConsole::default()),
            Arc::clone(&session),
        );

        let closer = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                session.close();
            })
        };

        assert!(matches!(
            client.send_command("LAND").await,
            Err(LinkError::Closed)
        ));
        closer.await.unwrap();
    }

    /// Writer whose first `failures` writes fail with a broken pipe.
    struct FlakyWriter {
        failures: usize,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl AsyncWrite for FlakyWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.failures > 0 {
                self.failures -= 1;
                return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
            }
            self.written.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_does_not_block_next_command() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let writer = FlakyWriter {
            failures: 1,
            written: Arc::clone(&written),
        };
        let config = LinkConfig::builder().corruption_rate(0.0).build();
        let (sender, _receiver) = config.open(tokio::io::empty(), writer).unwrap();
        let mailbox = Arc::new(AckMailbox::new());
        let mut client = RetryClient::new(
            RetryPolicy::default(),
            sender,
            Arc::clone(&mailbox),
            Arc::new(RecordingConsole::default()),
            connected(),
        );

        assert!(matches!(
            client.send_command("STOP").await,
            Err(LinkError::Io(_))
        ));

        let responder = {
            let mailbox = Arc::clone(&mailbox);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(120)).await;
                mailbox.deliver("OK LAND".into());
            })
        };
        let outcome = client.send_command("LAND").await.unwrap();
        responder.await.unwrap();

        assert_eq!(
            outcome,
            CommandOutcome::Acknowledged {
                ack: "OK LAND".into(),
                attempts: 1
            }
        );
        assert_eq!(written.lock().unwrap().as_slice(), b"LAND\n");
    }
}
