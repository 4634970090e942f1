use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use super::console::Console;
use super::mailbox::AckMailbox;
use crate::link::{ACK_PREFIX, LinkError};
use crate::session::Session;

/// Ground-side reader: routes acknowledgments to the mailbox and shows everything else.
pub struct ReceiveLoop<C: ?Sized> {
    mailbox: Arc<AckMailbox>,
    typing: Arc<AtomicBool>,
    console: Arc<C>,
    session: Arc<Session>,
}

impl<C: Console + ?Sized> ReceiveLoop<C> {
    pub fn new(
        mailbox: Arc<AckMailbox>,
        typing: Arc<AtomicBool>,
        console: Arc<C>,
        session: Arc<Session>,
    ) -> Self {
        Self {
            mailbox,
            typing,
            console,
            session,
        }
    }

    /// Consume `lines` until the link or the session closes, then close the session.
    pub async fn run<L>(self, lines: L)
    where
        L: Stream<Item = Result<Bytes, LinkError>>,
    {
        let mut lines = pin!(lines);

        while self.session.is_open() {
            let next = tokio::select! {
                next = lines.next() => next,
                _ = self.session.closed() => break,
            };
            match next {
                Some(Ok(line)) => self.route(&line),
                Some(Err(e)) => {
                    warn!(session = %self.session.id(), error = %e, "Receive failed");
                    break;
                }
                None => break,
            }
        }

        if self.session.close() {
            info!(session = %self.session.id(), "Disconnected from drone");
            self.console.show("Disconnected from server");
        }
    }

    fn route(&self, line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        if text.starts_with(ACK_PREFIX) {
            debug!(ack = %text, "Acknowledgment received");
            self.mailbox.deliver(text.into_owned());
        } else if !self.typing.load(Ordering::Relaxed) {
            self.console.show(&text);
        }
    }
}
