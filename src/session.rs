use std::fmt;

use tokio::sync::watch;
use uuid::Uuid;

/// Random per-connection tag carried in log fields.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct SessionId(Uuid);

impl SessionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Shows the first uuid group, enough to tell sessions apart in a log.
impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// Where a link is in its lifecycle.
///
/// ```text
/// Disconnected -> Listening | Connecting -> Connected -> Closed
/// ```
///
/// `Closed` is terminal and reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Listening,
    Connecting,
    Connected,
    Closed,
}

impl LinkState {
    fn can_become(self, next: LinkState) -> bool {
        use LinkState::*;
        matches!(
            (self, next),
            (Disconnected, Listening | Connecting)
                | (Listening | Connecting, Connected)
                | (Disconnected | Listening | Connecting | Connected, Closed)
        )
    }
}

/// Indicates a lifecycle step that the state machine does not allow.
#[derive(Debug, thiserror::Error)]
#[error("session {session_id} cannot move from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub session_id: SessionId,
    pub from: LinkState,
    pub to: LinkState,
}

/// Shared lifecycle of a single link, observed by both loops of a node.
///
/// Loops check [`is_open`](Session::is_open) at the top of each iteration; a loop parked on
/// something else can await [`closed`](Session::closed) instead.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: watch::Sender<LinkState>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::generate(),
            state: watch::Sender::new(LinkState::Disconnected),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Advance the lifecycle, rejecting steps the lifecycle does not allow.
    pub fn transition(&self, next: LinkState) -> Result<(), InvalidTransition> {
        let mut from = next;
        let moved = self.state.send_if_modified(|current| {
            from = *current;
            if current.can_become(next) {
                *current = next;
                true
            } else {
                false
            }
        });

        if moved {
            Ok(())
        } else {
            Err(InvalidTransition {
                session_id: self.id,
                from,
                to: next,
            })
        }
    }

    /// Move to `Closed`. Returns `false` if the session was already closed.
    pub fn close(&self) -> bool {
        self.transition(LinkState::Closed).is_ok()
    }

    /// Resolve once the session has been closed.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the wait cannot observe a dropped channel.
        let _ = rx.wait_for(|state| *state == LinkState::Closed).await;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_server_lifecycle() {
        let session = Session::new();
        assert_eq!(session.state(), LinkState::Disconnected);
        assert!(!session.is_open());

        session.transition(LinkState::Listening).unwrap();
        session.transition(LinkState::Connected).unwrap();
        assert!(session.is_open());

        assert!(session.close());
        assert_eq!(session.state(), LinkState::Closed);
        assert!(!session.is_open());
    }

    #[test]
    fn test_closed_is_terminal() {
        let session = Session::new();
        session.transition(LinkState::Connecting).unwrap();
        session.transition(LinkState::Connected).unwrap();
        assert!(session.close());

        // No reconnection on the same session
        let err = session.transition(LinkState::Connected).unwrap_err();
        assert_eq!(err.from, LinkState::Closed);
        assert_eq!(err.to, LinkState::Connected);
        assert!(!session.close());
    }

    #[test]
    fn test_cannot_skip_to_connected() {
        let session = Session::new();
        assert!(session.transition(LinkState::Connected).is_err());
        assert_eq!(session.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_unique_ids() {
        assert_ne!(Session::new().id(), Session::new().id());
    }

    #[test]
    fn test_id_display_is_short() {
        let session = Session::new();
        let shown = session.id().to_string();
        assert_eq!(shown.len(), 8);
        assert!(shown.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_closed_wakes_waiter() {
        let session = Arc::new(Session::new());
        session.transition(LinkState::Connecting).unwrap();
        session.transition(LinkState::Connected).unwrap();

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.closed().await })
        };

        tokio::task::yield_now().await;
        session.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }
}
