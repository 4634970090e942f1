use std::sync::Mutex;

#[derive(Debug, Default)]
struct Slot {
    last_ack: Option<String>,
    ready: bool,
}

/// Single-slot holder for the most recent acknowledgment.
///
/// The receive loop [`deliver`](AckMailbox::deliver)s, the retry client [`take`](AckMailbox::take)s.
/// A newer delivery overwrites an unconsumed one.
#[derive(Debug, Default)]
pub struct AckMailbox {
    slot: Mutex<Slot>,
}

impl AckMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `ack` and raise the ready flag.
    pub fn deliver(&self, ack: String) {
        let mut slot = self.slot.lock().expect("ack mailbox lock poisoned");
        slot.last_ack = Some(ack);
        slot.ready = true;
    }

    /// Consume the acknowledgment if the ready flag is raised.
    pub fn take(&self) -> Option<String> {
        let mut slot = self.slot.lock().expect("ack mailbox lock poisoned");
        if !slot.ready {
            return None;
        }
        slot.ready = false;
        slot.last_ack.clone()
    }

    /// Lower the ready flag without consuming, discarding anything left from an earlier command.
    pub fn clear(&self) {
        self.slot.lock().expect("ack mailbox lock poisoned").ready = false;
    }
}
