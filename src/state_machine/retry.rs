use std::collections::VecDeque;

use bon::Builder;
use bytes::Bytes;
use tokio::time::{Duration, Instant};
use tracing::debug;

use super::StateMachine;
use super::wrappers::input::system::SystemInput;
use crate::link::ACK_PREFIX;

/// Bounds for delivering a single command.
#[derive(Debug, Clone, Builder)]
pub struct RetryPolicy {
    /// Sends per command before giving up. Values below 1 are treated as 1.
    #[builder(default = 5)]
    pub max_attempts: u32,

    /// How long each attempt waits for an acknowledgment.
    #[builder(default = Duration::from_secs(1))]
    pub ack_timeout: Duration,

    /// How often the runner checks the ack mailbox and the clock.
    #[builder(default = Duration::from_millis(50))]
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Where the machine is in delivering the outstanding command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Idle,
    /// A transmit was requested; the wait window opens on the next clock input.
    Sending { attempt: u32 },
    WaitingAck { attempt: u32, deadline: Instant },
}

pub enum RetryInput {
    /// Start delivering a newline-terminated packet.
    ///
    /// Ignored unless the machine is idle, so at most one command is ever outstanding.
    Submit(Bytes),
    /// An acknowledgment line taken from the ack mailbox.
    Ack(String),
    /// Drop the outstanding command without an outcome, e.g. after the link failed mid-send.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutput {
    /// The runner must send `packet` now.
    Transmit { packet: Bytes, attempt: u32 },
    /// `attempt` went unacknowledged and another one follows.
    Retrying { attempt: u32, max_attempts: u32 },
    Acknowledged { ack: String, attempts: u32 },
    TimedOut { attempts: u32 },
}

/// Send-and-wait state machine for the ground station's commands.
///
/// ```text
/// Idle -> Sending(1) -> WaitingAck -> Acknowledged            -> Idle
///                                  -> Sending(n + 1) (n < max)
///                                  -> TimedOut (n == max)     -> Idle
/// ```
///
/// Acknowledgments carry no identifier: any line starting with [`ACK_PREFIX`] that arrives while
/// a command is outstanding completes it, even if it was really meant for an earlier command.
/// Lines without the prefix are ignored and the wait continues.
#[derive(Debug)]
pub struct RetryMachine {
    policy: RetryPolicy,
    phase: RetryPhase,
    packet: Option<Bytes>,
    pending: VecDeque<RetryOutput>,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            phase: RetryPhase::Idle,
            packet: None,
            pending: VecDeque::new(),
        }
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == RetryPhase::Idle
    }

    fn max_attempts(&self) -> u32 {
        self.policy.max_attempts.max(1)
    }

    fn submit(&mut self, packet: Bytes) {
        if !self.is_idle() {
            debug!("Command already outstanding, ignoring submit");
            return;
        }
        self.packet = Some(packet);
        self.begin_attempt(1);
    }

    fn begin_attempt(&mut self, attempt: u32) {
        let Some(packet) = self.packet.clone() else {
            self.phase = RetryPhase::Idle;
            return;
        };
        self.phase = RetryPhase::Sending { attempt };
        self.pending
            .push_back(RetryOutput::Transmit { packet, attempt });
    }

    fn receive_ack(&mut self, ack: String) {
        let attempt = match self.phase {
            RetryPhase::Idle => {
                debug!(ack = %ack, "Dropping acknowledgment with no command outstanding");
                return;
            }
            RetryPhase::Sending { attempt } | RetryPhase::WaitingAck { attempt, .. } => attempt,
        };

        if !ack.starts_with(ACK_PREFIX) {
            debug!(ack = %ack, "Ignoring mailbox entry without acknowledgment prefix");
            return;
        }

        self.finish(RetryOutput::Acknowledged {
            ack,
            attempts: attempt,
        });
    }

    fn observe_clock(&mut self, now: Instant) {
        match self.phase {
            RetryPhase::Idle => {}
            RetryPhase::Sending { attempt } => {
                self.phase = RetryPhase::WaitingAck {
                    attempt,
                    deadline: now + self.policy.ack_timeout,
                };
            }
            RetryPhase::WaitingAck { attempt, deadline } if now >= deadline => {
                let max_attempts = self.max_attempts();
                if attempt < max_attempts {
                    self.pending.push_back(RetryOutput::Retrying {
                        attempt,
                        max_attempts,
                    });
                    self.begin_attempt(attempt + 1);
                } else {
                    self.finish(RetryOutput::TimedOut { attempts: attempt });
                }
            }
            RetryPhase::WaitingAck { .. } => {}
        }
    }

    fn abort(&mut self) {
        if !self.is_idle() {
            debug!(phase = ?self.phase, "Abandoning outstanding command");
        }
        self.phase = RetryPhase::Idle;
        self.packet = None;
        self.pending.clear();
    }

    fn finish(&mut self, outcome: RetryOutput) {
        self.phase = RetryPhase::Idle;
        self.packet = None;
        self.pending.push_back(outcome);
    }
}

impl StateMachine for RetryMachine {
    type Input = SystemInput<RetryInput, Instant>;
    type Output = RetryOutput;

    fn process_input(&mut self, input: Self::Input) {
        match input {
            SystemInput::Input(RetryInput::Submit(packet)) => self.submit(packet),
            SystemInput::Input(RetryInput::Ack(ack)) => self.receive_ack(ack),
            SystemInput::Input(RetryInput::Abort) => self.abort(),
            SystemInput::System(now) => self.observe_clock(now),
        }
    }

    fn poll_output(&mut self) -> Option<Self::Output> {
        self.pending.pop_front()
    }
}
