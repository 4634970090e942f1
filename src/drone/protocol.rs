use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{info, warn};

use super::error::CommandError;
use crate::link::ACK_PREFIX;
use crate::telemetry::TelemetryState;

/// The leading token of a command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Takeoff,
    Land,
    Stop,
    Goto,
    Unknown,
}

impl CommandKind {
    const VOCABULARY: [(&'static str, CommandKind); 4] = [
        ("TAKEOFF", CommandKind::Takeoff),
        ("LAND", CommandKind::Land),
        ("STOP", CommandKind::Stop),
        ("GOTO", CommandKind::Goto),
    ];

    /// Exact, case-sensitive match of the first whitespace-delimited token.
    pub fn from_line(line: &str) -> Self {
        let token = line.split(char::is_whitespace).next().unwrap_or_default();
        Self::VOCABULARY
            .iter()
            .find(|(word, _)| *word == token)
            .map_or(CommandKind::Unknown, |(_, kind)| *kind)
    }
}

/// Navigation target carried by `GOTO`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GotoTarget {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl GotoTarget {
    /// Truncate each coordinate toward zero.
    pub fn truncated(&self) -> (i32, i32, i32) {
        (self.x as i32, self.y as i32, self.z as i32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Takeoff,
    Land,
    Stop,
    Goto(GotoTarget),
    Unknown(String),
}

impl FromStr for Command {
    type Err = CommandError;

    /// Only a `GOTO` with bad arguments fails; unrecognised lines become [`Command::Unknown`].
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        Ok(match CommandKind::from_line(line) {
            CommandKind::Takeoff => Command::Takeoff,
            CommandKind::Land => Command::Land,
            CommandKind::Stop => Command::Stop,
            CommandKind::Goto => Command::Goto(parse_goto(line)?),
            CommandKind::Unknown => Command::Unknown(line.to_string()),
        })
    }
}

fn parse_goto(line: &str) -> Result<GotoTarget, CommandError> {
    let invalid = || CommandError::InvalidGoto {
        line: line.to_string(),
    };

    let args = line.strip_prefix("GOTO ").ok_or_else(invalid)?;
    let mut values = args.split_whitespace().map(|token| {
        token
            .parse::<f32>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(invalid)
    });

    let (Some(x), Some(y), Some(z), None) =
        (values.next(), values.next(), values.next(), values.next())
    else {
        return Err(invalid());
    };

    Ok(GotoTarget {
        x: x?,
        y: y?,
        z: z?,
    })
}

/// What handling one line did, alongside the acknowledgment to send back.
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    pub command: Result<Command, CommandError>,
    pub ack: Bytes,
}

/// Drone-side command handling.
///
/// Only `GOTO` changes telemetry. Every line, valid or not, is acknowledged.
#[derive(Debug, Clone)]
pub struct CommandProtocol {
    telemetry: TelemetryState,
}

impl CommandProtocol {
    pub fn new(telemetry: TelemetryState) -> Self {
        Self { telemetry }
    }

    /// Apply `line` and build its acknowledgment, `OK <line>\n`.
    ///
    /// `line` is the raw framed line. Bytes that are not valid UTF-8 cannot form a known command
    /// but are echoed back unchanged.
    pub fn handle(&self, line: &[u8]) -> Handled {
        let text = String::from_utf8_lossy(line);
        let command = text.parse::<Command>();

        match &command {
            Ok(Command::Takeoff) => info!("Drone taking off"),
            Ok(Command::Land) => info!("Drone landing"),
            Ok(Command::Stop) => info!("Emergency stop engaged"),
            Ok(Command::Goto(target)) => {
                let (x, y, z) = target.truncated();
                self.telemetry.set_position(x, y, z);
                info!(x = target.x, y = target.y, z = target.z, "Navigating to target");
            }
            Ok(Command::Unknown(text)) => info!(line = %text, "Unknown command"),
            Err(err) => warn!(error = %err, "Invalid GOTO format"),
        }

        Handled {
            command,
            ack: acknowledgment(line),
        }
    }
}

/// Build `OK <line>\n`.
pub fn acknowledgment(line: &[u8]) -> Bytes {
    let mut ack = BytesMut::with_capacity(ACK_PREFIX.len() + line.len() + 1);
    ack.put_slice(ACK_PREFIX.as_bytes());
    ack.put_slice(line);
    ack.put_u8(b'\n');
    ack.freeze()
}
