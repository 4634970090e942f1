use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// The drone's reported status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry {
    pub battery: i32,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub speed: i32,
    /// Heading in degrees. Not normalized.
    pub orientation: i32,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self {
            battery: 100,
            x: 0,
            y: 0,
            z: 0,
            speed: 50,
            orientation: 0,
        }
    }
}

impl Telemetry {
    /// Serialize to a newline-terminated wire line.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

/// Formats as `BAT:<int>% POS:(<int>,<int>,<int>) SPD:<int> ORI:<int>`.
impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BAT:{}% POS:({},{},{}) SPD:{} ORI:{}",
            self.battery, self.x, self.y, self.z, self.speed, self.orientation
        )
    }
}

/// A telemetry line did not follow the wire grammar.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed telemetry line: {line:?}")]
pub struct TelemetryParseError {
    pub line: String,
}

impl FromStr for Telemetry {
    type Err = TelemetryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TelemetryParseError {
            line: s.to_string(),
        };
        let int = |v: &str| v.parse::<i32>().map_err(|_| malformed());

        let rest = s.strip_prefix("BAT:").ok_or_else(malformed)?;
        let (battery, rest) = rest.split_once("% POS:(").ok_or_else(malformed)?;
        let (position, rest) = rest.split_once(") SPD:").ok_or_else(malformed)?;
        let (speed, orientation) = rest.split_once(" ORI:").ok_or_else(malformed)?;

        let mut coords = position.split(',');
        let (Some(x), Some(y), Some(z), None) =
            (coords.next(), coords.next(), coords.next(), coords.next())
        else {
            return Err(malformed());
        };

        Ok(Self {
            battery: int(battery)?,
            x: int(x)?,
            y: int(y)?,
            z: int(z)?,
            speed: int(speed)?,
            orientation: int(orientation)?,
        })
    }
}

/// Shared handle to the drone's single [`Telemetry`] record.
///
/// All access goes through one mutex, so a reader always observes a complete snapshot.
#[derive(Debug, Clone, Default)]
pub struct TelemetryState {
    inner: Arc<Mutex<Telemetry>>,
}

impl TelemetryState {
    pub fn new(initial: Telemetry) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    /// Copy the current record.
    pub fn snapshot(&self) -> Telemetry {
        *self.inner.lock().expect("telemetry lock poisoned")
    }

    /// Apply `update` while holding the guard.
    pub fn update<F: FnOnce(&mut Telemetry) -> R, R>(&self, update: F) -> R {
        let mut telemetry = self.inner.lock().expect("telemetry lock poisoned");
        update(&mut telemetry)
    }

    /// Move the reported position.
    pub fn set_position(&self, x: i32, y: i32, z: i32) {
        self.update(|t| {
            t.x = x;
            t.y = y;
            t.z = z;
        });
    }
}
