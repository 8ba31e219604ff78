//! Hybrid logical clock timestamps.
//!
//! An `HlcTimestamp` combines wall-clock milliseconds, a logical counter,
//! and the originating device id. Timestamps are totally ordered across
//! devices without synchronized clocks, and the canonical string form is
//! zero-padded so lexicographic order equals logical order — SQL range
//! scans on the text column need no decoding.

use serde::de::{self, Deserialize, Deserializer};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;

/// Error parsing a canonical HLC string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid HLC timestamp: {0}")]
pub struct HlcParseError(String);

/// A hybrid logical clock value.
///
/// Field order matters: the derived `Ord` compares wall time, then counter,
/// then device id, which matches the canonical string encoding.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HlcTimestamp {
    wall_ms: u64,
    counter: u32,
    device_id: String,
}

impl HlcTimestamp {
    pub fn new(wall_ms: u64, counter: u32, device_id: impl Into<String>) -> Self {
        Self {
            wall_ms,
            counter,
            device_id: device_id.into(),
        }
    }

    pub fn wall_ms(&self) -> u64 {
        self.wall_ms
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

impl fmt::Display for HlcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 15 digits of millis (enough until year 33658) and 10 of counter.
        write!(
            f,
            "{:015}-{:010}-{}",
            self.wall_ms, self.counter, self.device_id
        )
    }
}

impl FromStr for HlcTimestamp {
    type Err = HlcParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '-');
        let (wall, counter, device) = match (parts.next(), parts.next(), parts.next()) {
            (Some(w), Some(c), Some(d)) if !d.is_empty() => (w, c, d),
            _ => return Err(HlcParseError(s.to_string())),
        };
        let wall_ms: u64 = wall.parse().map_err(|_| HlcParseError(s.to_string()))?;
        let counter: u32 = counter.parse().map_err(|_| HlcParseError(s.to_string()))?;
        Ok(Self {
            wall_ms,
            counter,
            device_id: device.to_string(),
        })
    }
}

impl Serialize for HlcTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HlcTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Per-device HLC generator.
///
/// `now()` is strictly increasing for a given clock even if the wall clock
/// stalls or steps backwards. `observe()` applies the HLC receive rule so
/// locally generated timestamps always sort after everything already seen.
pub struct HlcClock {
    device_id: String,
    state: Mutex<(u64, u32)>,
}

impl HlcClock {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            state: Mutex::new((0, 0)),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the next timestamp for this device.
    pub fn now(&self) -> HlcTimestamp {
        let wall = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut state = self.state.lock().unwrap();
        if wall > state.0 {
            *state = (wall, 0);
        } else {
            state.1 += 1;
        }
        HlcTimestamp::new(state.0, state.1, self.device_id.clone())
    }

    /// Advances the clock past a remote timestamp.
    pub fn observe(&self, remote: &HlcTimestamp) {
        let mut state = self.state.lock().unwrap();
        if remote.wall_ms > state.0 {
            *state = (remote.wall_ms, remote.counter);
        } else if remote.wall_ms == state.0 && remote.counter > state.1 {
            state.1 = remote.counter;
        }
    }
}
