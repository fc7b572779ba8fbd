//! Command frame encoding and decoding.
//!
//! Every frame has the layout:
//!
//! ```text
//! [0x3A] [tag] [len] [payload; len] [cs_hi] [cs_lo]
//! ```
//!
//! where the checksum is the 16-bit big-endian sum of every preceding byte
//! (see [`crate::checksum`]).
//!
//! Protocol reference: NEEWER Control Center, decoded from the app binary
//! and confirmed against status echoes on the USB serial bridge.

use crate::checksum::{checksum, verify};
use serde::Serialize;

/// First byte of every frame.
pub const START_BYTE: u8 = 0x3A;

/// Bytes in a frame that are not payload: start, tag, len, two checksum bytes.
pub const FRAME_OVERHEAD: usize = 5;

/// Command tags.
pub mod tags {
    /// Power control; payload is one sub-command byte.
    pub const POWER: u8 = 0x06;
    /// Color temperature and brightness.
    pub const CCT: u8 = 0x02;
}

/// Power sub-commands.
pub mod power {
    pub const ON: u8 = 0x01;
    pub const OFF: u8 = 0x02;
}

/// Mode byte leading every CCT payload.
const CCT_MODE: u8 = 0x01;

/// Lowest color temperature of the PL81-Pro panel.
pub const TEMP_MIN_K: u32 = 2900;
/// Highest color temperature of the PL81-Pro panel.
pub const TEMP_MAX_K: u32 = 7000;
/// Number of steps between the extremes; buckets are `0x00..=0x12`.
pub const TEMP_STEPS: u32 = 18;
/// Midpoint used when no temperature is given.
pub const DEFAULT_TEMP_K: u32 = 4950;
/// Upper bound of the brightness byte.
pub const BRIGHTNESS_MAX: u8 = 100;

/// A complete, checksummed command frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Command {
    bytes: Vec<u8>,
}

impl Command {
    /// Build a frame from a tag and payload.
    pub fn new(tag: u8, payload: &[u8]) -> Self {
        assert!(
            payload.len() <= usize::from(u8::MAX),
            "payload of {} bytes does not fit the length byte",
            payload.len()
        );
        Self::from_parts(tag, payload.len() as u8, payload)
    }

    /// Build a frame with an explicitly declared payload length.
    ///
    /// # Panics
    ///
    /// Panics if `len` disagrees with `payload.len()`. A mismatch is a bug in
    /// the caller's command table, never something to recover from.
    pub fn from_parts(tag: u8, len: u8, payload: &[u8]) -> Self {
        assert_eq!(
            usize::from(len),
            payload.len(),
            "declared length {len} does not match payload of {} bytes (tag 0x{tag:02X})",
            payload.len()
        );

        let mut bytes = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
        bytes.push(START_BYTE);
        bytes.push(tag);
        bytes.push(len);
        bytes.extend_from_slice(payload);
        let cs = checksum(&bytes);
        bytes.extend_from_slice(&cs);
        Self { bytes }
    }

    /// Power the panel on.
    pub fn power_on() -> Self {
        Self::new(tags::POWER, &[power::ON])
    }

    /// Power the panel off.
    pub fn power_off() -> Self {
        Self::new(tags::POWER, &[power::OFF])
    }

    /// Set brightness (percent, clamped to 100) and a raw temperature bucket.
    pub fn cct(brightness: u8, temp_byte: u8) -> Self {
        Self::new(
            tags::CCT,
            &[CCT_MODE, brightness.min(BRIGHTNESS_MAX), temp_byte],
        )
    }

    /// Set brightness and color temperature in Kelvin.
    pub fn cct_kelvin(brightness: u8, kelvin: u32) -> Self {
        Self::cct(brightness, kelvin_to_byte(kelvin))
    }

    /// Raw frame bytes, checksum included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn tag(&self) -> u8 {
        self.bytes[1]
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[3..self.bytes.len() - 2]
    }

    pub fn checksum(&self) -> [u8; 2] {
        let n = self.bytes.len();
        [self.bytes[n - 2], self.bytes[n - 1]]
    }
}

impl AsRef<[u8]> for Command {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// A command paired with the label it is reported under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabeledCommand {
    pub label: String,
    pub command: Command,
}

impl LabeledCommand {
    pub fn new(label: impl Into<String>, command: Command) -> Self {
        Self {
            label: label.into(),
            command,
        }
    }
}

/// The commands exercised by the probe, in submission order.
///
/// Temperature bucket 0x09 is the midpoint of the range.
pub fn probe_commands() -> Vec<LabeledCommand> {
    vec![
        LabeledCommand::new("Power ON", Command::power_on()),
        LabeledCommand::new("CCT 100% temp=0x09", Command::cct(100, 0x09)),
        LabeledCommand::new("CCT 10% temp=0x09", Command::cct(10, 0x09)),
        LabeledCommand::new("Power OFF", Command::power_off()),
    ]
}

/// Convert Kelvin to the temperature bucket, clamping to the panel range.
pub fn kelvin_to_byte(kelvin: u32) -> u8 {
    let k = kelvin.clamp(TEMP_MIN_K, TEMP_MAX_K) - TEMP_MIN_K;
    let span = TEMP_MAX_K - TEMP_MIN_K;
    // Round half up in integer arithmetic.
    let step = (k * TEMP_STEPS * 2 + span) / (span * 2);
    step.min(TEMP_STEPS) as u8
}

/// Convert a temperature bucket back to Kelvin.
pub fn byte_to_kelvin(b: u8) -> u32 {
    let b = u32::from(b).min(TEMP_STEPS);
    TEMP_MIN_K + (b * (TEMP_MAX_K - TEMP_MIN_K) + TEMP_STEPS / 2) / TEMP_STEPS
}

/// Light state carried by a CCT status echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LightState {
    pub brightness: u8,
    pub temp_byte: u8,
}

impl LightState {
    pub fn kelvin(&self) -> u32 {
        byte_to_kelvin(self.temp_byte)
    }

    /// Decode an 8-byte CCT status packet.
    ///
    /// Returns `None` for anything that is not a CCT frame with a valid checksum.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let frame = data.get(..8)?;
        if frame[0] != START_BYTE || frame[1] != tags::CCT || frame[2] != 0x03 {
            return None;
        }
        if !verify(frame) {
            return None;
        }
        Some(Self {
            brightness: frame[4],
            temp_byte: frame[5],
        })
    }
}

impl std::fmt::Display for LightState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "brightness={}% temp={}K (0x{:02X})",
            self.brightness,
            self.kelvin(),
            self.temp_byte
        )
    }
}
