//! Safety layer: validates user-supplied parameters against the panel's
//! known ranges before anything is sent to the device.
//!
//! # PL81-Pro bounds
//!
//! ## Brightness
//! - **Range**: 0 – 100 percent, one byte.
//!
//! ## Color temperature
//! - **Range**: 2900 K – 7000 K, 19 buckets (`0x00..=0x12`).
//! - Bytes above `0x12` are accepted by the panel but clamp to 7000 K, so
//!   raw values are capped at the last bucket here.
//!
//! ## Report buffer
//! - The vendor app pads to 192 bytes. Padding targets are capped at
//!   [`MAX_PAD`] so a typo cannot produce a multi-kilobyte control transfer.
//! - The floor is [`MIN_PAD`], the longest length-prefixed CCT frame, so
//!   every padded strategy in the catalog can frame every probe command.
//!
//! Validation happens before any HID communication; no out-of-range value
//! ever reaches the device.

use crate::command::{BRIGHTNESS_MAX, FRAME_OVERHEAD, TEMP_MAX_K, TEMP_MIN_K, TEMP_STEPS};
use crate::error::{Error, Result};

/// Smallest padding target: length prefix plus a framed CCT command.
pub const MIN_PAD: usize = 1 + FRAME_OVERHEAD + 3;

/// Largest padding target accepted from configuration or the command line.
pub const MAX_PAD: usize = 1024;

/// Validate a brightness percentage.
pub fn validate_brightness(value: u16) -> Result<u8> {
    if value > u16::from(BRIGHTNESS_MAX) {
        return Err(Error::OutOfRange {
            field: "brightness",
            value: u32::from(value),
            min: 0,
            max: u32::from(BRIGHTNESS_MAX),
        });
    }
    Ok(value as u8)
}

/// Validate a color temperature in Kelvin.
pub fn validate_kelvin(kelvin: u32) -> Result<u32> {
    if !(TEMP_MIN_K..=TEMP_MAX_K).contains(&kelvin) {
        return Err(Error::OutOfRange {
            field: "kelvin",
            value: kelvin,
            min: TEMP_MIN_K,
            max: TEMP_MAX_K,
        });
    }
    Ok(kelvin)
}

/// Validate a raw temperature bucket.
pub fn validate_temp_byte(value: u16) -> Result<u8> {
    if value > TEMP_STEPS as u16 {
        return Err(Error::OutOfRange {
            field: "temp_byte",
            value: u32::from(value),
            min: 0,
            max: TEMP_STEPS,
        });
    }
    Ok(value as u8)
}

/// Validate a report padding target.
pub fn validate_pad_to(pad_to: usize) -> Result<usize> {
    if !(MIN_PAD..=MAX_PAD).contains(&pad_to) {
        return Err(Error::OutOfRange {
            field: "pad_to",
            value: pad_to.min(u32::MAX as usize) as u32,
            min: MIN_PAD as u32,
            max: MAX_PAD as u32,
        });
    }
    Ok(pad_to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brightness_in_range() {
        assert_eq!(validate_brightness(0).unwrap(), 0);
        assert_eq!(validate_brightness(100).unwrap(), 100);
    }

    #[test]
    fn brightness_out_of_range() {
        assert!(validate_brightness(101).is_err());
        assert!(validate_brightness(255).is_err());
    }

    #[test]
    fn kelvin_bounds() {
        assert_eq!(validate_kelvin(2900).unwrap(), 2900);
        assert_eq!(validate_kelvin(7000).unwrap(), 7000);
        assert!(validate_kelvin(2899).is_err());
        assert!(validate_kelvin(7001).is_err());
    }

    #[test]
    fn temp_byte_bounds() {
        assert_eq!(validate_temp_byte(0x12).unwrap(), 0x12);
        assert!(validate_temp_byte(0x13).is_err());
    }

    #[test]
    fn pad_to_bounds() {
        assert_eq!(validate_pad_to(192).unwrap(), 192);
        assert_eq!(validate_pad_to(MIN_PAD).unwrap(), 9);
        assert!(validate_pad_to(0).is_err());
        assert!(validate_pad_to(8).is_err());
        assert!(validate_pad_to(MAX_PAD + 1).is_err());
    }

    #[test]
    fn smallest_pad_frames_the_whole_catalog() {
        use crate::command::probe_commands;
        use crate::framing::catalog;

        for strategy in catalog(MIN_PAD) {
            for cmd in probe_commands() {
                assert!(strategy.frame(&cmd.command).is_ok(), "{}", strategy.label);
            }
        }
    }

    #[test]
    fn error_names_the_field() {
        let err = validate_kelvin(9000).unwrap_err();
        assert_eq!(
            err.to_string(),
            "value out of range: kelvin = 9000 (allowed 2900..=7000)"
        );
    }
}
