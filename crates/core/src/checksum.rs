//! 16-bit additive checksum used by every command frame.
//!
//! The device sums all preceding bytes into a `u16`, discarding overflow,
//! and expects the result big-endian at the tail of the frame.

/// Compute the checksum of `data`, returned as `[hi, lo]`.
pub fn checksum(data: &[u8]) -> [u8; 2] {
    let sum = data
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));
    sum.to_be_bytes()
}

/// Check that the last two bytes of `frame` are the checksum of the rest.
pub fn verify(frame: &[u8]) -> bool {
    match frame.len().checked_sub(2) {
        Some(split) => checksum(&frame[..split]) == frame[split..],
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(checksum(&[]), [0x00, 0x00]);
    }

    #[test]
    fn power_on_sum() {
        assert_eq!(checksum(&[0x3A, 0x06, 0x01, 0x01]), [0x00, 0x42]);
    }

    #[test]
    fn cct_sum() {
        // 0x3A + 0x02 + 0x03 + 0x01 + 0x64 + 0x09 = 0xAD
        assert_eq!(checksum(&[0x3A, 0x02, 0x03, 0x01, 0x64, 0x09]), [0x00, 0xAD]);
    }

    #[test]
    fn high_byte_carries() {
        assert_eq!(checksum(&[0xFF, 0xFF, 0x02]), [0x02, 0x00]);
    }

    #[test]
    fn wraps_past_u16() {
        // 258 * 0xFF = 0x100FE, truncated to 0x00FE
        let data = vec![0xFFu8; 258];
        assert_eq!(checksum(&data), [0x00, 0xFE]);
    }

    #[test]
    fn verify_accepts_valid_frame() {
        assert!(verify(&[0x3A, 0x06, 0x01, 0x01, 0x00, 0x42]));
    }

    #[test]
    fn verify_rejects_bad_frame() {
        assert!(!verify(&[0x3A, 0x06, 0x01, 0x01, 0x00, 0x43]));
        assert!(!verify(&[0x00]));
        // Two zero bytes are the checksum of an empty body.
        assert!(verify(&[0x00, 0x00]));
    }
}
