//! Base-62 integers over the alphabet `[0-9A-Za-z]`, most significant digit first.
//!
//! The lenient decoders skip characters outside the alphabet instead of failing. Packed
//! payloads in the wild contain stray separators, and older kits decode only because of
//! this, so [`decode_int`] and [`decode_fraction`] never reject input. Use
//! [`decode_int_strict`] when validation is wanted.

use crate::error::{DecodeError, Result};

pub const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const BASE: u64 = 62;

fn digit_value(ch: char) -> Option<u64> {
    match ch {
        '0'..='9' => Some(ch as u64 - '0' as u64),
        'A'..='Z' => Some(ch as u64 - 'A' as u64 + 10),
        'a'..='z' => Some(ch as u64 - 'a' as u64 + 36),
        _ => None,
    }
}

/// Encode a non-negative integer. `0` encodes to `"0"`.
pub fn encode(mut value: u64) -> String {
    if value == 0 {
        return (ALPHABET[0] as char).to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % BASE) as usize]);
        value /= BASE;
    }
    digits.reverse();
    // Every byte comes from ALPHABET, which is ASCII.
    digits.into_iter().map(char::from).collect()
}

/// Decode an integer, silently skipping characters outside the alphabet.
///
/// The empty string decodes to `0`. Values wider than 64 bits wrap.
pub fn decode_int(s: &str) -> u64 {
    s.chars()
        .filter_map(digit_value)
        .fold(0u64, |acc, d| acc.wrapping_mul(BASE).wrapping_add(d))
}

/// Decode an integer, rejecting unknown characters and overflow.
pub fn decode_int_strict(s: &str) -> Result<u64> {
    let mut acc = 0u64;
    for (position, ch) in s.chars().enumerate() {
        let d = digit_value(ch).ok_or(DecodeError::InvalidDigit { ch, position })?;
        acc = acc
            .checked_mul(BASE)
            .and_then(|v| v.checked_add(d))
            .ok_or_else(|| DecodeError::Overflow(s.to_string()))?;
    }
    Ok(acc)
}

/// Decode a base-62 fraction such as `"0.Vx"` into `[0, 1)`.
///
/// Everything up to and including the first `.` is stripped. The remainder `r` is decoded
/// as an integer `v`, and the result is `v / 62^len(r)`. Strings without a `.` are decoded
/// whole.
pub fn decode_fraction(s: &str) -> f64 {
    let digits = match s.split_once('.') {
        Some((_, rest)) => rest,
        None => s,
    };
    let len = digits.chars().count();
    if len == 0 {
        return 0.0;
    }

    let value = digits
        .chars()
        .filter_map(digit_value)
        .fold(0.0f64, |acc, d| acc * BASE as f64 + d as f64);
    value / (BASE as f64).powi(len as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_known_values() {
        assert_eq!(encode(0), "0");
        assert_eq!(encode(9), "9");
        assert_eq!(encode(10), "A");
        assert_eq!(encode(61), "z");
        assert_eq!(encode(62), "10");
        assert_eq!(encode(62 * 62 + 5), "105");
    }

    #[test]
    fn decode_known_values() {
        assert_eq!(decode_int(""), 0);
        assert_eq!(decode_int("z"), 61);
        assert_eq!(decode_int("10"), 62);
        assert_eq!(decode_int("1Z"), 62 + 35);
    }

    #[test]
    fn lenient_decode_skips_unknown_characters() {
        assert_eq!(decode_int("1-0"), 62);
        assert_eq!(decode_int("!!"), 0);
    }

    #[test]
    fn strict_decode_rejects_unknown_characters() {
        assert_eq!(
            decode_int_strict("1-0"),
            Err(DecodeError::InvalidDigit {
                ch: '-',
                position: 1
            })
        );
        assert_eq!(decode_int_strict("10"), Ok(62));
    }

    #[test]
    fn strict_decode_detects_overflow() {
        let too_long = "z".repeat(20);
        assert!(matches!(
            decode_int_strict(&too_long),
            Err(DecodeError::Overflow(_))
        ));
    }

    #[test]
    fn fraction_decoding() {
        assert_eq!(decode_fraction("0."), 0.0);
        assert_eq!(decode_fraction("0.0"), 0.0);
        // "V" is 31, half of 62
        assert!((decode_fraction("0.V") - 0.5).abs() < 1e-12);
        assert!((decode_fraction("0.z") - 61.0 / 62.0).abs() < 1e-12);
        assert!((decode_fraction("0.10") - 62.0 / 3844.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn roundtrip(n in 0u64..10_000_000_000u64) {
            prop_assert_eq!(decode_int(&encode(n)), n);
            prop_assert_eq!(decode_int_strict(&encode(n)), Ok(n));
        }

        #[test]
        fn fraction_in_unit_interval(s in "0\\.[0-9A-Za-z]{1,6}") {
            let f = decode_fraction(&s);
            prop_assert!((0.0..1.0).contains(&f));
        }
    }
}
