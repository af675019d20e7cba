//! Bit and nybble primitives.
//!
//! Every function here is a pure transform: setters return the new byte and
//! the caller must use the result. The K5 wire format packs flags into the
//! top bits of value bytes throughout, so these are the bedrock of the codec.

/// True if bit `index` (0 = LSB) of `b` is set.
#[inline]
pub fn bit(b: u8, index: u8) -> bool {
    b & (1 << (index & 7)) != 0
}

/// Returns `b` with bit `index` set to `value`.
#[inline]
#[must_use = "with_bit returns the new byte; the input is unchanged"]
pub fn with_bit(b: u8, index: u8, value: bool) -> u8 {
    let mask = 1u8 << (index & 7);
    if value {
        b | mask
    } else {
        b & !mask
    }
}

/// Splits a byte into its (high, low) nybbles, each 0..=15.
#[inline]
pub fn nybbles(b: u8) -> (u8, u8) {
    (b >> 4, b & 0x0F)
}

/// Combines two nybbles into one byte. Inputs are masked to 4 bits.
#[inline]
pub fn byte_from_nybbles(high: u8, low: u8) -> u8 {
    ((high & 0x0F) << 4) | (low & 0x0F)
}

/// Reinterprets a wire byte as a two's-complement signed value.
#[inline]
pub fn to_signed(b: u8) -> i8 {
    b as i8
}

/// Reinterprets a signed value as its two's-complement wire byte.
#[inline]
pub fn from_signed(v: i8) -> u8 {
    v as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_roundtrip() {
        for i in 0..8 {
            for v in [false, true] {
                assert_eq!(bit(with_bit(0x00, i, v), i), v);
                assert_eq!(bit(with_bit(0xFF, i, v), i), v);
            }
        }
    }

    #[test]
    fn test_with_bit_idempotent() {
        for i in 0..8 {
            let once = with_bit(0x5A, i, true);
            assert_eq!(with_bit(once, i, true), once);
            let cleared = with_bit(0x5A, i, false);
            assert_eq!(with_bit(cleared, i, false), cleared);
        }
    }

    #[test]
    fn test_nybbles() {
        assert_eq!(nybbles(0x41), (0x04, 0x01));
        assert_eq!(byte_from_nybbles(0x04, 0x01), 0x41);
        // out-of-range inputs are masked, never panics
        assert_eq!(byte_from_nybbles(0xF4, 0xF1), 0x41);
        for b in 0..=255u8 {
            let (hi, lo) = nybbles(b);
            assert_eq!(byte_from_nybbles(hi, lo), b);
        }
    }

    #[test]
    fn test_signed() {
        assert_eq!(to_signed(0xFF), -1);
        assert_eq!(to_signed(0x7F), 127);
        assert_eq!(from_signed(-31), 0xE1);
        for b in 0..=255u8 {
            assert_eq!(from_signed(to_signed(b)), b);
        }
    }
}
