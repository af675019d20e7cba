//! The Kawai additive/complement checksum.
//!
//! The body is summed as little-endian 16-bit words and subtracted from a
//! fixed magic constant. It covers the collapsed (non-nybble) patch body up
//! to but not including the two checksum bytes, and is stored low byte first.

/// The constant the word sum is subtracted from.
const CHECKSUM_BASE: u16 = 0x5A3C;

/// Computes the checksum over `data`, treated as little-endian 16-bit words.
/// A trailing odd byte contributes as a low byte with a zero high byte.
pub fn compute(data: &[u8]) -> u16 {
    let mut sum = 0u16;
    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        sum = sum.wrapping_add(u16::from_le_bytes([pair[0], pair[1]]));
    }
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add(*last as u16);
    }
    CHECKSUM_BASE.wrapping_sub(sum)
}

/// Verifies `data` against the two stored checksum bytes, low byte first.
pub fn verify(data: &[u8], expected_low: u8, expected_high: u8) -> bool {
    compute(data) == u16::from_le_bytes([expected_low, expected_high])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sum_is_base() {
        assert_eq!(compute(&[]), CHECKSUM_BASE);
    }

    #[test]
    fn test_deterministic() {
        let data: Vec<u8> = (0..490).map(|i| (i % 251) as u8).collect();
        assert_eq!(compute(&data), compute(&data));
    }

    #[test]
    fn test_verify_matches_compute() {
        let data = [0x10u8, 0x20, 0x30, 0x40];
        let sum = compute(&data);
        let [low, high] = sum.to_le_bytes();
        assert!(verify(&data, low, high));
        assert!(!verify(&data, low.wrapping_add(1), high));
    }

    #[test]
    fn test_single_bit_flips_change_sum() {
        // Near-universal avalanche: every single-bit flip moves the word sum.
        let data: Vec<u8> = (0..64).map(|i| i as u8).collect();
        let base = compute(&data);
        for i in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = data.clone();
                flipped[i] ^= 1 << bit;
                assert_ne!(compute(&flipped), base, "flip byte {} bit {}", i, bit);
            }
        }
    }
}
