//! Two-nybble wire transcoding.
//!
//! K5 SysEx payloads cannot carry the top bit of a byte, so the device sends
//! each data byte as two bytes holding one nybble apiece, high nybble first.
//! A 492-byte patch body therefore travels as 984 wire bytes.

use crate::bits::byte_from_nybbles;
use crate::error::{Error, Result};

/// Expands raw bytes into the one-nybble-per-byte wire representation.
/// Output is always twice the input length.
pub fn expand(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for &b in data {
        out.push(b >> 4);
        out.push(b & 0x0F);
    }
    out
}

/// Collapses nybble-expanded wire data back into raw bytes.
///
/// Fails on odd-length input; pairs cannot be recombined otherwise.
pub fn collapse(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % 2 != 0 {
        return Err(Error::OddLength(data.len()));
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| byte_from_nybbles(pair[0], pair[1]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_known_name() {
        // "ANNEX  ?" from a factory bank, as nybbles
        let wire = [
            0x04, 0x01, 0x04, 0x0E, 0x04, 0x0E, 0x04, 0x05, 0x05, 0x08, 0x02, 0x00, 0x02, 0x00,
            0x03, 0x0F,
        ];
        assert_eq!(collapse(&wire).unwrap(), b"ANNEX  ?");
    }

    #[test]
    fn test_expand_doubles_length() {
        let data: Vec<u8> = (0..=255).collect();
        let wire = expand(&data);
        assert_eq!(wire.len(), data.len() * 2);
        assert!(wire.iter().all(|&b| b <= 0x0F));
    }

    #[test]
    fn test_collapse_inverts_expand() {
        let data: Vec<u8> = (0..=255).rev().collect();
        assert_eq!(collapse(&expand(&data)).unwrap(), data);
        assert_eq!(collapse(&[]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_collapse_odd_length_fails() {
        assert!(matches!(collapse(&[0x04, 0x01, 0x04]), Err(Error::OddLength(3))));
    }
}
