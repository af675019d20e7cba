//! Error taxonomy for the codec.
//!
//! Only structurally fatal conditions are errors. Unrecognized enumerator
//! bytes (an LFO shape of 9, say) are never errors; each enum substitutes
//! its documented default so that malformed patches remain inspectable.

use thiserror::Error;

/// Errors surfaced by the K5 codec and the harmonic generator.
#[derive(Debug, Error)]
pub enum Error {
    /// The input buffer ended before a required field.
    #[error("input truncated at byte {offset} reading {field} ({len} bytes available)")]
    Truncated {
        /// Name of the field being read when the buffer ran out.
        field: &'static str,
        /// Byte offset the read started at.
        offset: usize,
        /// Total length of the buffer.
        len: usize,
    },

    /// The stored checksum does not match the one computed over the body.
    ///
    /// Recoverable: decoding still yields a structure. Round-trip tooling
    /// must treat this as authoritative.
    #[error("checksum mismatch: stored {stored:#06X}, computed {computed:#06X}")]
    ChecksumMismatch {
        /// Checksum read from the trailing two bytes.
        stored: u16,
        /// Checksum computed over the preceding body bytes.
        computed: u16,
    },

    /// Two-nybble data must pair up; an odd length cannot be collapsed.
    #[error("two-nybble data has odd length {0}")]
    OddLength(usize),

    /// No Leiter parameters exist for the requested waveform name.
    #[error("unknown waveform {0:?}")]
    UnknownWaveform(String),
}

/// Codec result alias.
pub type Result<T> = std::result::Result<T, Error>;
