//! Codec for the Kawai K5 digital synthesizer's SysEx patch format.
//!
//! The wire side is a nybble-expanded 492-byte single-patch body inside a
//! framed SysEx message; the structured side is a fully typed [`Single`]
//! with two [`source::Source`] records, a shared LFO, and a formant filter.
//! Decoding then re-encoding a valid body reproduces it byte-for-byte.
//! A separate Leiter engine ([`leiter`]) regenerates 63-entry harmonic
//! tables from closed-form waveform models.

#![warn(missing_docs)]

pub mod bits;
pub mod checksum;
pub mod error;
pub mod leiter;
pub mod nybble;
mod reader;
pub mod single;
pub mod source;
pub mod sysex;

pub use error::Error;
pub use single::{Single, SINGLE_DATA_SIZE};
pub use source::Source;
pub use sysex::SysexHeader;

/// Decodes every single-patch dump in a raw `.syx` byte stream.
///
/// Each message decodes independently: non-dump messages and malformed dumps
/// are logged and skipped without affecting the rest of the stream. Each
/// returned entry pairs the message header with its decoded patch.
pub fn decode_bank(data: &[u8]) -> Vec<(SysexHeader, Single)> {
    let mut patches = Vec::new();
    for message in sysex::split_messages(data) {
        let header = match SysexHeader::parse(message) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("skipping unparseable message: {}", e);
                continue;
            }
        };
        if !header.is_k5() {
            log::debug!(
                "skipping non-K5 message (manufacturer {:#04X}, machine {:#04X})",
                header.manufacturer_id,
                header.machine_id
            );
            continue;
        }
        if !header.is_single_dump() {
            log::debug!(
                "skipping {} message for {}",
                header.function_name(),
                sysex::program_name(header.substatus2)
            );
            continue;
        }
        let label = sysex::program_name(header.substatus2);
        let body = match sysex::payload(message).and_then(nybble::collapse) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("skipping {}: {}", label, e);
                continue;
            }
        };
        match Single::decode(&body) {
            Ok(single) => patches.push((header, single)),
            Err(e) => log::warn!("skipping {}: {}", label, e),
        }
    }
    patches
}

/// Encodes a patch as a complete framed SysEx message for the given channel
/// and program number: header, nybble-expanded body, terminator.
pub fn encode_message(single: &Single, channel: u8, program: u8) -> Vec<u8> {
    let body = nybble::expand(&single.encode());
    let mut out = Vec::with_capacity(sysex::HEADER_LENGTH + body.len() + 1);
    out.extend_from_slice(&[
        sysex::SYSEX_START,
        sysex::KAWAI_ID,
        channel & 0x0F,
        sysex::FN_ONE_BLOCK_DUMP,
        0x00,
        sysex::MACHINE_K5,
        sysex::SUBSTATUS_SINGLE,
        program,
    ]);
    out.extend_from_slice(&body);
    out.push(sysex::SYSEX_END);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_roundtrip_through_framing() {
        let single = Single::default();
        let message = encode_message(&single, 0, 5);
        assert_eq!(message[0], sysex::SYSEX_START);
        assert_eq!(*message.last().unwrap(), sysex::SYSEX_END);
        assert_eq!(message.len(), 8 + SINGLE_DATA_SIZE * 2 + 1);

        let patches = decode_bank(&message);
        assert_eq!(patches.len(), 1);
        let (header, decoded) = &patches[0];
        assert_eq!(sysex::program_name(header.substatus2), "A-6");
        assert_eq!(decoded.name, "INIT");
        assert_eq!(encode_message(decoded, 0, 5), message);
    }

    #[test]
    fn test_non_dump_messages_passed_over() {
        // a program-send message followed by a real dump
        let mut data = vec![
            sysex::SYSEX_START,
            sysex::KAWAI_ID,
            0x00,
            0x30,
            0x00,
            sysex::MACHINE_K5,
            0x00,
            0x00,
            sysex::SYSEX_END,
        ];
        data.extend_from_slice(&encode_message(&Single::default(), 0, 0));
        let patches = decode_bank(&data);
        assert_eq!(patches.len(), 1);
    }

    #[test]
    fn test_malformed_dump_does_not_poison_the_stream() {
        let mut data = encode_message(&Single::default(), 0, 0);
        // a dump cut off mid-body, terminator intact
        let mut cut = encode_message(&Single::default(), 0, 1);
        cut.truncate(sysex::HEADER_LENGTH + 84);
        cut.push(sysex::SYSEX_END);
        data.extend_from_slice(&cut);
        data.extend_from_slice(&encode_message(&Single::default(), 0, 2));

        let patches = decode_bank(&data);
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].0.substatus2, 0);
        assert_eq!(patches[1].0.substatus2, 2);
    }
}
