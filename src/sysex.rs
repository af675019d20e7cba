//! SysEx message framing for the Kawai K5.
//!
//! Bank files concatenate many messages; each runs from an `F0` start to an
//! `F7` terminator and begins with a fixed eight-byte header. Only "one
//! block data dump" messages carrying a SINGLE patch concern the codec;
//! everything else is handed back to the caller untouched.

use serde::Serialize;

use crate::error::{Error, Result};

/// Start-of-exclusive marker.
pub const SYSEX_START: u8 = 0xF0;

/// End-of-exclusive terminator.
pub const SYSEX_END: u8 = 0xF7;

/// Kawai's manufacturer id.
pub const KAWAI_ID: u8 = 0x40;

/// Machine id for the K5/K5m.
pub const MACHINE_K5: u8 = 0x02;

/// Function code for a one-block data dump.
pub const FN_ONE_BLOCK_DUMP: u8 = 0x20;

/// Function code for an all-block data dump.
pub const FN_ALL_BLOCK_DUMP: u8 = 0x21;

/// Sub-status 1 for a SINGLE (as opposed to MULTI) dump.
pub const SUBSTATUS_SINGLE: u8 = 0x00;

/// Header length including the start-of-exclusive marker.
pub const HEADER_LENGTH: usize = 8;

/// Patches per bank for program numbering.
pub const PATCHES_PER_BANK: u8 = 12;

/// The fixed K5 SysEx header, bytes 1..=7 of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SysexHeader {
    /// Manufacturer id, `0x40` for Kawai.
    pub manufacturer_id: u8,
    /// MIDI channel, 0-based.
    pub channel: u8,
    /// Function code.
    pub function: u8,
    /// Group number.
    pub group: u8,
    /// Machine id, `0x02` for the K5/K5m.
    pub machine_id: u8,
    /// Sub-status 1: single vs. multi.
    pub substatus1: u8,
    /// Sub-status 2: program number.
    pub substatus2: u8,
}

impl SysexHeader {
    /// Parses the header from a complete message (`F0` at offset 0).
    pub fn parse(message: &[u8]) -> Result<Self> {
        if message.len() < HEADER_LENGTH {
            return Err(Error::Truncated {
                field: "sysex header",
                offset: message.len(),
                len: HEADER_LENGTH,
            });
        }
        Ok(SysexHeader {
            manufacturer_id: message[1],
            channel: message[2],
            function: message[3],
            group: message[4],
            machine_id: message[5],
            substatus1: message[6],
            substatus2: message[7],
        })
    }

    /// True for a Kawai K5 message.
    pub fn is_k5(&self) -> bool {
        self.manufacturer_id == KAWAI_ID && self.machine_id == MACHINE_K5
    }

    /// True when the message body is a single-patch block dump the codec
    /// can decode.
    pub fn is_single_dump(&self) -> bool {
        self.function == FN_ONE_BLOCK_DUMP && self.substatus1 == SUBSTATUS_SINGLE
    }

    /// Human name for the function code, where known.
    pub fn function_name(&self) -> &'static str {
        match self.function {
            0x10 => "parameter send",
            0x20 => "one block data dump",
            0x21 => "all block data dump",
            0x30 => "program send",
            0x40 => "write complete",
            0x41 => "write error",
            0x42 => "write error (protect)",
            0x43 => "write error (no card)",
            0x61 => "machine id acknowledge",
            _ => "unknown",
        }
    }
}

/// Splits a concatenated byte stream on a terminator byte.
///
/// The terminator is discarded. Terminators at the very start or end (and
/// runs of them) produce no empty segments; a trailing un-terminated
/// remainder is returned as the final segment.
pub fn split(data: &[u8], terminator: u8) -> Vec<&[u8]> {
    data.split(|&b| b == terminator)
        .filter(|seg| !seg.is_empty())
        .collect()
}

/// Splits a file's bytes into SysEx messages on the `F7` terminator.
pub fn split_messages(data: &[u8]) -> Vec<&[u8]> {
    split(data, SYSEX_END)
}

/// Extracts the nybble-expanded payload of a message: everything between
/// the eight header bytes and the end of the message. (The terminator was
/// already removed by [`split_messages`].)
pub fn payload(message: &[u8]) -> Result<&[u8]> {
    if message.len() < HEADER_LENGTH {
        return Err(Error::Truncated {
            field: "sysex payload",
            offset: message.len(),
            len: HEADER_LENGTH,
        });
    }
    Ok(&message[HEADER_LENGTH..])
}

/// Formats a sub-status-2 program number as a bank letter and 1-based slot,
/// `A-1`..`D-12`. Values of 48 and up are external/cartridge banks with the
/// same lettering and an `ext ` prefix.
pub fn program_name(program: u8) -> String {
    let banks = 4 * PATCHES_PER_BANK;
    let (prefix, index) = if program >= banks {
        ("ext ", (program - banks) % banks)
    } else {
        ("", program)
    };
    let bank = char::from(b'A' + index / PATCHES_PER_BANK);
    let slot = index % PATCHES_PER_BANK + 1;
    format!("{}{}-{}", prefix, bank, slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_two_messages() {
        let mut data = vec![SYSEX_START, 1, 2, 3, SYSEX_END];
        data.extend_from_slice(&[SYSEX_START, 4, 5, SYSEX_END]);
        let messages = split_messages(&data);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], &[SYSEX_START, 1, 2, 3]);
        assert_eq!(messages[1], &[SYSEX_START, 4, 5]);
        assert!(messages.iter().all(|m| !m.contains(&SYSEX_END)));
    }

    #[test]
    fn test_split_tolerates_edge_terminators() {
        assert_eq!(split(&[0xF7, 1, 2, 0xF7], 0xF7), vec![&[1u8, 2][..]]);
        // un-terminated remainder comes back as the final segment
        assert_eq!(
            split(&[1, 0xF7, 2, 3], 0xF7),
            vec![&[1u8][..], &[2u8, 3][..]]
        );
        assert!(split(&[], 0xF7).is_empty());
        assert!(split(&[0xF7, 0xF7], 0xF7).is_empty());
    }

    #[test]
    fn test_header_parse() {
        let msg = [SYSEX_START, KAWAI_ID, 0x00, 0x20, 0x00, MACHINE_K5, 0x00, 0x05];
        let header = SysexHeader::parse(&msg).unwrap();
        assert!(header.is_k5());
        assert!(header.is_single_dump());
        assert_eq!(header.substatus2, 5);
        assert_eq!(header.function_name(), "one block data dump");
    }

    #[test]
    fn test_header_too_short() {
        let err = SysexHeader::parse(&[SYSEX_START, KAWAI_ID]).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }

    #[test]
    fn test_non_single_dump_classified() {
        let msg = [
            SYSEX_START,
            KAWAI_ID,
            0x00,
            FN_ALL_BLOCK_DUMP,
            0x00,
            MACHINE_K5,
            0x00,
            0x00,
        ];
        let header = SysexHeader::parse(&msg).unwrap();
        assert!(!header.is_single_dump());
        let msg = [
            SYSEX_START,
            KAWAI_ID,
            0x00,
            FN_ONE_BLOCK_DUMP,
            0x00,
            MACHINE_K5,
            0x01,
            0x00,
        ];
        assert!(!SysexHeader::parse(&msg).unwrap().is_single_dump());
    }

    #[test]
    fn test_program_names() {
        assert_eq!(program_name(0), "A-1");
        assert_eq!(program_name(5), "A-6");
        assert_eq!(program_name(12), "B-1");
        assert_eq!(program_name(47), "D-12");
        assert_eq!(program_name(48), "ext A-1");
        assert_eq!(program_name(95), "ext D-12");
    }
}
