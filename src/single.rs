//! The K5 single patch and its 492-byte body codec.
//!
//! A single's collapsed SysEx body packs the name, global settings, two
//! byte-interleaved sources, a shared LFO, interleaved key scaling, the
//! formant filter, one reserved byte, and a trailing two-byte checksum.
//! `encode(decode(body)) == body` holds byte-for-byte for any canonical
//! body (reserved bits zero, checksum valid).

use std::fmt;

use serde::Serialize;

use crate::bits::{bit, from_signed, with_bit};
use crate::checksum;
use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::source::{ModulationAssign, Source, SourceSettings, SOURCE_DATA_SIZE};

/// Collapsed (non-nybble) single body length, checksum included.
pub const SINGLE_DATA_SIZE: usize = 492;

/// Length of the patch name in ASCII characters.
pub const NAME_LENGTH: usize = 8;

/// Offset of the interleaved source span.
const SOURCE_SPAN_START: usize = 20;

/// One past the end of the interleaved source span.
const SOURCE_SPAN_END: usize = SOURCE_SPAN_START + 2 * SOURCE_DATA_SIZE;

/// The eight raw name bytes as stored on the wire.
///
/// Kept verbatim rather than as a `String`: a checksum-valid body whose name
/// field is not printable ASCII must still re-encode byte-for-byte. Display
/// renders a lossy, trailing-space-trimmed form.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PatchName([u8; NAME_LENGTH]);

impl PatchName {
    /// Builds a name from a string: the first eight bytes, space-padded,
    /// with anything outside printable ASCII replaced by a space.
    pub fn new(name: &str) -> Self {
        let mut raw = [b' '; NAME_LENGTH];
        for (slot, b) in raw.iter_mut().zip(name.bytes()) {
            *slot = if b.is_ascii_graphic() || b == b' ' { b } else { b' ' };
        }
        PatchName(raw)
    }

    /// Callers must pass exactly eight bytes.
    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        let mut raw = [b' '; NAME_LENGTH];
        raw.copy_from_slice(bytes);
        PatchName(raw)
    }

    /// The raw wire bytes, space padding included.
    pub fn as_bytes(&self) -> &[u8; NAME_LENGTH] {
        &self.0
    }
}

impl Default for PatchName {
    fn default() -> Self {
        PatchName([b' '; NAME_LENGTH])
    }
}

impl fmt::Display for PatchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = String::from_utf8_lossy(&self.0);
        f.pad(s.trim_end())
    }
}

impl fmt::Debug for PatchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string())
    }
}

impl PartialEq<&str> for PatchName {
    fn eq(&self, other: &&str) -> bool {
        self.to_string() == *other
    }
}

impl Serialize for PatchName {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// How the two sources are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SourceMode {
    /// Two independent 63-harmonic sources.
    #[default]
    Twin,
    /// The sources fuse into one 126-harmonic source.
    Full,
}

/// Which source the panel picture shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PicMode {
    /// Source 1 only.
    #[default]
    Source1,
    /// Source 2 only.
    Source2,
    /// Both sources.
    Both,
}

impl PicMode {
    /// Unrecognized codes fall back to `Both`, as the original does.
    pub fn from_byte(b: u8) -> Self {
        match b & 0x03 {
            0 => PicMode::Source1,
            1 => PicMode::Source2,
            _ => PicMode::Both,
        }
    }

    /// Wire code for this mode.
    pub fn to_byte(self) -> u8 {
        match self {
            PicMode::Source1 => 0,
            PicMode::Source2 => 1,
            PicMode::Both => 2,
        }
    }
}

/// The shared LFO block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lfo {
    /// Waveform shape.
    pub shape: LfoShape,
    /// Speed, 0..=99.
    pub speed: u8,
    /// Onset delay, 0..=31.
    pub delay: u8,
    /// Trend, 0..=31.
    pub trend: u8,
}

impl Default for Lfo {
    fn default() -> Self {
        Lfo {
            shape: LfoShape::Triangle,
            speed: 0,
            delay: 0,
            trend: 0,
        }
    }
}

/// The six LFO waveforms. Wire codes start at 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum LfoShape {
    /// Triangle.
    #[default]
    Triangle,
    /// Inverted triangle.
    InverseTriangle,
    /// Square.
    Square,
    /// Inverted square.
    InverseSquare,
    /// Sawtooth.
    Sawtooth,
    /// Inverted sawtooth.
    InvertedSawtooth,
}

impl LfoShape {
    /// Unrecognized codes fall back to `Triangle`, as the original does.
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => LfoShape::Triangle,
            2 => LfoShape::InverseTriangle,
            3 => LfoShape::Square,
            4 => LfoShape::InverseSquare,
            5 => LfoShape::Sawtooth,
            6 => LfoShape::InvertedSawtooth,
            _ => LfoShape::Triangle,
        }
    }

    /// Wire code for this shape.
    pub fn to_byte(self) -> u8 {
        match self {
            LfoShape::Triangle => 1,
            LfoShape::InverseTriangle => 2,
            LfoShape::Square => 3,
            LfoShape::InverseSquare => 4,
            LfoShape::Sawtooth => 5,
            LfoShape::InvertedSawtooth => 6,
        }
    }
}

/// The formant (DFT) filter: an on/off flag and eleven octave-band levels.
/// The flag is packed into bit 7 of the first band's byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Formant {
    /// Filter enabled.
    pub is_active: bool,
    /// Band levels for C-1..C9, 0..=99.
    pub levels: [u8; 11],
}

impl Default for Formant {
    fn default() -> Self {
        Formant {
            is_active: false,
            levels: [63; 11],
        }
    }
}

/// A complete K5 single patch.
#[derive(Debug, Clone, Serialize)]
pub struct Single {
    /// Patch name, eight wire bytes (printable ASCII on a healthy patch).
    pub name: PatchName,
    /// Volume, 0..=63.
    pub volume: u8,
    /// Source balance, signed (0..=±31).
    pub balance: i8,
    /// Source 1 settings.
    pub source1_settings: SourceSettings,
    /// Source 2 settings.
    pub source2_settings: SourceSettings,
    /// Portamento enabled.
    pub portamento: bool,
    /// Portamento speed, 0..=63.
    pub portamento_speed: u8,
    /// Source combination mode.
    pub mode: SourceMode,
    /// Panel picture mode.
    pub pic_mode: PicMode,
    /// Source 1.
    pub source1: Source,
    /// Source 2.
    pub source2: Source,
    /// The shared LFO.
    pub lfo: Lfo,
    /// The formant filter.
    pub formant: Formant,
    /// Checksum read from the wire (not recomputed; see [`Single::verify`]).
    pub checksum: u16,
}

impl Default for Single {
    /// The factory init patch.
    fn default() -> Self {
        Single {
            name: PatchName::new("INIT"),
            volume: 63,
            balance: 0,
            source1_settings: SourceSettings::default(),
            source2_settings: SourceSettings::default(),
            portamento: false,
            portamento_speed: 63,
            mode: SourceMode::Twin,
            pic_mode: PicMode::Source1,
            source1: Source::default(),
            source2: Source::default(),
            lfo: Lfo::default(),
            formant: Formant::default(),
            checksum: 0,
        }
    }
}

/// Splits a byte-interleaved span into its two constituent streams.
/// Even offsets belong to the first stream.
pub fn deinterleave2(data: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut a = Vec::with_capacity(data.len() / 2 + 1);
    let mut b = Vec::with_capacity(data.len() / 2);
    for (i, &byte) in data.iter().enumerate() {
        if i % 2 == 0 {
            a.push(byte);
        } else {
            b.push(byte);
        }
    }
    (a, b)
}

/// Interleaves two equal-length streams byte by byte, first stream first.
pub fn interleave2(a: &[u8], b: &[u8]) -> Vec<u8> {
    debug_assert_eq!(a.len(), b.len());
    let mut out = Vec::with_capacity(a.len() + b.len());
    for (&x, &y) in a.iter().zip(b) {
        out.push(x);
        out.push(y);
    }
    out
}

impl Single {
    /// Decodes a collapsed 492-byte single body.
    ///
    /// A checksum mismatch is not fatal here; the structure is returned so
    /// malformed patches stay inspectable. Call [`Single::verify`] where the
    /// checksum must be authoritative.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < SINGLE_DATA_SIZE {
            return Err(Error::Truncated {
                field: "single body",
                offset: data.len(),
                len: SINGLE_DATA_SIZE,
            });
        }
        let data = &data[..SINGLE_DATA_SIZE];
        let mut r = Reader::new(data);
        let mut s = Single::default();

        s.name = PatchName::from_slice(r.bytes(NAME_LENGTH, "name")?);
        s.volume = r.u8("volume")?;
        s.balance = r.i8("balance")?;

        // Source settings arrive interleaved one byte per source; the pedal
        // and wheel assigns for one source share a byte as nybbles.
        let sd = r.bytes(8, "source settings")?;
        s.source1_settings = SourceSettings {
            delay: sd[0],
            pedal_depth: sd[2] as i8,
            wheel_depth: sd[4] as i8,
            pedal_assign: ModulationAssign::from_byte(sd[6] >> 4),
            wheel_assign: ModulationAssign::from_byte(sd[6] & 0x0F),
        };
        s.source2_settings = SourceSettings {
            delay: sd[1],
            pedal_depth: sd[3] as i8,
            wheel_depth: sd[5] as i8,
            pedal_assign: ModulationAssign::from_byte(sd[7] >> 4),
            wheel_assign: ModulationAssign::from_byte(sd[7] & 0x0F),
        };

        let b = r.u8("portamento")?;
        s.portamento = bit(b, 7);
        s.portamento_speed = b & 0x3F;

        let b = r.u8("mode")?;
        s.mode = if bit(b, 2) {
            SourceMode::Full
        } else {
            SourceMode::Twin
        };
        s.pic_mode = PicMode::from_byte(b);

        let span = r.bytes(2 * SOURCE_DATA_SIZE, "source span")?;
        let (s1d, s2d) = deinterleave2(span);
        s.source1 = Source::from_data(&s1d)?;
        s.source2 = Source::from_data(&s2d)?;
        debug_assert_eq!(r.offset(), SOURCE_SPAN_END);

        s.lfo = Lfo {
            shape: LfoShape::from_byte(r.u8("lfo shape")?),
            speed: r.u8("lfo speed")?,
            delay: r.u8("lfo delay")?,
            trend: r.u8("lfo trend")?,
        };

        // Key scaling is interleaved the same way as the source span.
        let ks = r.bytes(6, "key scaling")?;
        s.source1.key_scaling = crate::source::KeyScaling::from_data(&[ks[0], ks[2], ks[4]]);
        s.source2.key_scaling = crate::source::KeyScaling::from_data(&[ks[1], ks[3], ks[5]]);

        for i in 0..11 {
            let b = r.u8("formant level")?;
            if i == 0 {
                s.formant.is_active = bit(b, 7);
            }
            s.formant.levels[i] = b & 0x7F;
        }

        let _ = r.u8("reserved")?;
        let low = r.u8("checksum low")?;
        let high = r.u8("checksum high")?;
        s.checksum = u16::from_le_bytes([low, high]);

        let computed = checksum::compute(&data[..SINGLE_DATA_SIZE - 2]);
        if computed != s.checksum {
            log::warn!(
                "checksum mismatch for '{}': stored {:#06X}, computed {:#06X}",
                s.name,
                s.checksum,
                computed
            );
        }

        Ok(s)
    }

    /// Checks the embedded checksum of a collapsed body without decoding it.
    pub fn verify(data: &[u8]) -> Result<()> {
        if data.len() < SINGLE_DATA_SIZE {
            return Err(Error::Truncated {
                field: "single body",
                offset: data.len(),
                len: SINGLE_DATA_SIZE,
            });
        }
        let body = &data[..SINGLE_DATA_SIZE - 2];
        let stored = u16::from_le_bytes([data[SINGLE_DATA_SIZE - 2], data[SINGLE_DATA_SIZE - 1]]);
        let computed = checksum::compute(body);
        if computed != stored {
            return Err(Error::ChecksumMismatch {
                stored,
                computed,
            });
        }
        Ok(())
    }

    /// Encodes this patch to its 492-byte collapsed body, recomputing the
    /// trailing checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut d = Vec::with_capacity(SINGLE_DATA_SIZE);

        d.extend_from_slice(self.name.as_bytes());
        d.push(self.volume);
        d.push(from_signed(self.balance));

        let s1s = &self.source1_settings;
        let s2s = &self.source2_settings;
        d.push(s1s.delay);
        d.push(s2s.delay);
        d.push(from_signed(s1s.pedal_depth));
        d.push(from_signed(s2s.pedal_depth));
        d.push(from_signed(s1s.wheel_depth));
        d.push(from_signed(s2s.wheel_depth));
        d.push((s1s.pedal_assign.to_byte() << 4) | s1s.wheel_assign.to_byte());
        d.push((s2s.pedal_assign.to_byte() << 4) | s2s.wheel_assign.to_byte());

        d.push(with_bit(self.portamento_speed & 0x3F, 7, self.portamento));
        let mode_bit = matches!(self.mode, SourceMode::Full);
        d.push(with_bit(self.pic_mode.to_byte(), 2, mode_bit));

        d.extend_from_slice(&interleave2(
            &self.source1.to_data(),
            &self.source2.to_data(),
        ));

        d.push(self.lfo.shape.to_byte());
        d.push(self.lfo.speed);
        d.push(self.lfo.delay);
        d.push(self.lfo.trend);

        let ks1 = self.source1.key_scaling.to_data();
        let ks2 = self.source2.key_scaling.to_data();
        d.extend_from_slice(&interleave2(&ks1, &ks2));

        for (i, &level) in self.formant.levels.iter().enumerate() {
            let mut b = level & 0x7F;
            if i == 0 {
                b = with_bit(b, 7, self.formant.is_active);
            }
            d.push(b);
        }

        d.push(0); // reserved

        let sum = checksum::compute(&d);
        d.extend_from_slice(&sum.to_le_bytes());

        debug_assert_eq!(d.len(), SINGLE_DATA_SIZE);
        d
    }
}

impl fmt::Display for Single {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<8}  vol {:2}  bal {:+3}  mode {:?}  portamento {}",
            self.name,
            self.volume,
            self.balance,
            self.mode,
            if self.portamento {
                format!("on (spd {})", self.portamento_speed)
            } else {
                "off".to_string()
            },
        )?;
        writeln!(
            f,
            "LFO {:?} speed {} delay {} trend {}",
            self.lfo.shape, self.lfo.speed, self.lfo.delay, self.lfo.trend
        )?;
        writeln!(
            f,
            "formant {}  levels {:?}",
            if self.formant.is_active { "on" } else { "off" },
            self.formant.levels
        )?;
        writeln!(f, "s1: {}", self.source1)?;
        write!(f, "s2: {}", self.source2)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sounding = self.harmonics.iter().filter(|h| h.level > 0).count();
        write!(
            f,
            "coarse {:+3} fine {:+3} {:?}  {} harmonics sounding  \
             filter {} cutoff {:2} slope {:2}  amp {}",
            self.coarse,
            self.fine,
            self.key_tracking,
            sounding,
            if self.filter.is_active { "on" } else { "off" },
            self.filter.cutoff,
            self.filter.slope,
            if self.amplifier.is_active { "on" } else { "off" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleave_inverts_deinterleave() {
        let data: Vec<u8> = (0..=99).collect();
        let (a, b) = deinterleave2(&data);
        assert_eq!(a.len(), 50);
        assert_eq!(b.len(), 50);
        assert_eq!(a[0], 0);
        assert_eq!(b[0], 1);
        assert_eq!(interleave2(&a, &b), data);
    }

    #[test]
    fn test_factory_default_roundtrip() {
        let single = Single::default();
        let body = single.encode();
        assert_eq!(body.len(), SINGLE_DATA_SIZE);
        Single::verify(&body).unwrap();

        let decoded = Single::decode(&body).unwrap();
        assert_eq!(decoded.name, "INIT");
        assert_eq!(decoded.volume, 63);
        assert_eq!(decoded.balance, 0);
        assert_eq!(decoded.portamento_speed, 63);
        assert_eq!(decoded.encode(), body);
    }

    #[test]
    fn test_edited_patch_roundtrip() {
        let mut single = Single::default();
        single.name = PatchName::new("OBOE 2");
        single.volume = 50;
        single.balance = -15;
        single.portamento = true;
        single.portamento_speed = 12;
        single.mode = SourceMode::Full;
        single.pic_mode = PicMode::Both;
        single.source1_settings.delay = 9;
        single.source1_settings.pedal_assign = ModulationAssign::Cutoff;
        single.source2_settings.wheel_assign = ModulationAssign::Dhg;
        single.source1.coarse = 12;
        single.source2.fine = -7;
        single.source1.key_scaling.breakpoint = 72;
        single.source2.key_scaling.right = -20;
        single.lfo.shape = LfoShape::Sawtooth;
        single.lfo.speed = 80;
        single.formant.is_active = true;
        single.formant.levels[10] = 99;

        let body = single.encode();
        let decoded = Single::decode(&body).unwrap();
        assert_eq!(decoded.name, "OBOE 2");
        assert_eq!(decoded.balance, -15);
        assert!(decoded.portamento);
        assert_eq!(decoded.mode, SourceMode::Full);
        assert_eq!(decoded.pic_mode, PicMode::Both);
        assert_eq!(decoded.source1_settings.pedal_assign, ModulationAssign::Cutoff);
        assert_eq!(decoded.source2.key_scaling.right, -20);
        assert_eq!(decoded.lfo.shape, LfoShape::Sawtooth);
        assert!(decoded.formant.is_active);
        assert_eq!(decoded.formant.levels[10], 99);
        assert_eq!(decoded.encode(), body);
    }

    #[test]
    fn test_non_ascii_name_roundtrips() {
        // checksum-valid body whose name bytes are not ASCII at all
        let mut body = Single::default().encode();
        body[..NAME_LENGTH].fill(0xFF);
        let sum = checksum::compute(&body[..SINGLE_DATA_SIZE - 2]);
        body[SINGLE_DATA_SIZE - 2..].copy_from_slice(&sum.to_le_bytes());
        Single::verify(&body).unwrap();

        let decoded = Single::decode(&body).unwrap();
        assert_eq!(decoded.name.as_bytes(), &[0xFF; NAME_LENGTH]);
        assert_eq!(decoded.encode(), body);
    }

    #[test]
    fn test_name_construction_sanitizes() {
        // non-ASCII input bytes become spaces, length is always eight
        assert_eq!(PatchName::new("PÅD").as_bytes(), b"P  D    ");
        assert_eq!(PatchName::new("LONG NAME HERE").as_bytes(), b"LONG NAM");
        let short = PatchName::new("OK");
        assert_eq!(short.as_bytes(), b"OK      ");
        assert_eq!(short, "OK");
    }

    #[test]
    fn test_short_body_is_truncated() {
        let err = Single::decode(&[0u8; 100]).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }

    #[test]
    fn test_corrupt_checksum_detected_but_decodable() {
        let mut body = Single::default().encode();
        body[8] = 0; // volume byte, invalidates the stored checksum
        assert!(matches!(
            Single::verify(&body),
            Err(Error::ChecksumMismatch { .. })
        ));
        // decode still succeeds and reports the stored value
        let decoded = Single::decode(&body).unwrap();
        assert_eq!(decoded.volume, 0);
    }

    #[test]
    fn test_stored_checksum_field_matches_wire() {
        let body = Single::default().encode();
        let decoded = Single::decode(&body).unwrap();
        let wire = u16::from_le_bytes([body[490], body[491]]);
        assert_eq!(decoded.checksum, wire);
    }
}
