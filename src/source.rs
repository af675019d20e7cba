//! One sound source of a K5 single patch.
//!
//! A single carries two structurally identical sources. On the wire their
//! bytes are interleaved across the whole source span; this module decodes
//! and encodes the 224-byte de-interleaved stream of one source: the DFG
//! pitch block and envelope, the DHG harmonics with their settings and four
//! envelopes, the DDF filter and its envelope, the DDA amplifier with its
//! seven-segment envelope, and the key-scaling curve.

use serde::Serialize;

use crate::bits::{bit, from_signed, with_bit};
use crate::error::Result;
use crate::reader::Reader;

/// Harmonics per source.
pub const HARMONIC_COUNT: usize = 63;

/// De-interleaved source stream length in bytes.
pub const SOURCE_DATA_SIZE: usize = 224;

/// Segments in the pitch, harmonic, and filter envelopes.
pub const SEGMENT_COUNT: usize = 6;

/// Segments in the amplifier envelope (one extra).
pub const AMP_SEGMENT_COUNT: usize = 7;

/// Harmonic envelopes per source.
pub const HARMONIC_ENVELOPE_COUNT: usize = 4;

/// Whether a source's pitch follows the keyboard or is fixed to one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyTracking {
    /// Pitch follows the played key.
    Track,
    /// Pitch is fixed to the given key number (0..=127).
    Fixed {
        /// The fixed key.
        key: u8,
    },
}

impl Default for KeyTracking {
    fn default() -> Self {
        KeyTracking::Track
    }
}

impl KeyTracking {
    fn from_byte(b: u8) -> Self {
        if bit(b, 7) {
            KeyTracking::Fixed { key: b & 0x7F }
        } else {
            KeyTracking::Track
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            KeyTracking::Track => 0,
            KeyTracking::Fixed { key } => with_bit(key & 0x7F, 7, true),
        }
    }
}

/// Destination of a pedal or mod-wheel assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ModulationAssign {
    /// Pitch LFO.
    DfgLfo,
    /// Harmonic levels.
    Dhg,
    /// Filter cutoff.
    Cutoff,
    /// Filter slope.
    Slope,
    /// Not assigned.
    #[default]
    Off,
}

impl ModulationAssign {
    /// Unrecognized codes fall back to `Off`, as the original does.
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => ModulationAssign::DfgLfo,
            1 => ModulationAssign::Dhg,
            2 => ModulationAssign::Cutoff,
            3 => ModulationAssign::Slope,
            _ => ModulationAssign::Off,
        }
    }

    /// Wire code for this assignment.
    pub fn to_byte(self) -> u8 {
        match self {
            ModulationAssign::DfgLfo => 0,
            ModulationAssign::Dhg => 1,
            ModulationAssign::Cutoff => 2,
            ModulationAssign::Slope => 3,
            ModulationAssign::Off => 4,
        }
    }
}

/// Per-source settings stored interleaved near the head of the single.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceSettings {
    /// Onset delay, 0..=31.
    pub delay: u8,
    /// Pedal modulation depth, signed.
    pub pedal_depth: i8,
    /// Wheel modulation depth, signed.
    pub wheel_depth: i8,
    /// Pedal destination (high nybble on the wire).
    pub pedal_assign: ModulationAssign,
    /// Wheel destination (low nybble on the wire).
    pub wheel_assign: ModulationAssign,
}

/// One segment of the pitch (DFG) envelope. Levels are signed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PitchEnvelopeSegment {
    /// Segment rate, 0..=31.
    pub rate: u8,
    /// Segment level, signed.
    pub level: i8,
}

/// The six-segment pitch envelope. Bit 7 of the first rate byte carries the
/// loop flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PitchEnvelope {
    /// Loop the envelope instead of holding the final level.
    pub looping: bool,
    /// The six segments.
    pub segments: [PitchEnvelopeSegment; SEGMENT_COUNT],
}

/// One additive-synthesis harmonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Harmonic {
    /// Amplitude, 0..=99.
    pub level: u8,
    /// True when modulation applies to this harmonic.
    pub is_modulation_active: bool,
    /// Assigned harmonic envelope, 0..=3.
    pub envelope_number: u8,
}

impl Default for Harmonic {
    fn default() -> Self {
        Harmonic {
            level: 99,
            is_modulation_active: false,
            envelope_number: 0,
        }
    }
}

impl Harmonic {
    /// The modulation/envelope nybble: bit 3 is the modulation flag, bits
    /// 0..=1 the envelope number.
    fn selector_nybble(self) -> u8 {
        with_bit(self.envelope_number & 0x03, 3, self.is_modulation_active)
    }

    fn apply_selector(&mut self, nybble: u8) {
        self.is_modulation_active = bit(nybble, 3);
        self.envelope_number = nybble & 0x03;
    }
}

/// Per-envelope gain settings in the harmonic section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarmonicEnvelopeSettings {
    /// Envelope enabled.
    pub is_active: bool,
    /// Effect amount, 0..=31.
    pub effect: u8,
}

/// Which harmonics a selection operation applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum HarmonicSelection {
    /// Only sounding harmonics.
    Live,
    /// Only silent harmonics.
    Die,
    /// Every harmonic.
    #[default]
    All,
}

impl HarmonicSelection {
    /// Unrecognized codes fall back to `All`, as the original does.
    pub fn from_byte(b: u8) -> Self {
        match b & 0x03 {
            0 => HarmonicSelection::Live,
            1 => HarmonicSelection::Die,
            _ => HarmonicSelection::All,
        }
    }

    /// Wire code for this selection.
    pub fn to_byte(self) -> u8 {
        match self {
            HarmonicSelection::Live => 0,
            HarmonicSelection::Die => 1,
            HarmonicSelection::All => 2,
        }
    }
}

/// A named group modulation toggle (odd, even, octave, fifth, all).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HarmonicModulation {
    /// Toggle state.
    pub is_on: bool,
    /// Assigned envelope, 1..=4.
    pub envelope_number: u8,
}

impl Default for HarmonicModulation {
    fn default() -> Self {
        HarmonicModulation {
            is_on: false,
            envelope_number: 1,
        }
    }
}

impl HarmonicModulation {
    fn from_high(b: u8) -> Self {
        HarmonicModulation {
            is_on: bit(b, 7),
            envelope_number: ((b & 0x30) >> 4) + 1,
        }
    }

    fn from_low(b: u8) -> Self {
        HarmonicModulation {
            is_on: bit(b, 3),
            envelope_number: (b & 0x03) + 1,
        }
    }

    fn to_high(self) -> u8 {
        let v = (self.envelope_number.saturating_sub(1) & 0x03) << 4;
        with_bit(v, 7, self.is_on)
    }

    fn to_low(self) -> u8 {
        let v = self.envelope_number.saturating_sub(1) & 0x03;
        with_bit(v, 3, self.is_on)
    }
}

/// Aggregate settings for the harmonic (DHG) section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarmonicSettings {
    /// Velocity depth, signed.
    pub velocity_depth: i8,
    /// Pressure depth, signed.
    pub pressure_depth: i8,
    /// Key-scaling depth, signed.
    pub key_scaling_depth: i8,
    /// LFO depth, 0..=31.
    pub lfo_depth: u8,
    /// Per-envelope gain settings.
    pub envelope_settings: [HarmonicEnvelopeSettings; HARMONIC_ENVELOPE_COUNT],
    /// Master modulation switch for the section.
    pub is_modulation_active: bool,
    /// Selection mode for harmonic edits.
    pub selection: HarmonicSelection,
    /// First harmonic of the edited range, 1..=63.
    pub range_from: u8,
    /// Last harmonic of the edited range, 1..=63.
    pub range_to: u8,
    /// Odd-harmonics toggle.
    pub odd: HarmonicModulation,
    /// Even-harmonics toggle.
    pub even: HarmonicModulation,
    /// Octave-harmonics toggle.
    pub octave: HarmonicModulation,
    /// Fifth-harmonics toggle.
    pub fifth: HarmonicModulation,
    /// All-harmonics toggle.
    pub all: HarmonicModulation,
    /// Angle enumerator (-, 0, +).
    pub angle: u8,
    /// Harmonic number field, 1..=63.
    pub number: u8,
    /// Shadow switch, packed into bit 7 of the first harmonic-envelope byte.
    pub is_shadow_on: bool,
}

/// One segment of a harmonic or filter envelope. Bit 6 of the level byte
/// marks the held/sustain maximum segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnvelopeSegment {
    /// Segment rate, 0..=31.
    pub rate: u8,
    /// Segment level, 0..=31.
    pub level: u8,
    /// This segment is the held maximum.
    pub is_max: bool,
}

/// A six-segment envelope used by the harmonic and filter sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Envelope {
    /// The six segments.
    pub segments: [EnvelopeSegment; SEGMENT_COUNT],
}

/// The DDF formant filter stage of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Filter {
    /// Filter enabled.
    pub is_active: bool,
    /// Filter modulation enabled.
    pub is_modulation_active: bool,
    /// Cutoff, 0..=99.
    pub cutoff: u8,
    /// Cutoff modulation, 0..=31.
    pub cutoff_modulation: u8,
    /// Slope, 0..=31.
    pub slope: u8,
    /// Slope modulation, 0..=31.
    pub slope_modulation: u8,
    /// Flat level, 0..=31.
    pub flat_level: u8,
    /// Velocity depth, signed.
    pub velocity_depth: i8,
    /// Pressure depth, signed.
    pub pressure_depth: i8,
    /// Key-scaling depth, signed.
    pub key_scaling_depth: i8,
    /// Envelope depth, signed.
    pub envelope_depth: i8,
    /// Velocity envelope depth, signed.
    pub velocity_envelope_depth: i8,
    /// LFO depth, 0..=31.
    pub lfo_depth: u8,
}

impl Default for Filter {
    fn default() -> Self {
        Filter {
            is_active: false,
            is_modulation_active: false,
            cutoff: 99,
            cutoff_modulation: 0,
            slope: 31,
            slope_modulation: 0,
            flat_level: 31,
            velocity_depth: 0,
            pressure_depth: 0,
            key_scaling_depth: 0,
            envelope_depth: 0,
            velocity_envelope_depth: 0,
            lfo_depth: 0,
        }
    }
}

/// One segment of the amplifier envelope. The rate byte carries the
/// rate-modulation flag in bit 6; the level byte carries the max flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AmplifierEnvelopeSegment {
    /// Segment rate, 0..=31.
    pub rate: u8,
    /// Rate modulation applies to this segment.
    pub is_rate_modulated: bool,
    /// Segment level, 0..=31. The seventh segment has no level on the wire.
    pub level: u8,
    /// This segment is the held maximum.
    pub is_max: bool,
}

/// The seven-segment amplifier envelope: seven rate slots, six level slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AmplifierEnvelope {
    /// The seven segments.
    pub segments: [AmplifierEnvelopeSegment; AMP_SEGMENT_COUNT],
}

/// The DDA amplifier stage of one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Amplifier {
    /// Amplifier enabled.
    pub is_active: bool,
    /// Attack velocity depth, signed.
    pub attack_velocity_depth: i8,
    /// Pressure depth, signed.
    pub pressure_depth: i8,
    /// Key-scaling depth, signed.
    pub key_scaling_depth: i8,
    /// LFO depth, 0..=31.
    pub lfo_depth: u8,
    /// Attack velocity rate, signed.
    pub attack_velocity_rate: i8,
    /// Release velocity rate, signed.
    pub release_velocity_rate: i8,
    /// Key-scaling rate, signed.
    pub key_scaling_rate: i8,
    /// The amplifier envelope.
    pub envelope: AmplifierEnvelope,
}

/// Key-scaling curve: signed depths either side of a breakpoint key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyScaling {
    /// Depth to the right of the breakpoint, signed.
    pub right: i8,
    /// Depth to the left of the breakpoint, signed.
    pub left: i8,
    /// Breakpoint key, 0..=127.
    pub breakpoint: u8,
}

impl KeyScaling {
    pub(crate) fn from_data(data: &[u8; 3]) -> Self {
        KeyScaling {
            right: data[0] as i8,
            left: data[1] as i8,
            breakpoint: data[2],
        }
    }

    pub(crate) fn to_data(self) -> [u8; 3] {
        [from_signed(self.right), from_signed(self.left), self.breakpoint]
    }
}

// serde's derived array support stops at 32 elements, so the 63-harmonic
// table goes out as a plain sequence.
fn serialize_harmonics<S>(
    harmonics: &[Harmonic; HARMONIC_COUNT],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(harmonics.iter())
}

/// One of the two sound sources of a single patch.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    /// Coarse detune, signed (0..=±48).
    pub coarse: i8,
    /// Fine detune, signed (0..=±31).
    pub fine: i8,
    /// Keyboard tracking or fixed key.
    pub key_tracking: KeyTracking,
    /// Pitch envelope depth, signed.
    pub envelope_depth: i8,
    /// Pressure depth, signed.
    pub pressure_depth: i8,
    /// Bender depth, signed.
    pub bender_depth: i8,
    /// Velocity envelope depth, signed.
    pub velocity_envelope_depth: i8,
    /// LFO depth, 0..=31.
    pub lfo_depth: u8,
    /// Pressure LFO depth, signed.
    pub pressure_lfo_depth: i8,
    /// The DFG pitch envelope.
    pub pitch_envelope: PitchEnvelope,
    /// The 63 harmonics.
    #[serde(serialize_with = "serialize_harmonics")]
    pub harmonics: [Harmonic; HARMONIC_COUNT],
    /// Raw second occurrence of harmonic 63's selector byte. The SysEx
    /// manual documents the same offset twice; both bytes are preserved so
    /// either device interpretation round-trips.
    pub harm63_shadow: u8,
    /// Aggregate harmonic settings.
    pub harmonic_settings: HarmonicSettings,
    /// The four harmonic envelopes.
    pub harmonic_envelopes: [Envelope; HARMONIC_ENVELOPE_COUNT],
    /// The DDF filter.
    pub filter: Filter,
    /// The filter envelope.
    pub filter_envelope: Envelope,
    /// The DDA amplifier and its envelope.
    pub amplifier: Amplifier,
    /// The key-scaling curve. Stored interleaved after the LFO block at the
    /// single level, not inside the source span.
    pub key_scaling: KeyScaling,
}

impl Default for Source {
    fn default() -> Self {
        Source {
            coarse: 0,
            fine: 0,
            key_tracking: KeyTracking::Track,
            envelope_depth: 0,
            pressure_depth: 0,
            bender_depth: 0,
            velocity_envelope_depth: 0,
            lfo_depth: 0,
            pressure_lfo_depth: 0,
            pitch_envelope: PitchEnvelope::default(),
            harmonics: [Harmonic::default(); HARMONIC_COUNT],
            harm63_shadow: 0,
            harmonic_settings: HarmonicSettings::default(),
            harmonic_envelopes: [Envelope::default(); HARMONIC_ENVELOPE_COUNT],
            filter: Filter::default(),
            filter_envelope: Envelope::default(),
            amplifier: Amplifier::default(),
            key_scaling: KeyScaling::default(),
        }
    }
}

impl Source {
    /// Decodes one source from its de-interleaved 224-byte stream.
    /// Key scaling is filled in separately by the single-level decoder.
    pub fn from_data(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let mut s = Source::default();

        // DFG
        s.coarse = r.i8("coarse")?;
        s.fine = r.i8("fine")?;
        s.key_tracking = KeyTracking::from_byte(r.u8("key tracking")?);
        s.envelope_depth = r.i8("envelope depth")?;
        s.pressure_depth = r.i8("pressure depth")?;
        s.bender_depth = r.i8("bender depth")?;
        s.velocity_envelope_depth = r.i8("velocity envelope depth")?;
        s.lfo_depth = r.u8("lfo depth")?;
        s.pressure_lfo_depth = r.i8("pressure lfo depth")?;

        // The loop flag rides in bit 7 of the first rate byte.
        s.pitch_envelope.looping = bit(r.peek("pitch envelope loop")?, 7);
        for i in 0..SEGMENT_COUNT {
            let b = r.u8("pitch envelope rate")?;
            s.pitch_envelope.segments[i].rate = if i == 0 { b & 0x7F } else { b };
        }
        for i in 0..SEGMENT_COUNT {
            s.pitch_envelope.segments[i].level = r.i8("pitch envelope level")?;
        }

        // DHG
        for i in 0..HARMONIC_COUNT {
            s.harmonics[i].level = r.u8("harmonic level")?;
        }
        // Harmonics 1..=62 share a byte pairwise: odd harmonic in the low
        // nybble, even harmonic in the high nybble.
        for pair in 0..31 {
            let b = r.u8("harmonic selector pair")?;
            s.harmonics[pair * 2].apply_selector(b & 0x0F);
            s.harmonics[pair * 2 + 1].apply_selector(b >> 4);
        }
        // Harmonic 63 is documented at two consecutive bytes. Take the first
        // as the value and keep the second verbatim (see `harm63_shadow`).
        let b = r.u8("harmonic 63 selector")?;
        s.harmonics[62].apply_selector(b & 0x0F);
        s.harm63_shadow = r.u8("harmonic 63 selector (duplicate)")?;
        if s.harm63_shadow != b {
            log::warn!(
                "harmonic 63 selector bytes disagree: {:02X} vs {:02X}",
                b,
                s.harm63_shadow
            );
        }

        let hs = &mut s.harmonic_settings;
        hs.velocity_depth = r.i8("harmonic velocity depth")?;
        hs.pressure_depth = r.i8("harmonic pressure depth")?;
        hs.key_scaling_depth = r.i8("harmonic key scaling depth")?;
        hs.lfo_depth = r.u8("harmonic lfo depth")?;
        for i in 0..HARMONIC_ENVELOPE_COUNT {
            let b = r.u8("harmonic envelope settings")?;
            hs.envelope_settings[i] = HarmonicEnvelopeSettings {
                is_active: bit(b, 7),
                effect: b & 0x1F,
            };
        }
        let b = r.u8("harmonic modulation/selection")?;
        hs.is_modulation_active = bit(b, 7);
        hs.selection = HarmonicSelection::from_byte(b);
        hs.range_from = r.u8("harmonic range from")?;
        hs.range_to = r.u8("harmonic range to")?;
        let b = r.u8("harmonic odd/even")?;
        hs.odd = HarmonicModulation::from_high(b);
        hs.even = HarmonicModulation::from_low(b);
        let b = r.u8("harmonic octave/fifth")?;
        hs.octave = HarmonicModulation::from_high(b);
        hs.fifth = HarmonicModulation::from_low(b);
        hs.all = HarmonicModulation::from_high(r.u8("harmonic all")?);
        hs.angle = r.u8("harmonic angle")?;
        hs.number = r.u8("harmonic number")?;
        // The shadow flag rides in bit 7 of the first envelope level byte.
        hs.is_shadow_on = bit(r.peek("harmonic shadow")?, 7);

        for env in s.harmonic_envelopes.iter_mut() {
            for seg in env.segments.iter_mut() {
                let b = r.u8("harmonic envelope level")?;
                seg.level = b & 0x3F;
                seg.is_max = bit(b, 6);
            }
            for seg in env.segments.iter_mut() {
                seg.rate = r.u8("harmonic envelope rate")?;
            }
        }

        // DDF
        let f = &mut s.filter;
        f.cutoff = r.u8("filter cutoff")?;
        f.cutoff_modulation = r.u8("filter cutoff modulation")?;
        f.slope = r.u8("filter slope")?;
        f.slope_modulation = r.u8("filter slope modulation")?;
        f.flat_level = r.u8("filter flat level")?;
        f.velocity_depth = r.i8("filter velocity depth")?;
        f.pressure_depth = r.i8("filter pressure depth")?;
        f.key_scaling_depth = r.i8("filter key scaling depth")?;
        f.envelope_depth = r.i8("filter envelope depth")?;
        f.velocity_envelope_depth = r.i8("filter velocity envelope depth")?;
        let b = r.u8("filter flags/lfo depth")?;
        f.is_active = bit(b, 7);
        f.is_modulation_active = bit(b, 6);
        f.lfo_depth = b & 0x1F;

        for seg in s.filter_envelope.segments.iter_mut() {
            seg.rate = r.u8("filter envelope rate")?;
        }
        for seg in s.filter_envelope.segments.iter_mut() {
            let b = r.u8("filter envelope level")?;
            seg.is_max = bit(b, 6);
            seg.level = b & 0x3F;
        }

        // DDA
        let a = &mut s.amplifier;
        a.attack_velocity_depth = r.i8("amp attack velocity depth")?;
        a.pressure_depth = r.i8("amp pressure depth")?;
        a.key_scaling_depth = r.i8("amp key scaling depth")?;
        let b = r.u8("amp flags/lfo depth")?;
        a.is_active = bit(b, 7);
        a.lfo_depth = b & 0x7F;
        a.attack_velocity_rate = r.i8("amp attack velocity rate")?;
        a.release_velocity_rate = r.i8("amp release velocity rate")?;
        a.key_scaling_rate = r.i8("amp key scaling rate")?;

        for seg in a.envelope.segments.iter_mut() {
            let b = r.u8("amp envelope rate")?;
            seg.is_rate_modulated = bit(b, 6);
            seg.rate = b & 0x3F;
        }
        // Seven rate slots but only six level slots on the wire; the
        // seventh level stays zero.
        for seg in a.envelope.segments[..SEGMENT_COUNT].iter_mut() {
            let b = r.u8("amp envelope level")?;
            seg.is_max = bit(b, 6);
            seg.level = b & 0x3F;
        }

        debug_assert_eq!(r.offset(), SOURCE_DATA_SIZE);
        Ok(s)
    }

    /// Encodes this source to its 224-byte de-interleaved stream.
    /// Key scaling is emitted separately by the single-level encoder.
    pub fn to_data(&self) -> Vec<u8> {
        let mut d = Vec::with_capacity(SOURCE_DATA_SIZE);

        // DFG
        d.push(from_signed(self.coarse));
        d.push(from_signed(self.fine));
        d.push(self.key_tracking.to_byte());
        d.push(from_signed(self.envelope_depth));
        d.push(from_signed(self.pressure_depth));
        d.push(from_signed(self.bender_depth));
        d.push(from_signed(self.velocity_envelope_depth));
        d.push(self.lfo_depth);
        d.push(from_signed(self.pressure_lfo_depth));

        for (i, seg) in self.pitch_envelope.segments.iter().enumerate() {
            let mut rate = seg.rate;
            if i == 0 {
                rate = with_bit(rate & 0x7F, 7, self.pitch_envelope.looping);
            }
            d.push(rate);
        }
        for seg in &self.pitch_envelope.segments {
            d.push(from_signed(seg.level));
        }

        // DHG
        for h in &self.harmonics {
            d.push(h.level);
        }
        for pair in 0..31 {
            let low = self.harmonics[pair * 2].selector_nybble();
            let high = self.harmonics[pair * 2 + 1].selector_nybble();
            d.push((high << 4) | low);
        }
        d.push(self.harmonics[62].selector_nybble());
        d.push(self.harm63_shadow);

        let hs = &self.harmonic_settings;
        d.push(from_signed(hs.velocity_depth));
        d.push(from_signed(hs.pressure_depth));
        d.push(from_signed(hs.key_scaling_depth));
        d.push(hs.lfo_depth);
        for es in &hs.envelope_settings {
            d.push(with_bit(es.effect & 0x1F, 7, es.is_active));
        }
        d.push(with_bit(hs.selection.to_byte(), 7, hs.is_modulation_active));
        d.push(hs.range_from);
        d.push(hs.range_to);
        d.push(hs.odd.to_high() | hs.even.to_low());
        d.push(hs.octave.to_high() | hs.fifth.to_low());
        d.push(hs.all.to_high());
        d.push(hs.angle);
        d.push(hs.number);

        for (ei, env) in self.harmonic_envelopes.iter().enumerate() {
            for (si, seg) in env.segments.iter().enumerate() {
                let mut level = with_bit(seg.level & 0x3F, 6, seg.is_max);
                if ei == 0 && si == 0 {
                    level = with_bit(level, 7, hs.is_shadow_on);
                }
                d.push(level);
            }
            for seg in &env.segments {
                d.push(seg.rate);
            }
        }

        // DDF
        let f = &self.filter;
        d.push(f.cutoff);
        d.push(f.cutoff_modulation);
        d.push(f.slope);
        d.push(f.slope_modulation);
        d.push(f.flat_level);
        d.push(from_signed(f.velocity_depth));
        d.push(from_signed(f.pressure_depth));
        d.push(from_signed(f.key_scaling_depth));
        d.push(from_signed(f.envelope_depth));
        d.push(from_signed(f.velocity_envelope_depth));
        let mut b = f.lfo_depth & 0x1F;
        b = with_bit(b, 7, f.is_active);
        b = with_bit(b, 6, f.is_modulation_active);
        d.push(b);

        for seg in &self.filter_envelope.segments {
            d.push(seg.rate);
        }
        for seg in &self.filter_envelope.segments {
            d.push(with_bit(seg.level & 0x3F, 6, seg.is_max));
        }

        // DDA
        let a = &self.amplifier;
        d.push(from_signed(a.attack_velocity_depth));
        d.push(from_signed(a.pressure_depth));
        d.push(from_signed(a.key_scaling_depth));
        d.push(with_bit(a.lfo_depth & 0x7F, 7, a.is_active));
        d.push(from_signed(a.attack_velocity_rate));
        d.push(from_signed(a.release_velocity_rate));
        d.push(from_signed(a.key_scaling_rate));

        for seg in &a.envelope.segments {
            d.push(with_bit(seg.rate & 0x3F, 6, seg.is_rate_modulated));
        }
        for seg in &a.envelope.segments[..SEGMENT_COUNT] {
            d.push(with_bit(seg.level & 0x3F, 6, seg.is_max));
        }

        debug_assert_eq!(d.len(), SOURCE_DATA_SIZE);
        d
    }

    /// Overwrites the 63 harmonic levels, e.g. with a generated Leiter
    /// table. Extra input levels are ignored; missing ones leave the tail
    /// unchanged.
    pub fn set_harmonic_levels(&mut self, levels: &[u8]) {
        for (h, &level) in self.harmonics.iter_mut().zip(levels) {
            h.level = level.min(99);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_roundtrip() {
        let mut s = Source::default();
        s.coarse = -12;
        s.fine = 31;
        s.key_tracking = KeyTracking::Fixed { key: 60 };
        s.pitch_envelope.looping = true;
        s.pitch_envelope.segments[0] = PitchEnvelopeSegment { rate: 31, level: -24 };
        s.harmonics[0].level = 99;
        s.harmonics[1] = Harmonic {
            level: 42,
            is_modulation_active: true,
            envelope_number: 3,
        };
        s.harmonics[62] = Harmonic {
            level: 7,
            is_modulation_active: true,
            envelope_number: 2,
        };
        s.harm63_shadow = s.harmonics[62].selector_nybble();
        s.harmonic_settings.selection = HarmonicSelection::Die;
        s.harmonic_settings.odd = HarmonicModulation { is_on: true, envelope_number: 4 };
        s.harmonic_settings.is_shadow_on = true;
        s.harmonic_envelopes[0].segments[0] = EnvelopeSegment { rate: 20, level: 31, is_max: true };
        s.filter.is_active = true;
        s.filter.lfo_depth = 17;
        s.amplifier.is_active = true;
        s.amplifier.envelope.segments[6].rate = 33;
        s.amplifier.envelope.segments[6].is_rate_modulated = true;
        s.key_scaling = KeyScaling { right: -5, left: 12, breakpoint: 64 };

        let data = s.to_data();
        assert_eq!(data.len(), SOURCE_DATA_SIZE);
        let mut decoded = Source::from_data(&data).unwrap();
        // Key scaling travels outside the source span.
        decoded.key_scaling = s.key_scaling;
        assert_eq!(decoded.to_data(), data);
        assert_eq!(decoded.coarse, -12);
        assert_eq!(decoded.key_tracking, KeyTracking::Fixed { key: 60 });
        assert!(decoded.pitch_envelope.looping);
        assert_eq!(decoded.harmonics[1].envelope_number, 3);
        assert!(decoded.harmonics[62].is_modulation_active);
        assert!(decoded.harmonic_settings.is_shadow_on);
        assert_eq!(decoded.harmonic_settings.odd.envelope_number, 4);
        assert!(decoded.amplifier.envelope.segments[6].is_rate_modulated);
        // 33 & 0x3F survives; the rate field is six bits wide
        assert_eq!(decoded.amplifier.envelope.segments[6].rate, 33);
    }

    #[test]
    fn test_truncated_source_fails() {
        let err = Source::from_data(&[0u8; 100]).unwrap_err();
        match err {
            crate::error::Error::Truncated { offset, .. } => assert_eq!(offset, 100),
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn test_harm63_disagreement_is_preserved() {
        let mut s = Source::default();
        s.harmonics[62] = Harmonic {
            level: 0,
            is_modulation_active: false,
            envelope_number: 1,
        };
        s.harm63_shadow = 0x0A; // deliberately different reading
        let data = s.to_data();
        let decoded = Source::from_data(&data).unwrap();
        assert_eq!(decoded.harmonics[62].envelope_number, 1);
        assert_eq!(decoded.harm63_shadow, 0x0A);
        assert_eq!(decoded.to_data(), data);
    }

    #[test]
    fn test_serializes_full_harmonic_table() {
        let s = Source::default();
        let v = serde_json::to_value(&s).unwrap();
        let table = v["harmonics"].as_array().unwrap();
        assert_eq!(table.len(), HARMONIC_COUNT);
        assert_eq!(table[0]["level"], 99);
    }

    #[test]
    fn test_set_harmonic_levels_clamps() {
        let mut s = Source::default();
        s.set_harmonic_levels(&[120, 50, 0]);
        assert_eq!(s.harmonics[0].level, 99);
        assert_eq!(s.harmonics[1].level, 50);
        assert_eq!(s.harmonics[2].level, 0);
        assert_eq!(s.harmonics[3].level, 99); // untouched default
    }
}
