//! Harmonic level generation from Leiter waveform models.
//!
//! Each waveform is a closed-form spectral model: for 1-based harmonic `n`
//! and parameters `(a, b, c, xp, d, e, yp)`,
//!
//! ```text
//! x = n·π·xp          y = n·π·yp
//! magnitude = (1/nᵃ) · sin(x)ᵇ · cos(x)ᶜ · sin(y)ᵈ · cos(y)ᵉ
//! ```
//!
//! and the K5 level is `99 + 8·log2(|magnitude|)`, floored and saturated
//! into 0..=99. The generated table feeds a source's 63 harmonic levels.

use std::f64::consts::PI;

use crate::error::{Error, Result};

/// Highest level the K5 accepts for a harmonic.
pub const MAX_LEVEL: u8 = 99;

/// Parameters of one Leiter waveform model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeiterParams {
    /// Rolloff exponent.
    pub a: f64,
    /// sin(x) exponent.
    pub b: f64,
    /// cos(x) exponent.
    pub c: f64,
    /// x phase multiplier.
    pub x_phase: f64,
    /// sin(y) exponent.
    pub d: f64,
    /// cos(y) exponent.
    pub e: f64,
    /// y phase multiplier.
    pub y_phase: f64,
}

/// The built-in waveform table.
pub const WAVEFORMS: &[(&str, LeiterParams)] = &[
    (
        "saw",
        LeiterParams {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            x_phase: 0.0,
            d: 0.0,
            e: 0.0,
            y_phase: 0.0,
        },
    ),
    (
        "square",
        LeiterParams {
            a: 1.0,
            b: 1.0,
            c: 0.0,
            x_phase: 0.5,
            d: 0.0,
            e: 0.0,
            y_phase: 0.0,
        },
    ),
    (
        "triangle",
        LeiterParams {
            a: 2.0,
            b: 1.0,
            c: 0.0,
            x_phase: 0.5,
            d: 0.0,
            e: 0.0,
            y_phase: 0.0,
        },
    ),
];

/// Looks up the parameters for a named waveform.
pub fn params(name: &str) -> Option<&'static LeiterParams> {
    WAVEFORMS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, p)| p)
}

/// Relative magnitude of harmonic `n` (1-based) under `p`.
fn leiter(n: usize, p: &LeiterParams) -> f64 {
    let nf = n as f64;
    let x = nf * PI * p.x_phase;
    let y = nf * PI * p.y_phase;
    let rolloff = 1.0 / nf.powf(p.a);
    rolloff
        * x.sin().powf(p.b)
        * x.cos().powf(p.c)
        * y.sin().powf(p.d)
        * y.cos().powf(p.e)
}

/// K5 level (0..=99) of harmonic `n` (1-based) under `p`.
pub fn level(n: usize, p: &LeiterParams) -> u8 {
    let magnitude = leiter(n, p).abs();
    let v = 99.0 + 8.0 * magnitude.log2();
    if v.is_nan() || v < 0.0 {
        return 0;
    }
    (v.floor() as u64).min(MAX_LEVEL as u64) as u8
}

/// Generates `count` harmonic levels for the named waveform.
pub fn levels(waveform: &str, count: usize) -> Result<Vec<u8>> {
    let p = params(waveform).ok_or_else(|| Error::UnknownWaveform(waveform.to_string()))?;
    Ok((1..=count).map(|n| level(n, p)).collect())
}
