//! Wave lookup tables and pre-integrated lookup tables (PILUTs).
//!
//! Grounded in the teacher's `Vco` waveform formulas (`modules.rs`, sin/tri/
//! saw/sqr via `libm`) for the naive tables, generalized to also produce the
//! running-integral table each [`crate::wosc::WOsc`] differentiates for
//! anti-aliasing. Lazy, process-wide construction follows the `once_cell`
//! pattern used for exactly this purpose (building a table once on first
//! access) in the sibling wavetable-synthesis example from the reference
//! pack.

use once_cell::sync::Lazy;

/// Table length. A power of two, as the spec requires; indices are derived
/// from the top bits of a 32-bit phase.
pub const LEN: usize = 1024;
const LEN_MASK: u32 = (LEN - 1) as u32;
/// Bits to shift a `u32` phase right by to obtain a `LEN`-sized index with
/// room for Hermite interpolation against the fractional remainder.
const PHASE_SHIFT: u32 = 32 - LEN.trailing_zeros();

/// `HUMMID`: geometric mean of 20 Hz and 20000 Hz, used as the reference
/// frequency for frequency-proportional phase modulation (see
/// [`crate::phasor::Phasor::fill`]).
pub const HUMMID: f64 = 632.455_532_033_675_9;

/// Selectable waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaveKind {
    Sin,
    Tri,
    Saw,
    Sqr,
}

impl WaveKind {
    /// Naive per-phase sample, `phase` normalized to `[0, 1)`.
    fn naive(self, phase: f64) -> f64 {
        match self {
            WaveKind::Sin => libm::sin(2.0 * core::f64::consts::PI * phase),
            WaveKind::Tri => 4.0 * (phase - libm::floor(phase + 0.75) + 0.25).abs() - 1.0,
            WaveKind::Saw => 2.0 * (phase - libm::floor(phase + 0.5)),
            WaveKind::Sqr => {
                if phase.fract() < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }

    /// Phase offset so the table's index 0 sample is 0, matching each wave's
    /// natural zero crossing.
    fn phase_adj(self) -> f64 {
        match self {
            WaveKind::Sin => 0.0,
            WaveKind::Tri => 0.25,
            WaveKind::Saw => 0.5,
            WaveKind::Sqr => 0.0,
        }
    }
}

/// A wave's naive LUT plus its pre-integrated companion.
pub struct WaveTable {
    /// `naive[i]` = waveform value at phase `i / LEN`.
    pub naive: [f64; LEN],
    /// `pilut[i]` = running integral of `naive` up to phase `i / LEN`.
    pub pilut: [f64; LEN],
    /// Scales a PILUT difference back into a waveform sample: multiplied by
    /// `(pilut[j] - pilut[i]) / phase_diff`.
    pub dvscale: f64,
    pub dvoffset: f64,
}

impl WaveTable {
    fn build(kind: WaveKind) -> Self {
        let adj = kind.phase_adj();
        let mut naive = [0.0; LEN];
        for (i, slot) in naive.iter_mut().enumerate() {
            let phase = (i as f64 / LEN as f64 + adj).fract();
            *slot = kind.naive(phase);
        }

        let mut pilut = [0.0; LEN];
        let mut acc = 0.0;
        for i in 0..LEN {
            acc += naive[i] / LEN as f64;
            pilut[i] = acc;
        }
        // Pre-integrated tables are conventionally referenced to a mean of
        // zero so that differencing two samples an arbitrary distance apart
        // reconstructs the waveform without DC drift.
        let mean: f64 = pilut.iter().sum::<f64>() / LEN as f64;
        for v in pilut.iter_mut() {
            *v -= mean;
        }

        WaveTable {
            naive,
            pilut,
            dvscale: LEN as f64,
            dvoffset: 0.0,
        }
    }

    /// Linear interpolation between the two nearest naive-LUT samples.
    pub fn get_lerp(&self, phase32: u32) -> f64 {
        let idx = (phase32 >> PHASE_SHIFT) & LEN_MASK;
        let frac = ((phase32 << (LEN.trailing_zeros())) >> (LEN.trailing_zeros())) as f64
            / (1u64 << PHASE_SHIFT) as f64;
        let a = self.naive[idx as usize];
        let b = self.naive[((idx + 1) & LEN_MASK) as usize];
        a + (b - a) * frac
    }

    /// 4-point Hermite interpolation over the PILUT, for differentiation
    /// quality in [`crate::wosc::WOsc::run`].
    pub fn get_herp(&self, phase32: u32) -> f64 {
        let idx = (phase32 >> PHASE_SHIFT) & LEN_MASK;
        let shift = LEN.trailing_zeros();
        let frac = ((phase32 << shift) >> shift) as f64 / (1u64 << PHASE_SHIFT) as f64;

        let im1 = self.pilut[((idx + LEN_MASK) & LEN_MASK) as usize];
        let i0 = self.pilut[idx as usize];
        let i1 = self.pilut[((idx + 1) & LEN_MASK) as usize];
        let i2 = self.pilut[((idx + 2) & LEN_MASK) as usize];

        hermite4(im1, i0, i1, i2, frac)
    }
}

/// Four-point Hermite (Catmull-Rom style) interpolation between `p0` and
/// `p1`, with `pm1`/`p2` as the outer control points, at fraction `t`.
fn hermite4(pm1: f64, p0: f64, p1: f64, p2: f64, t: f64) -> f64 {
    let c0 = p0;
    let c1 = 0.5 * (p1 - pm1);
    let c2 = pm1 - 2.5 * p0 + 2.0 * p1 - 0.5 * p2;
    let c3 = 0.5 * (p2 - pm1) + 1.5 * (p0 - p1);
    ((c3 * t + c2) * t + c1) * t + c0
}

/// The process-wide set of wave tables, built once on first access.
pub struct WaveTables {
    pub sin: WaveTable,
    pub tri: WaveTable,
    pub saw: WaveTable,
    pub sqr: WaveTable,
}

impl WaveTables {
    pub fn get(&self, kind: WaveKind) -> &WaveTable {
        match kind {
            WaveKind::Sin => &self.sin,
            WaveKind::Tri => &self.tri,
            WaveKind::Saw => &self.saw,
            WaveKind::Sqr => &self.sqr,
        }
    }
}

static TABLES: Lazy<WaveTables> = Lazy::new(|| WaveTables {
    sin: WaveTable::build(WaveKind::Sin),
    tri: WaveTable::build(WaveKind::Tri),
    saw: WaveTable::build(WaveKind::Saw),
    sqr: WaveTable::build(WaveKind::Sqr),
});

/// Access the lazily-built, process-wide wave tables.
pub fn tables() -> &'static WaveTables {
    &TABLES
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sin_table_matches_libm_sin_within_lut_resolution() {
        let t = &tables().sin;
        for i in 0..LEN {
            let phase = i as f64 / LEN as f64;
            let expected = libm::sin(2.0 * core::f64::consts::PI * phase);
            assert_relative_eq!(t.naive[i], expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn pilut_has_zero_mean() {
        for kind in [WaveKind::Sin, WaveKind::Tri, WaveKind::Saw, WaveKind::Sqr] {
            let t = tables().get(kind);
            let mean: f64 = t.pilut.iter().sum::<f64>() / LEN as f64;
            assert_relative_eq!(mean, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn get_lerp_matches_exact_samples_at_grid_points() {
        let t = &tables().sin;
        for i in 0..8usize {
            let phase32 = ((i as u64 * (1u64 << 32)) / LEN as u64) as u32;
            assert_relative_eq!(t.get_lerp(phase32), t.naive[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn phase_is_cyclic_across_wraparound() {
        let t = &tables().sin;
        let near_end = u32::MAX - 10;
        let v = t.get_lerp(near_end);
        assert!(v.is_finite());
    }
}
