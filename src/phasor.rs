//! Phase accumulators: `Phasor` (32-bit) and `Cyclor` (64-bit, cycle-tracking).
//!
//! Grounded in the teacher's `Vco` phase-accumulation loop (`modules.rs`,
//! `self.phase += freq / self.sample_rate`) generalized from a float phase
//! in `[0,1)` to a wraparound-free 32-bit fixed-point accumulator, per-sample
//! filled from frequency and modulation buffers rather than read once per
//! tick.

use crate::wave::HUMMID;

/// A 32-bit phase accumulator filling a phase buffer from a frequency buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Phasor {
    phase: u32,
    /// `u32::MAX / sample_rate`, precomputed at construction.
    coeff: f64,
}

impl Phasor {
    pub fn new(sample_rate: f64) -> Self {
        Phasor {
            phase: 0,
            coeff: u32::MAX as f64 / sample_rate,
        }
    }

    pub fn with_phase(sample_rate: f64, phase: u32) -> Self {
        let mut p = Self::new(sample_rate);
        p.phase = phase;
        p
    }

    pub fn phase(&self) -> u32 {
        self.phase
    }

    /// Fill `phase_out` for `freq[i]` Hz per sample, with optional phase
    /// modulation (`pm`, added directly as a `[-1,1]` fraction of a cycle)
    /// and frequency-scaled phase modulation (`fpm`, scaled by
    /// `freq[i] / HUMMID` before being added). Either modulator may be
    /// omitted to avoid unnecessary work in the inner loop.
    pub fn fill(&mut self, phase_out: &mut [u32], freq: &[f64], pm: Option<&[f64]>, fpm: Option<&[f64]>) {
        for i in 0..phase_out.len() {
            let inc = libm::round(self.coeff * freq[i]) as i64 as u32;
            self.phase = self.phase.wrapping_add(inc);

            let mut ofs_frac = 0.0;
            if let Some(pm) = pm {
                ofs_frac += pm[i];
            }
            if let Some(fpm) = fpm {
                ofs_frac += fpm[i] * freq[i] / HUMMID;
            }
            let ofs = if ofs_frac != 0.0 {
                libm::round(i32::MAX as f64 * ofs_frac) as i64 as i32 as u32
            } else {
                0
            };
            phase_out[i] = ofs.wrapping_add(self.phase);
        }
    }
}

/// A 64-bit phase/cycle accumulator: the upper 32 bits count whole cycles,
/// the lower 32 track sub-cycle phase, exposed separately for [`crate::rasg`]
/// (which indexes its endpoint hash by cycle number) and for waveform
/// rendering (which uses the phase).
#[derive(Debug, Clone, Copy)]
pub struct Cyclor {
    state: u64,
    coeff: f64,
    /// When set, the cycle counter advances twice per phase wrap, for
    /// waveforms rendered as two half-cycle line segments.
    rate2x: bool,
}

impl Cyclor {
    pub fn new(sample_rate: f64, rate2x: bool) -> Self {
        Cyclor {
            state: 0,
            coeff: u32::MAX as f64 / sample_rate,
            rate2x,
        }
    }

    pub fn cycle(&self) -> u32 {
        (self.state >> 32) as u32
    }

    pub fn phase(&self) -> u32 {
        self.state as u32
    }

    /// Fill `cycle_out`/`phase_out` for `freq[i]` Hz per sample. Either
    /// output slice may be shorter than `freq` only if both share the same
    /// length as the caller's block (both must be sized to `freq.len()`).
    pub fn fill(&mut self, cycle_out: &mut [u32], phase_out: &mut [u32], freq: &[f64]) {
        let step_scale = if self.rate2x { 2.0 } else { 1.0 };
        for i in 0..freq.len() {
            let inc = (libm::round(self.coeff * freq[i] * step_scale) as i64 as u32) as u64;
            self.state = self.state.wrapping_add(inc);
            cycle_out[i] = (self.state >> 32) as u32;
            phase_out[i] = self.state as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn phasor_round_trip_after_k_samples_at_srate_over_k() {
        let srate = 44100.0;
        let k = 100u32;
        let mut p = Phasor::new(srate);
        let start = p.phase();
        let freq = vec![srate / k as f64; k as usize];
        let mut out = vec![0u32; k as usize];
        p.fill(&mut out, &freq, None, None);
        // Rounding `coeff * freq` to the nearest integer increment each
        // sample accumulates at most one unit of error per sample.
        let drift = p.phase().wrapping_sub(start) as i32;
        assert!(drift.unsigned_abs() <= k, "drift {drift} too large for k={k}");
    }

    #[test]
    fn phasor_with_no_modulation_matches_bare_accumulation() {
        let srate = 48000.0;
        let mut p = Phasor::new(srate);
        let freq = vec![440.0; 4];
        let mut out = vec![0u32; 4];
        p.fill(&mut out, &freq, None, None);
        let inc = libm::round((u32::MAX as f64 / srate) * 440.0) as i64 as u32;
        let mut expect = 0u32;
        for (i, o) in out.iter().enumerate() {
            expect = expect.wrapping_add(inc);
            assert_eq!(*o, expect, "sample {i}");
        }
    }

    #[test]
    fn cyclor_increments_cycle_on_phase_wrap() {
        let srate = 100.0;
        let mut c = Cyclor::new(srate, false);
        let freq = vec![srate; 3]; // one full wrap per sample
        let mut cyc = vec![0u32; 3];
        let mut phase = vec![0u32; 3];
        c.fill(&mut cyc, &mut phase, &freq);
        assert_eq!(cyc, vec![1, 2, 3]);
    }

    #[test]
    fn cyclor_rate2x_advances_cycle_twice_as_fast() {
        let srate = 100.0;
        let mut c = Cyclor::new(srate, true);
        let freq = vec![srate; 2];
        let mut cyc = vec![0u32; 2];
        let mut phase = vec![0u32; 2];
        c.fill(&mut cyc, &mut phase, &freq);
        assert_eq!(cyc, vec![2, 4]);
    }

    #[test]
    fn hummid_matches_geometric_mean_of_audible_range() {
        assert_relative_eq!(HUMMID, (20.0_f64 * 20000.0).sqrt(), epsilon = 1e-6);
    }
}
