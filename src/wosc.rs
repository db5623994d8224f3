//! `WOsc`: phase-in, sample-out wave oscillator using PILUT differentiation
//! for anti-aliasing under FM/PM.
//!
//! Grounded in the teacher's `Vco` oscillator (`modules.rs`) for the overall
//! phase-in/sample-out shape, replacing its naive per-sample `sin`/`tri`
//! table lookups with the differentiation-of-the-integral technique the
//! spec requires, and its `SlewLimiter` one-pole filter (also `modules.rs`)
//! for the self-modulation feedback path.

use crate::wave::{self, WaveKind};

/// A wave oscillator: consumes a phase buffer (typically produced by
/// [`crate::phasor::Phasor::fill`]) and differentiates the wave's PILUT to
/// produce anti-aliased samples.
pub struct WOsc {
    kind: WaveKind,
    prev_phase: u32,
    prev_is: f64,
    prev_s: f64,
    initialized: bool,
    /// One-pole + one-zero self-modulation smoothing state.
    fb_z1: f64,
}

impl WOsc {
    pub fn new(kind: WaveKind) -> Self {
        WOsc {
            kind,
            prev_phase: 0,
            prev_is: 0.0,
            prev_s: 0.0,
            initialized: false,
            fb_z1: 0.0,
        }
    }

    pub fn set_wave(&mut self, kind: WaveKind) {
        if kind != self.kind {
            self.kind = kind;
            self.initialized = false;
        }
    }

    fn reset(&mut self, table: &wave::WaveTable, phase: u32) {
        let seed_phase = phase.wrapping_sub(Self::step_len());
        self.prev_is = table.get_herp(seed_phase);
        let one_step = table.get_herp(phase) ;
        self.prev_s = (one_step - self.prev_is) * table.dvscale + table.dvoffset;
        self.prev_phase = seed_phase;
        self.initialized = true;
    }

    /// A conventional single-LUT-cell step, used only to seed the
    /// differentiation filter on reset.
    fn step_len() -> u32 {
        (1u64 << 32) as u32 / wave::LEN as u32
    }

    /// Render `out.len()` samples from `phase_buf`.
    pub fn run(&mut self, out: &mut [f64], phase_buf: &[u32]) {
        let table = wave::tables().get(self.kind);
        if !self.initialized {
            self.reset(table, phase_buf[0]);
        }
        for (i, &phase) in phase_buf.iter().enumerate() {
            let phase_diff = phase.wrapping_sub(self.prev_phase);
            if phase_diff == 0 {
                out[i] = self.prev_s;
                continue;
            }
            let is = table.get_herp(phase);
            let s = (is - self.prev_is) * (table.dvscale / phase_diff as f64) + table.dvoffset;
            self.prev_is = is;
            self.prev_s = s;
            self.prev_phase = phase;
            out[i] = s;
        }
    }

    /// Self-modulation: each output sample feeds back through a 1-pole +
    /// 1-zero filter on `(s + prev_s)` into the next phase, scaled by
    /// `fb_amt`. The phase buffer is mutated in place to reflect the
    /// feedback before rendering.
    pub fn run_selfmod(&mut self, out: &mut [f64], phase_buf: &mut [u32], fb_amt: &[f64]) {
        let table = wave::tables().get(self.kind);
        if !self.initialized {
            self.reset(table, phase_buf[0]);
        }
        for i in 0..phase_buf.len() {
            let fb_sample = self.fb_z1;
            let filtered = 0.5 * (self.prev_s + fb_sample);
            self.fb_z1 = self.prev_s;
            let fb_offset = (i32::MAX as f64 * filtered * fb_amt[i]) as i64 as i32 as u32;
            phase_buf[i] = phase_buf[i].wrapping_add(fb_offset);

            let phase = phase_buf[i];
            let phase_diff = phase.wrapping_sub(self.prev_phase);
            let s = if phase_diff == 0 {
                self.prev_s
            } else {
                let is = table.get_herp(phase);
                let s = (is - self.prev_is) * (table.dvscale / phase_diff as f64) + table.dvoffset;
                self.prev_is = is;
                s
            };
            self.prev_phase = phase;
            self.prev_s = s;
            out[i] = s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phasor::Phasor;

    #[test]
    fn steady_frequency_sine_matches_naive_lut_within_bounded_error() {
        let srate = 44100.0;
        let mut phasor = Phasor::new(srate);
        let mut phase_buf = vec![0u32; 256];
        let freq = vec![100.0; 256]; // one LUT sample per step or slower
        phasor.fill(&mut phase_buf, &freq, None, None);

        let mut wosc = WOsc::new(WaveKind::Sin);
        let mut out = vec![0.0; 256];
        wosc.run(&mut out, &phase_buf);

        let table = wave::tables().get(WaveKind::Sin);
        for (i, &phase) in phase_buf.iter().enumerate().skip(8) {
            let naive = table.get_lerp(phase);
            assert!((out[i] - naive).abs() < 0.3, "sample {i}: {} vs {}", out[i], naive);
        }
    }

    #[test]
    fn zero_phase_diff_reuses_previous_sample() {
        let mut wosc = WOsc::new(WaveKind::Sin);
        let phase_buf = [1000u32, 1000, 1000];
        let mut out = [0.0; 3];
        wosc.run(&mut out, &phase_buf);
        assert_eq!(out[1], out[0]);
        assert_eq!(out[2], out[0]);
    }

    #[test]
    fn set_wave_forces_reinitialization() {
        let mut wosc = WOsc::new(WaveKind::Sin);
        let phase_buf = [0u32, 1_000_000];
        let mut out = [0.0; 2];
        wosc.run(&mut out, &phase_buf);
        assert!(wosc.initialized);
        wosc.set_wave(WaveKind::Saw);
        assert!(!wosc.initialized);
    }
}
