//! `Operator`: per-operator runtime state and the `run_block` evaluator.
//!
//! Grounded in the teacher's `Patch::tick`/topological-sort cycle handling
//! (`graph.rs`) for the `ON_VISITED` guard — generalized from a one-shot
//! compile-time cycle rejection (`PatchError::CycleDetected`) into a
//! per-block runtime guard that tolerates self-reference by yielding
//! silence, per the spec's "cycle safety" testable property — and in
//! `GraphModule::process_block`'s buffer-driven step signature (`port.rs`)
//! for `run_block`'s shape.

use crate::line::Line;
use crate::noise::NoiseG;
use crate::param::{ModulatorList, ParamWithRange};
use crate::phasor::Phasor;
use crate::rasg::RasG;
use crate::wave::WaveKind;
use crate::wosc::WOsc;

/// What kind of signal an operator produces.
pub enum OpKind {
    /// No oscillator: output is a flat `1.0` scaled by `amp`.
    AmpOnly,
    Noise(NoiseG),
    WaveOsc(WOsc, Phasor),
    RandomSeg(RasG),
}

/// Per-operator runtime state, shared across all `OpKind` variants.
pub struct Operator {
    pub kind: OpKind,
    pub amp: ParamWithRange,
    pub freq: ParamWithRange,
    pub pan: Line,
    pub pm_mods: ModulatorList,
    pub fpm_mods: ModulatorList,
    pub amp_mods: ModulatorList,
    /// Samples remaining before this operator's duration elapses.
    pub time: u32,
    pub time_inf: bool,
    pub init: bool,
    /// Set on recursive entry, cleared on exit; a second entry within the
    /// same block yields silence instead of infinite recursion.
    pub visited: bool,
}

impl Operator {
    pub fn new_amp_only() -> Self {
        Operator {
            kind: OpKind::AmpOnly,
            amp: ParamWithRange::constant(1.0),
            freq: ParamWithRange::constant(0.0),
            pan: Line::constant(0.0),
            pm_mods: ModulatorList::blank(),
            fpm_mods: ModulatorList::blank(),
            amp_mods: ModulatorList::blank(),
            time: 0,
            time_inf: true,
            init: false,
            visited: false,
        }
    }

    pub fn new_wave_osc(sample_rate: f64, wave: WaveKind) -> Self {
        Operator {
            kind: OpKind::WaveOsc(WOsc::new(wave), Phasor::new(sample_rate)),
            amp: ParamWithRange::constant(1.0),
            freq: ParamWithRange::constant(440.0),
            pan: Line::constant(0.0),
            pm_mods: ModulatorList::blank(),
            fpm_mods: ModulatorList::blank(),
            amp_mods: ModulatorList::blank(),
            time: 0,
            time_inf: true,
            init: false,
            visited: false,
        }
    }

    pub fn new_noise(kind: crate::noise::NoiseKind) -> Self {
        Operator {
            kind: OpKind::Noise(NoiseG::new(kind)),
            amp: ParamWithRange::constant(1.0),
            freq: ParamWithRange::constant(0.0),
            pan: Line::constant(0.0),
            pm_mods: ModulatorList::blank(),
            fpm_mods: ModulatorList::blank(),
            amp_mods: ModulatorList::blank(),
            time: 0,
            time_inf: true,
            init: false,
            visited: false,
        }
    }

    pub fn new_random_seg(sample_rate: f64, mode: crate::rasg::Mode, shape: crate::line::Shape) -> Self {
        Operator {
            kind: OpKind::RandomSeg(RasG::new(sample_rate, mode, shape, 0)),
            amp: ParamWithRange::constant(1.0),
            freq: ParamWithRange::constant(440.0),
            pan: Line::constant(0.0),
            pm_mods: ModulatorList::blank(),
            fpm_mods: ModulatorList::blank(),
            amp_mods: ModulatorList::blank(),
            time: 0,
            time_inf: true,
            init: false,
            visited: false,
        }
    }
}

/// Mixing mode for combining an operator's raw signal with its amplitude.
///
/// - `(false, false)`: `out[i] = in[i] * amp[i]` (overwrite).
/// - `(false, true)`: `out[i] += in[i] * amp[i]` (additive layer).
/// - `(true, false)`: map to `[0,1] * |amp|` (value-range "wave-env" source).
/// - `(true, true)`: multiply the wave-env mapping into the existing buffer.
fn mix(out: &mut [f64], raw: &[f64], amp: &[f64], wave_env: bool, layer: bool) {
    for i in 0..out.len() {
        let v = match wave_env {
            false => raw[i] * amp[i],
            true => raw[i] * amp[i] * 0.5 + (amp[i] * 0.5).abs(),
        };
        if layer {
            if wave_env {
                out[i] *= v;
            } else {
                out[i] += v;
            }
        } else {
            out[i] = v;
        }
    }
}

/// Evaluate `operators[op_id]` into `out`, recursing into its modulator
/// subgraph. `freq_parent` is the parent operator's already-computed
/// frequency buffer (for ratio-based child frequencies); `wave_env`/`layer`
/// select the mixing mode per §4.8.
///
/// Cycle guard: if `operators[op_id]` is already `visited` (this is a
/// self-reference reached via its own modulator graph within the same
/// block), `out` is zero-filled and `on_cycle` is invoked at most once per
/// occurrence so the caller can emit a single warning.
pub fn run_block(
    operators: &mut [Operator],
    op_id: usize,
    out: &mut [f64],
    freq_parent: Option<&[f64]>,
    wave_env: bool,
    layer: bool,
    on_cycle: &mut impl FnMut(usize),
) {
    if operators[op_id].visited {
        on_cycle(op_id);
        if !layer {
            out.fill(0.0);
        }
        return;
    }
    operators[op_id].visited = true;

    let buf_len = out.len();
    let (len, skip_len) = if !operators[op_id].time_inf && (operators[op_id].time as usize) < buf_len {
        (operators[op_id].time as usize, buf_len - operators[op_id].time as usize)
    } else {
        (buf_len, 0)
    };

    if len > 0 {
        let active = &mut out[..len];
        let mut amp_buf = vec![0.0; len];
        {
            // `amp` is evaluated with itself temporarily removed from
            // `operators` so `run_block`'s recursive calls (for its own
            // modulators) can still borrow the full operator table.
            let mut amp = core::mem::replace(&mut operators[op_id].amp, ParamWithRange::constant(0.0));
            amp.eval(&mut amp_buf, None, |mod_id, mbuf, we| {
                run_block(operators, mod_id as usize, mbuf, None, we, false, on_cycle);
            });
            operators[op_id].amp = amp;
        }

        match &mut operators[op_id].kind {
            OpKind::AmpOnly => {
                let raw = vec![1.0; len];
                mix(active, &raw, &amp_buf, wave_env, layer);
            }
            OpKind::Noise(noise) => {
                let mut raw = vec![0.0; len];
                noise.run(&mut raw);
                mix(active, &raw, &amp_buf, wave_env, layer);
            }
            OpKind::WaveOsc(_, _) => {
                let mut freq_buf = vec![0.0; len];
                {
                    let mut freq = core::mem::replace(&mut operators[op_id].freq, ParamWithRange::constant(0.0));
                    freq.eval(&mut freq_buf, freq_parent, |mod_id, mbuf, we| {
                        let parent_snapshot = mbuf.to_vec();
                        run_block(operators, mod_id as usize, mbuf, Some(&parent_snapshot), we, false, on_cycle);
                    });
                    operators[op_id].freq = freq;
                }

                let pm_ids: Vec<u32> = operators[op_id].pm_mods.ids().to_vec();
                let fpm_ids: Vec<u32> = operators[op_id].fpm_mods.ids().to_vec();
                let pm_buf = if pm_ids.is_empty() {
                    None
                } else {
                    let mut buf = vec![0.0; len];
                    for id in pm_ids {
                        let mut tmp = vec![0.0; len];
                        run_block(operators, id as usize, &mut tmp, Some(&freq_buf), false, false, on_cycle);
                        for i in 0..len {
                            buf[i] += tmp[i];
                        }
                    }
                    Some(buf)
                };
                let fpm_buf = if fpm_ids.is_empty() {
                    None
                } else {
                    let mut buf = vec![0.0; len];
                    for id in fpm_ids {
                        let mut tmp = vec![0.0; len];
                        run_block(operators, id as usize, &mut tmp, Some(&freq_buf), false, false, on_cycle);
                        for i in 0..len {
                            buf[i] += tmp[i];
                        }
                    }
                    Some(buf)
                };

                let mut phase_buf = vec![0u32; len];
                if let OpKind::WaveOsc(_, phasor) = &mut operators[op_id].kind {
                    phasor.fill(&mut phase_buf, &freq_buf, pm_buf.as_deref(), fpm_buf.as_deref());
                }

                let mut raw = vec![0.0; len];
                if let OpKind::WaveOsc(wosc, _) = &mut operators[op_id].kind {
                    wosc.run(&mut raw, &phase_buf);
                }
                mix(active, &raw, &amp_buf, wave_env, layer);
            }
            OpKind::RandomSeg(_) => {
                let mut freq_buf = vec![0.0; len];
                {
                    let mut freq = core::mem::replace(&mut operators[op_id].freq, ParamWithRange::constant(0.0));
                    freq.eval(&mut freq_buf, freq_parent, |mod_id, mbuf, we| {
                        let parent_snapshot = mbuf.to_vec();
                        run_block(operators, mod_id as usize, mbuf, Some(&parent_snapshot), we, false, on_cycle);
                    });
                    operators[op_id].freq = freq;
                }
                let mut raw = vec![0.0; len];
                if let OpKind::RandomSeg(rasg) = &mut operators[op_id].kind {
                    rasg.run(&mut raw, &freq_buf);
                }
                mix(active, &raw, &amp_buf, wave_env, layer);
            }
        }
    }

    if skip_len > 0 && !layer {
        out[len..].fill(0.0);
    }

    let consumed = len.min(operators[op_id].time as usize);
    operators[op_id].time = operators[op_id].time.saturating_sub(consumed as u32);
    operators[op_id].visited = false;
}
