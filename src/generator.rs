//! `Generator`: the top-level driver. Owns the buffer arena, runtime
//! operator/voice tables, and the event cursor; `run()` is the sole entry
//! point that advances state and produces PCM.
//!
//! Grounded in the teacher's `Patch::tick`/`gather_inputs`/`scatter_outputs`
//! main loop (`graph.rs`) for the overall "advance state, then read
//! outputs" shape, generalized from a per-sample topologically-sorted node
//! walk into a per-block event-driven voice walk, and in `StereoBlock`'s
//! pan/mix arithmetic (`simd.rs`) for the final int16 conversion step.

use crate::arena::{BufferArena, BUF_LEN};
use crate::error::{GenError, MAX_NEST_DEPTH};
use crate::line::{Line, Shape};
use crate::noise::NoiseKind;
use crate::operator::{run_block, OpKind, Operator};
use crate::program::{mode_flags, op_params, OpType, Program};
use crate::voice::{FreqBufHint, Voice};
use crate::wave::WaveKind;

/// Top-level audio generation runtime for one compiled [`Program`].
pub struct Generator {
    sample_rate: f64,
    operators: Vec<Operator>,
    voices: Vec<Voice>,
    arena: BufferArena,
    program: Program,
    /// Index of the next unfired event.
    event_pos: usize,
    /// Samples already consumed from the event at `event_pos` (when an
    /// event's wait spans a block boundary).
    event_wait_remaining: u32,
    /// Index of the first voice that might still be active; advanced past
    /// voices that have finished to avoid re-scanning them every block.
    start_voice: usize,
    output_cleared: bool,
    warnings: Vec<String>,
    warned_cycle: bool,
}

impl Generator {
    /// Construct a `Generator` for `program` at `sample_rate`. Fails if the
    /// program's declared nesting depth exceeds the interpreter's limit.
    pub fn new(program: Program, sample_rate: f64) -> Result<Self, GenError> {
        if program.op_nest_depth > MAX_NEST_DEPTH {
            return Err(GenError::NestingTooDeep { depth: program.op_nest_depth, max: MAX_NEST_DEPTH });
        }

        let operators = (0..program.op_count).map(|_| Operator::new_amp_only()).collect();
        let voices = (0..program.vo_count).map(|_| Voice::new()).collect();
        let arena = BufferArena::new(program.op_nest_depth);

        let mut event_wait_remaining = 0;
        if let Some(first) = program.events.first() {
            event_wait_remaining = ms_to_samples(first.wait_ms, sample_rate);
        }

        Ok(Generator {
            sample_rate,
            operators,
            voices,
            arena,
            program,
            event_pos: 0,
            event_wait_remaining,
            start_voice: 0,
            output_cleared: false,
            warnings: Vec::new(),
            warned_cycle: false,
        })
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn fire_event(&mut self, idx: usize) {
        let event = self.program.events[idx].clone();

        for op in &event.op_data {
            self.apply_operator_data(op);
        }

        if let Some(vo_id) = event.vo_id {
            if let Some(vd) = &event.voice_data {
                let vo_id = vo_id as usize;
                self.voices[vo_id].carr_op_id = Some(vd.carr_op_id);
                self.voices[vo_id].init = true;
                self.voices[vo_id].freq_buf_hint = match self.operators.get(vd.carr_op_id as usize) {
                    Some(op) => match op.kind {
                        OpKind::WaveOsc(_, _) => FreqBufHint::WaveOsc,
                        OpKind::RandomSeg(_) => FreqBufHint::RandomSeg,
                        _ => FreqBufHint::None,
                    },
                    None => FreqBufHint::None,
                };
                // A re-activated earlier voice must be re-visited by
                // `run_for_time`'s scan even if it had previously finished.
                self.start_voice = self.start_voice.min(vo_id);
                self.voices[vo_id].duration = self.operators[vd.carr_op_id as usize].time;
            }
        }
    }

    fn apply_operator_data(&mut self, data: &crate::program::OperatorData) {
        let id = data.id as usize;

        if !self.operators[id].init {
            self.prepare_op(id, data.op_type);
        }

        if data.params & op_params::TIME != 0 {
            if data.time.implicit {
                // An implicit-time modulator has no duration of its own: it
                // runs for as long as the block its caller hands it, which
                // is already bounded (transitively, through nested
                // `run_block` calls) by its carrier's voice duration.
                self.operators[id].time_inf = true;
            } else if data.time.set {
                self.operators[id].time = ms_to_samples(data.time.ms, self.sample_rate);
                self.operators[id].time_inf = false;
            }
        }

        if data.params & op_params::AMP != 0 {
            if let Some(spec) = data.amp {
                self.operators[id].amp.par = line_from_spec(&spec, self.sample_rate);
            }
        }
        if data.params & op_params::AMP2 != 0 {
            if let Some(spec) = data.amp2 {
                self.operators[id].amp.r_par = line_from_spec(&spec, self.sample_rate);
            }
        }
        if data.params & op_params::FREQ != 0 {
            if let Some(spec) = data.freq {
                self.operators[id].freq.par = line_from_spec(&spec, self.sample_rate);
            }
        }
        if data.params & op_params::FREQ2 != 0 {
            if let Some(spec) = data.freq2 {
                self.operators[id].freq.r_par = line_from_spec(&spec, self.sample_rate);
            }
        }
        if data.params & op_params::PAN != 0 {
            if let Some(spec) = data.pan {
                self.operators[id].pan = line_from_spec(&spec, self.sample_rate);
            }
        }

        if data.params & op_params::AMODS != 0 {
            if let Some(ids) = &data.amods {
                self.operators[id].amp.mods = crate::param::ModulatorList(ids.clone());
            }
        }
        if data.params & op_params::RAMODS != 0 {
            if let Some(ids) = &data.ramods {
                self.operators[id].amp.r_mods = crate::param::ModulatorList(ids.clone());
            }
        }
        if data.params & op_params::FMODS != 0 {
            if let Some(ids) = &data.fmods {
                self.operators[id].freq.mods = crate::param::ModulatorList(ids.clone());
            }
        }
        if data.params & op_params::RFMODS != 0 {
            if let Some(ids) = &data.rfmods {
                self.operators[id].freq.r_mods = crate::param::ModulatorList(ids.clone());
            }
        }
        if data.params & op_params::PMODS != 0 {
            if let Some(ids) = &data.pmods {
                self.operators[id].pm_mods = crate::param::ModulatorList(ids.clone());
            }
        }
        if data.params & op_params::FPMODS != 0 {
            if let Some(ids) = &data.fpmods {
                self.operators[id].fpm_mods = crate::param::ModulatorList(ids.clone());
            }
        }
        if data.params & op_params::PHASE != 0 {
            if let OpKind::WaveOsc(_, phasor) = &mut self.operators[id].kind {
                *phasor = crate::phasor::Phasor::with_phase(self.sample_rate, data.phase);
            }
        }
        if data.params & op_params::MODE != 0 {
            if let (OpKind::WaveOsc(wosc, _), Some(w)) = (&mut self.operators[id].kind, data.wave) {
                wosc.set_wave(w);
            }
        }
    }

    /// Zero the runtime state for a newly-referenced operator and set its
    /// type-dispatched defaults (sine wave, default RasG mode, blank
    /// modulator lists everywhere).
    fn prepare_op(&mut self, id: usize, op_type: OpType) {
        self.operators[id] = match op_type {
            OpType::AmpOnly => Operator::new_amp_only(),
            OpType::Noise => Operator::new_noise(NoiseKind::White),
            OpType::WaveOsc => Operator::new_wave_osc(self.sample_rate, WaveKind::Sin),
            OpType::RandomSeg => {
                Operator::new_random_seg(self.sample_rate, crate::rasg::Mode::Urand, Shape::Lin)
            }
        };
        self.operators[id].init = true;
    }

    /// Run each active voice for up to `len` samples, mixing into cleared
    /// mix buffers, then clamp-and-write into `out` starting at `out_off`.
    fn run_for_time(&mut self, out: &mut [i16], out_off: usize, len: usize, stereo: bool) {
        let block_len = len.min(BUF_LEN);
        self.arena.clear_mix_bufs(block_len);

        let active_voice_count = self.voices.iter().filter(|v| v.is_active()).count().max(1);
        let amp_scale = 0.5
            * self.program.ampmult
            * if self.program.mode & mode_flags::AMP_DIV_VOICES != 0 {
                1.0 / active_voice_count as f64
            } else {
                1.0
            };

        for vi in self.start_voice..self.voices.len() {
            if !self.voices[vi].is_active() {
                continue;
            }
            let carr_id = match self.voices[vi].carr_op_id {
                Some(id) => id as usize,
                None => continue,
            };
            let run_len = block_len.min(self.voices[vi].duration as usize);
            if run_len == 0 {
                continue;
            }

            let mut carrier_buf = vec![0.0; run_len];
            let warned = &mut self.warned_cycle;
            let warnings = &mut self.warnings;
            run_block(&mut self.operators, carr_id, &mut carrier_buf, None, false, false, &mut |op_id| {
                if !*warned {
                    warnings.push(format!("cycle detected at operator {op_id}"));
                    *warned = true;
                }
            });

            let (mix_l, mix_r) = self.arena.mix_bufs();
            self.voices[vi].mix_into(&carrier_buf, mix_l.as_mut_slice(block_len), mix_r.as_mut_slice(block_len), amp_scale);
        }

        let (mix_l, mix_r) = self.arena.mix_bufs();
        let l = mix_l.as_slice(block_len);
        let r = mix_r.as_slice(block_len);
        for i in 0..block_len {
            let (ls, rs) = (l[i].clamp(-1.0, 1.0), r[i].clamp(-1.0, 1.0));
            if stereo {
                out[out_off + i * 2] = to_i16(ls);
                out[out_off + i * 2 + 1] = to_i16(rs);
            } else {
                out[out_off + i] = to_i16((ls + rs) * 0.5);
            }
        }

        while self.start_voice < self.voices.len() && !self.voices[self.start_voice].is_active() {
            self.start_voice += 1;
        }
    }

    /// Advance the generator by up to `buf_len` samples, writing into `out`
    /// (sized `buf_len * (stereo ? 2 : 1)`). Returns `(signal_ongoing,
    /// out_len)`: `signal_ongoing` is `false` exactly when every event has
    /// fired and every voice has finished.
    pub fn run(&mut self, out: &mut [i16], buf_len: usize, stereo: bool) -> (bool, usize) {
        if !self.output_cleared {
            out.fill(0);
            self.output_cleared = true;
        }

        let mut remaining = buf_len;
        let mut out_off = 0;

        while remaining > 0 {
            while self.event_pos < self.program.events.len() && self.event_wait_remaining == 0 {
                self.fire_event(self.event_pos);
                self.event_pos += 1;
                if self.event_pos < self.program.events.len() {
                    self.event_wait_remaining =
                        ms_to_samples(self.program.events[self.event_pos].wait_ms, self.sample_rate);
                }
            }

            let has_more_events = self.event_pos < self.program.events.len();
            let any_voice_active = self.voices.iter().any(|v| v.is_active());
            if !has_more_events && !any_voice_active {
                if self.event_pos >= self.program.events.len() {
                    for (i, v) in self.voices.iter().enumerate() {
                        if !v.init {
                            self.warnings.push(format!("voice {i} never initialized"));
                        }
                    }
                }
                return (false, buf_len - remaining);
            }

            let until_next_event = if has_more_events {
                self.event_wait_remaining as usize
            } else {
                usize::MAX
            };
            let chunk = remaining.min(until_next_event).min(BUF_LEN).max(1);

            self.run_for_time(out, out_off * if stereo { 2 } else { 1 }, chunk, stereo);
            self.output_cleared = false;

            if has_more_events {
                self.event_wait_remaining = self.event_wait_remaining.saturating_sub(chunk as u32);
            }
            remaining -= chunk;
            out_off += chunk;
        }

        (true, buf_len)
    }
}

fn ms_to_samples(ms: f64, sample_rate: f64) -> u32 {
    libm::round(ms * sample_rate / 1000.0).max(0.0) as u32
}

fn line_from_spec(spec: &crate::program::LineSpec, sample_rate: f64) -> Line {
    let end = ms_to_samples(spec.time_ms, sample_rate);
    if end == 0 {
        Line::constant(spec.v0)
    } else {
        Line::sweep(spec.v0, spec.vt, end, spec.shape)
    }
}

fn to_i16(s: f64) -> i16 {
    libm::round(s * i16::MAX as f64) as i32 as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{OperatorData, ProgramEvent, TimeSpec, VoiceData};

    fn sine_program(amp: f64, freq: f64, dur_ms: f64) -> Program {
        let op = OperatorData {
            id: 0,
            params: op_params::TYPE | op_params::TIME | op_params::AMP | op_params::FREQ,
            op_type: OpType::WaveOsc,
            time: TimeSpec { ms: dur_ms, set: true, implicit: false },
            phase: 0,
            wave: Some(WaveKind::Sin),
            rasg_mode: None,
            noise_kind: None,
            seed: 0,
            amp: Some(crate::program::LineSpec::constant(amp)),
            amp2: None,
            freq: Some(crate::program::LineSpec::constant(freq)),
            freq2: None,
            pan: None,
            pm_amp: None,
            amods: None,
            ramods: None,
            fmods: None,
            rfmods: None,
            pmods: None,
            fpmods: None,
        };
        Program {
            events: vec![ProgramEvent {
                wait_ms: 0.0,
                vo_id: Some(0),
                voice_data: Some(VoiceData { carr_op_id: 0 }),
                op_data: vec![op],
            }],
            vo_count: 1,
            op_count: 1,
            op_nest_depth: 1,
            mode: 0,
            ampmult: 1.0,
        }
    }

    #[test]
    fn empty_program_returns_false_immediately_with_zeroed_output() {
        let program = Program {
            events: Vec::new(),
            vo_count: 0,
            op_count: 0,
            op_nest_depth: 0,
            mode: 0,
            ampmult: 1.0,
        };
        let mut gen = Generator::new(program, 44100.0).unwrap();
        let mut out = vec![1i16; 64];
        let (ongoing, out_len) = gen.run(&mut out, 64, false);
        assert!(!ongoing);
        assert_eq!(out_len, 0);
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn single_sine_voice_eventually_finishes() {
        let program = sine_program(1.0, 440.0, 50.0);
        let mut gen = Generator::new(program, 44100.0).unwrap();
        let mut out = vec![0i16; 4096];
        let mut ongoing = true;
        let mut total = 0;
        let mut iterations = 0;
        while ongoing && iterations < 100 {
            let (cont, n) = gen.run(&mut out, 4096, false);
            ongoing = cont;
            total += n;
            iterations += 1;
        }
        assert!(total > 0);
        assert!(iterations < 100);
    }

    #[test]
    fn output_never_exceeds_i16_amplitude_bound() {
        let program = sine_program(1.0, 440.0, 20.0);
        let mut gen = Generator::new(program, 44100.0).unwrap();
        let mut out = vec![0i16; 2048];
        gen.run(&mut out, 2048, false);
        assert!(out.iter().all(|&v| (v as i32).abs() <= 32767));
    }

    #[test]
    fn nesting_depth_over_limit_is_rejected_at_construction() {
        let mut program = sine_program(1.0, 440.0, 10.0);
        program.op_nest_depth = 256;
        assert!(Generator::new(program, 44100.0).is_err());
    }
}
