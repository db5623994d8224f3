use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sagen::generator::Generator;
use sagen::program::{
    mode_flags, op_params, LineSpec, OpType, OperatorData, Program, ProgramEvent, TimeSpec,
    VoiceData,
};
use sagen::wave::WaveKind;

const SAMPLE_RATE: f64 = 44_100.0;

fn sine_voice_op(id: u32, freq: f64) -> OperatorData {
    OperatorData {
        id,
        params: op_params::TYPE | op_params::TIME | op_params::AMP | op_params::FREQ,
        op_type: OpType::WaveOsc,
        time: TimeSpec { ms: 2_000.0, set: true, implicit: false },
        phase: 0,
        wave: Some(WaveKind::Sin),
        rasg_mode: None,
        noise_kind: None,
        seed: 0,
        amp: Some(LineSpec::constant(0.2)),
        amp2: None,
        freq: Some(LineSpec::constant(freq)),
        freq2: None,
        pan: None,
        pm_amp: None,
        amods: None,
        ramods: None,
        fmods: None,
        rfmods: None,
        pmods: None,
        fpmods: None,
    }
}

fn chord_program(voice_count: u32) -> Program {
    let events = (0..voice_count)
        .map(|i| ProgramEvent {
            wait_ms: 0.0,
            vo_id: Some(i),
            voice_data: Some(VoiceData { carr_op_id: i }),
            op_data: vec![sine_voice_op(i, 220.0 + i as f64 * 40.0)],
        })
        .collect();

    Program {
        events,
        vo_count: voice_count,
        op_count: voice_count,
        op_nest_depth: 1,
        mode: mode_flags::AMP_DIV_VOICES,
        ampmult: 1.0,
    }
}

fn bench_generator(c: &mut Criterion) {
    let mut group = c.benchmark_group("generator_run");

    for &voice_count in &[1u32, 8, 32] {
        group.bench_function(format!("{voice_count}_voices"), |b| {
            b.iter(|| {
                let program = chord_program(voice_count);
                let mut gen = Generator::new(program, SAMPLE_RATE).unwrap();
                let mut out = vec![0i16; 4096 * 2];
                let (_, n) = gen.run(&mut out, 4096, true);
                black_box(n);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_generator);
criterion_main!(benches);
