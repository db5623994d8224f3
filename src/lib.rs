//! # sagen: a deterministic operator-graph audio generation runtime
//!
//! `sagen` renders a compiled [`Program`](program::Program) — a
//! time-ordered list of events that create and update signal-generating
//! *operators* connected through a nested modulation graph — into
//! interleaved 16-bit PCM. It is the runtime half of a synthesis engine: a
//! script parser and program builder (out of scope for this crate) produce
//! the `Program`; [`Generator`](generator::Generator) interprets it.
//!
//! ## Layout
//!
//! ```text
//! line      — value trajectories (the shape primitive)
//! wave      — wave tables and pre-integrated LUTs
//! phasor    — 32-bit and 64-bit phase/cycle accumulators
//! wosc      — anti-aliased wave oscillator (PILUT differentiation)
//! rasg      — random-segment generator
//! noise     — stateless noise variants
//! param     — composite amp/freq parameters (value-range + additive mods)
//! operator  — per-operator runtime state and the run_block evaluator
//! voice     — carrier + subgraph grouping, panning, duration
//! arena     — the fixed-length buffer pool run_block recursion slices into
//! program   — the immutable input format (events, operator/voice tables)
//! generator — the top-level driver: event loop, voice mixing, PCM output
//! rng       — seedable RNG and the stateless counter hash used by rasg/noise
//! error     — construction-time failure modes
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use sagen::generator::Generator;
//! use sagen::program::Program;
//!
//! let json = std::fs::read_to_string("program.json").unwrap();
//! let program = Program::from_json(&json).unwrap();
//! let mut gen = Generator::new(program, 44100.0).unwrap();
//!
//! let mut pcm = vec![0i16; 4096];
//! let (ongoing, out_len) = gen.run(&mut pcm, 2048, true);
//! let _ = (ongoing, out_len);
//! ```

pub mod arena;
pub mod error;
pub mod generator;
pub mod line;
pub mod noise;
pub mod operator;
pub mod param;
pub mod phasor;
pub mod program;
pub mod rasg;
pub mod rng;
pub mod voice;
pub mod wave;
pub mod wosc;

/// Convenience re-exports for the types most callers need.
pub mod prelude {
    pub use crate::error::GenError;
    pub use crate::generator::Generator;
    pub use crate::line::{Line, Shape};
    pub use crate::noise::{NoiseG, NoiseKind};
    pub use crate::operator::{Operator, OpKind};
    pub use crate::param::{ModulatorList, ParamWithRange};
    pub use crate::phasor::{Cyclor, Phasor};
    pub use crate::program::Program;
    pub use crate::rasg::{Mode as RasgMode, RasG};
    pub use crate::voice::Voice;
    pub use crate::wave::WaveKind;
    pub use crate::wosc::WOsc;
}

pub use prelude::*;
