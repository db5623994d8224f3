//! `Program`: the immutable, externally-built input consumed by
//! [`crate::generator::Generator`].
//!
//! Grounded in the teacher's `PatchDef`/`ModuleDef`/`CableDef` serde trio
//! (`serialize.rs`), generalized from a dynamic node/cable graph description
//! into a flat, id-indexed event list — the program builder (out of scope)
//! is expected to have already resolved every reference, so `Program` is
//! pure data with no validation logic of its own beyond what
//! [`crate::generator::Generator::new`] checks at construction.

use serde::{Deserialize, Serialize};

use crate::line::Shape;
use crate::noise::NoiseKind;
use crate::rasg::Mode as RasgMode;
use crate::wave::WaveKind;

/// Global program flags.
pub mod mode_flags {
    /// Divide each voice's amplitude contribution by the active voice count.
    pub const AMP_DIV_VOICES: u32 = 1 << 0;
}

/// Operator type tag, resolved into a concrete [`crate::operator::OpKind`]
/// the first time an event initializes the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpType {
    AmpOnly,
    Noise,
    WaveOsc,
    RandomSeg,
}

/// A two-endpoint line specification, as carried on the wire rather than as
/// the runtime `Line` type (which also tracks live `pos`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LineSpec {
    pub v0: f64,
    pub vt: f64,
    pub time_ms: f64,
    pub shape: Shape,
    pub is_ratio: bool,
}

impl LineSpec {
    pub fn constant(v: f64) -> Self {
        LineSpec { v0: v, vt: v, time_ms: 0.0, shape: Shape::Lin, is_ratio: false }
    }
}

// `Shape`, `NoiseKind`, and `RasgMode` need to round-trip through JSON
// fixtures the same way `PatchDef`'s module/cable records do.
impl Serialize for Shape {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let name = match self {
            Shape::Sah => "sah",
            Shape::Lin => "lin",
            Shape::Cos => "cos",
            Shape::Exp => "exp",
            Shape::Log => "log",
            Shape::Xpe => "xpe",
            Shape::Lge => "lge",
        };
        s.serialize_str(name)
    }
}

impl<'de> Deserialize<'de> for Shape {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(match s.as_str() {
            "sah" => Shape::Sah,
            "lin" => Shape::Lin,
            "cos" => Shape::Cos,
            "exp" => Shape::Exp,
            "log" => Shape::Log,
            "xpe" => Shape::Xpe,
            "lge" => Shape::Lge,
            other => return Err(serde::de::Error::custom(format!("unknown line shape {other}"))),
        })
    }
}

impl Serialize for NoiseKind {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let name = match self {
            NoiseKind::White => "white",
            NoiseKind::Gauss => "gauss",
            NoiseKind::Binary => "binary",
            NoiseKind::Ternary => "ternary",
            NoiseKind::Red => "red",
            NoiseKind::Violet => "violet",
            NoiseKind::BinaryViolet => "binary_violet",
        };
        s.serialize_str(name)
    }
}

impl<'de> Deserialize<'de> for NoiseKind {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(match s.as_str() {
            "white" => NoiseKind::White,
            "gauss" => NoiseKind::Gauss,
            "binary" => NoiseKind::Binary,
            "ternary" => NoiseKind::Ternary,
            "red" => NoiseKind::Red,
            "violet" => NoiseKind::Violet,
            "binary_violet" => NoiseKind::BinaryViolet,
            other => return Err(serde::de::Error::custom(format!("unknown noise kind {other}"))),
        })
    }
}

impl Serialize for WaveKind {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let name = match self {
            WaveKind::Sin => "sin",
            WaveKind::Tri => "tri",
            WaveKind::Saw => "saw",
            WaveKind::Sqr => "sqr",
        };
        s.serialize_str(name)
    }
}

impl<'de> Deserialize<'de> for WaveKind {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(match s.as_str() {
            "sin" => WaveKind::Sin,
            "tri" => WaveKind::Tri,
            "saw" => WaveKind::Saw,
            "sqr" => WaveKind::Sqr,
            other => return Err(serde::de::Error::custom(format!("unknown wave kind {other}"))),
        })
    }
}

/// RasG mode, flattened to a wire-friendly tagged form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RasgModeSpec {
    Urand,
    Gauss,
    Bin { level: u8 },
    Tern,
    Fixed { level: u8 },
    Addrec { alpha: f64 },
}

impl From<RasgModeSpec> for RasgMode {
    fn from(spec: RasgModeSpec) -> Self {
        match spec {
            RasgModeSpec::Urand => RasgMode::Urand,
            RasgModeSpec::Gauss => RasgMode::Gauss,
            RasgModeSpec::Bin { level } => RasgMode::Bin { level },
            RasgModeSpec::Tern => RasgMode::Tern,
            RasgModeSpec::Fixed { level } => RasgMode::Fixed { level },
            RasgModeSpec::Addrec { alpha } => RasgMode::Addrec { alpha },
        }
    }
}

/// Bitmask of which `OperatorData` fields are set on a given update.
pub mod op_params {
    pub const TYPE: u32 = 1 << 0;
    pub const TIME: u32 = 1 << 1;
    pub const PHASE: u32 = 1 << 2;
    pub const MODE: u32 = 1 << 3;
    pub const SEED: u32 = 1 << 4;
    pub const AMP: u32 = 1 << 5;
    pub const AMP2: u32 = 1 << 6;
    pub const FREQ: u32 = 1 << 7;
    pub const FREQ2: u32 = 1 << 8;
    pub const PAN: u32 = 1 << 9;
    pub const PM_AMP: u32 = 1 << 10;
    pub const AMODS: u32 = 1 << 11;
    pub const RAMODS: u32 = 1 << 12;
    pub const FMODS: u32 = 1 << 13;
    pub const RFMODS: u32 = 1 << 14;
    pub const PMODS: u32 = 1 << 15;
    pub const FPMODS: u32 = 1 << 16;
}

/// `time` field flags: whether a duration is set, and whether it is the
/// implicit "inherit from carrier" duration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeSpec {
    pub ms: f64,
    pub set: bool,
    pub implicit: bool,
}

/// One operator's incremental update, carried by a [`ProgramEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorData {
    pub id: u32,
    pub params: u32,
    pub op_type: OpType,
    pub time: TimeSpec,
    pub phase: u32,
    pub wave: Option<WaveKind>,
    pub rasg_mode: Option<RasgModeSpec>,
    pub noise_kind: Option<NoiseKind>,
    pub seed: u32,
    pub amp: Option<LineSpec>,
    pub amp2: Option<LineSpec>,
    pub freq: Option<LineSpec>,
    pub freq2: Option<LineSpec>,
    pub pan: Option<LineSpec>,
    pub pm_amp: Option<LineSpec>,
    pub amods: Option<Vec<u32>>,
    pub ramods: Option<Vec<u32>>,
    pub fmods: Option<Vec<u32>>,
    pub rfmods: Option<Vec<u32>>,
    pub pmods: Option<Vec<u32>>,
    pub fpmods: Option<Vec<u32>>,
}

/// Voice-data portion of an event: assigns (or reassigns) a voice's carrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceData {
    pub carr_op_id: u32,
}

/// One scheduled event: a wait time plus zero or more operator updates and
/// an optional voice assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramEvent {
    pub wait_ms: f64,
    pub vo_id: Option<u32>,
    pub voice_data: Option<VoiceData>,
    pub op_data: Vec<OperatorData>,
}

/// The full, immutable program handed to a `Generator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub events: Vec<ProgramEvent>,
    pub vo_count: u32,
    pub op_count: u32,
    pub op_nest_depth: u32,
    pub mode: u32,
    pub ampmult: f64,
}

impl Program {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_program() -> Program {
        Program {
            events: Vec::new(),
            vo_count: 0,
            op_count: 0,
            op_nest_depth: 0,
            mode: 0,
            ampmult: 1.0,
        }
    }

    #[test]
    fn empty_program_round_trips_through_json() {
        let p = empty_program();
        let json = p.to_json().unwrap();
        let back = Program::from_json(&json).unwrap();
        assert_eq!(back.vo_count, p.vo_count);
        assert_eq!(back.ampmult, p.ampmult);
    }

    #[test]
    fn wave_kind_serializes_as_lowercase_name() {
        let json = serde_json::to_string(&WaveKind::Sin).unwrap();
        assert_eq!(json, "\"sin\"");
    }

    #[test]
    fn rasg_mode_spec_round_trips_with_fields() {
        let spec = RasgModeSpec::Bin { level: 7 };
        let json = serde_json::to_string(&spec).unwrap();
        let back: RasgModeSpec = serde_json::from_str(&json).unwrap();
        match back {
            RasgModeSpec::Bin { level } => assert_eq!(level, 7),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn amp_div_voices_flag_round_trips_in_mode_bitmask() {
        let mut p = empty_program();
        p.mode |= mode_flags::AMP_DIV_VOICES;
        let json = p.to_json().unwrap();
        let back = Program::from_json(&json).unwrap();
        assert_eq!(back.mode & mode_flags::AMP_DIV_VOICES, mode_flags::AMP_DIV_VOICES);
    }
}
