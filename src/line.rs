//! Value trajectories ("lines"): the shape primitive shared by every
//! parameter sweep, random-segment render, and envelope in this crate.
//!
//! Grounded in the teacher's `Adsr::cv_to_time` exponential-mapping idiom
//! (`modules.rs`) generalized from a single fixed envelope shape to the
//! seven shapes a `Line` can take, and in `graph.rs`'s bitflag-on-a-struct
//! pattern (`PatchError`/`ValidationMode`) for the flag bits below.

/// `v0` holds a meaningful starting value (vs. an unset default).
pub const STATE: u8 = 1 << 0;
/// `v0` is a modulator-to-carrier ratio rather than an absolute value.
pub const STATE_RATIO: u8 = 1 << 1;
/// The trajectory is active: advance `pos` toward `end`.
pub const GOAL: u8 = 1 << 2;
/// `vt` is a ratio rather than an absolute value.
pub const GOAL_RATIO: u8 = 1 << 3;
/// `shape` holds a meaningful value (vs. inheriting the previous one).
pub const TYPE: u8 = 1 << 4;
/// `end` (and thus `time_ms`) holds a meaningful value.
pub const TIME: u8 = 1 << 5;
/// Adopt the incoming `time_ms` only if one is not already set.
pub const TIME_IF_NEW: u8 = 1 << 6;

/// Per-`Line` state flags, a plain bitmask over the constants above rather
/// than a dedicated flags-crate type, matching this codebase's habit of
/// keeping small state bitmasks as bare integers (see `mode` on `Program`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineFlags(pub u8);

impl LineFlags {
    #[inline]
    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit == bit
    }

    #[inline]
    pub fn insert(&mut self, bit: u8) {
        self.0 |= bit;
    }

    #[inline]
    pub fn remove(&mut self, bits: u8) {
        self.0 &= !bits;
    }

    #[inline]
    pub fn set(&mut self, bit: u8, value: bool) {
        if value {
            self.insert(bit);
        } else {
            self.remove(bit);
        }
    }
}

impl core::ops::BitOr for LineFlags {
    type Output = LineFlags;
    fn bitor(self, rhs: LineFlags) -> LineFlags {
        LineFlags(self.0 | rhs.0)
    }
}

impl From<u8> for LineFlags {
    fn from(bits: u8) -> Self {
        LineFlags(bits)
    }
}

/// Line shape identifiers. Shapes share the `t = pos/end` parameterization
/// described in the module doc comment of each `eval_*` function below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Sample and hold: `v0` until `t == 1`, then `vt`.
    Sah,
    /// Linear interpolation.
    Lin,
    /// Raised-cosine interpolation.
    Cos,
    /// Exponential-style rise (steep early).
    Exp,
    /// Logarithmic-style rise (steep late).
    Log,
    /// Rises like `Log`, falls like `Exp` (capacitor-charge envelope).
    Xpe,
    /// Rises like `Exp`, falls like `Log`.
    Lge,
}

/// A value trajectory from `v0` to `vt` over `end` samples, currently at `pos`.
#[derive(Debug, Clone, Copy)]
pub struct Line {
    pub v0: f64,
    pub vt: f64,
    pub pos: u32,
    pub end: u32,
    pub shape: Shape,
    pub flags: LineFlags,
}

impl Line {
    /// A Line holding a constant value, with no active trajectory.
    pub fn constant(v: f64) -> Self {
        Line {
            v0: v,
            vt: v,
            pos: 0,
            end: 0,
            shape: Shape::Lin,
            flags: LineFlags(STATE),
        }
    }

    /// A Line sweeping from `v0` to `vt` over `end` samples using `shape`.
    pub fn sweep(v0: f64, vt: f64, end: u32, shape: Shape) -> Self {
        debug_assert!(end > 0, "a GOAL line must have end > 0");
        Line {
            v0,
            vt,
            pos: 0,
            end,
            shape,
            flags: LineFlags(STATE | GOAL | TYPE | TIME),
        }
    }

    fn eval_at(&self, t: f64) -> f64 {
        let (v0, vt) = (self.v0, self.vt);
        match self.shape {
            Shape::Sah => {
                if t >= 1.0 {
                    vt
                } else {
                    v0
                }
            }
            Shape::Lin => v0 + (vt - v0) * t,
            Shape::Cos => v0 + (vt - v0) * (1.0 - (core::f64::consts::PI * t).cos()) * 0.5,
            Shape::Exp => v0 + (vt - v0) * exp_shape(t),
            Shape::Log => v0 + (vt - v0) * log_shape(t),
            Shape::Xpe => v0 + (vt - v0) * log_shape(t),
            Shape::Lge => v0 + (vt - v0) * exp_shape(t),
        }
    }

    /// Advance `pos` by `n` samples (saturating at `end`), finalizing the
    /// trajectory if `end` is reached.
    fn advance(&mut self, n: u32) {
        let new_pos = self.pos.saturating_add(n);
        if self.flags.contains(GOAL) && new_pos >= self.end {
            self.pos = self.end;
            self.v0 = self.vt;
            self.flags.remove(GOAL | TIME);
        } else {
            self.pos = new_pos;
        }
    }

    /// **run** mode: fill exactly `buf.len()` samples, optionally scaled by
    /// `mulbuf` element-wise. If the trajectory is inactive, the constant
    /// `v0` (times `mulbuf`) is written throughout.
    pub fn run(&mut self, buf: &mut [f64], mulbuf: Option<&[f64]>) {
        let len = buf.len() as u32;
        if !self.flags.contains(GOAL) {
            for (i, out) in buf.iter_mut().enumerate() {
                let m = mulbuf.map_or(1.0, |m| m[i]);
                *out = self.v0 * m;
            }
            return;
        }

        let remaining = self.end - self.pos;
        let active = remaining.min(len) as usize;
        for i in 0..active {
            let t = ((self.pos + i as u32) as f64 / self.end as f64).clamp(0.0, 1.0);
            let m = mulbuf.map_or(1.0, |m| m[i]);
            buf[i] = self.eval_at(t) * m;
        }
        self.advance(active as u32);

        // If the trajectory finished partway through the block, the tail
        // holds the now-constant v0.
        if active < buf.len() {
            let tail_v0 = self.v0;
            for (i, out) in buf.iter_mut().enumerate().skip(active) {
                let m = mulbuf.map_or(1.0, |m| m[i]);
                *out = tail_v0 * m;
            }
        }
    }

    /// **get** mode: fill up to the remaining trajectory time, returning the
    /// number of samples actually filled.
    pub fn get(&mut self, buf: &mut [f64]) -> usize {
        if !self.flags.contains(GOAL) {
            return 0;
        }
        let remaining = (self.end - self.pos) as usize;
        let n = remaining.min(buf.len());
        for (i, out) in buf.iter_mut().enumerate().take(n) {
            let t = ((self.pos + i as u32) as f64 / self.end as f64).clamp(0.0, 1.0);
            *out = self.eval_at(t);
        }
        self.advance(n as u32);
        n
    }

    /// **skip** mode: advance `pos` by `skip_len` without writing, applying
    /// the same end-of-trajectory finalization as `run`/`get`.
    pub fn skip(&mut self, skip_len: u32) {
        if self.flags.contains(GOAL) {
            self.advance(skip_len);
        }
    }

    /// Whether the trajectory has reached its end (or was never active).
    pub fn is_finished(&self) -> bool {
        !self.flags.contains(GOAL)
    }

    /// Apply `copy` semantics: `other` is a newly-assigned Line overwriting
    /// `self`; only fields flagged in `other.flags` actually transfer, and
    /// `TIME_IF_NEW` keeps the existing timing if one is already set.
    pub fn copy_from(&mut self, other: &Line) {
        if other.flags.contains(STATE) {
            self.v0 = other.v0;
            self.flags.set(STATE_RATIO, other.flags.contains(STATE_RATIO));
        }
        if other.flags.contains(GOAL) {
            self.vt = other.vt;
            self.flags.set(GOAL_RATIO, other.flags.contains(GOAL_RATIO));
            self.flags.insert(GOAL);
        }
        if other.flags.contains(TYPE) {
            self.shape = other.shape;
        }
        let adopt_time = if other.flags.contains(TIME_IF_NEW) {
            !self.flags.contains(TIME)
        } else {
            other.flags.contains(TIME)
        };
        if adopt_time {
            self.end = other.end;
            self.pos = 0;
            self.flags.insert(TIME);
        }
    }
}

/// Monotonic, endpoint-matching approximation of a capacitor-charge rise
/// (steep early, flattening toward `t = 1`). Coefficients chosen so that
/// `f(0) == 0`, `f(1) == 1`, `f` is strictly increasing and concave.
fn exp_shape(t: f64) -> f64 {
    const G: f64 = 3.0;
    (libm::exp(G * t) - 1.0) / (libm::exp(G) - 1.0)
}

/// Mirror image of [`exp_shape`] about the line `v = t` (steep late).
fn log_shape(t: f64) -> f64 {
    1.0 - exp_shape(1.0 - t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn constant_line_never_advances() {
        let mut l = Line::constant(0.5);
        let mut buf = [0.0; 8];
        l.run(&mut buf, None);
        assert!(buf.iter().all(|&v| v == 0.5));
        assert!(l.is_finished());
    }

    #[test]
    fn lin_sweep_reaches_endpoints() {
        let mut l = Line::sweep(0.0, 1.0, 4, Shape::Lin);
        let mut buf = [0.0; 4];
        l.run(&mut buf, None);
        assert_relative_eq!(buf[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(buf[3], 0.75, epsilon = 1e-9);
        assert!(l.is_finished());
        assert_eq!(l.v0, l.vt);
    }

    #[test]
    fn exp_and_log_are_monotonic_and_match_endpoints() {
        assert_relative_eq!(exp_shape(0.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(exp_shape(1.0), 1.0, epsilon = 1e-9);
        assert_relative_eq!(log_shape(0.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(log_shape(1.0), 1.0, epsilon = 1e-9);
        let mut prev = -1.0;
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            let v = exp_shape(t);
            assert!(v >= prev);
            prev = v;
        }
    }

    #[test]
    fn finalization_clears_goal_and_equalizes_endpoints() {
        let mut l = Line::sweep(0.0, 2.0, 2, Shape::Lin);
        let mut buf = [0.0; 2];
        l.run(&mut buf, None);
        assert!(!l.flags.contains(GOAL));
        assert_eq!(l.v0, 2.0);
    }

    #[test]
    fn run_and_skip_advance_pos_identically() {
        let mut a = Line::sweep(0.0, 1.0, 10, Shape::Lin);
        let mut b = a;
        let mut buf = [0.0; 4];
        a.run(&mut buf, None);
        b.skip(4);
        assert_eq!(a.pos, b.pos);
    }

    #[test]
    fn time_if_new_keeps_existing_timing() {
        let mut target = Line::sweep(0.0, 1.0, 100, Shape::Lin);
        let mut incoming = Line::constant(0.0);
        incoming.end = 50;
        incoming.flags.insert(TIME_IF_NEW);
        target.copy_from(&incoming);
        assert_eq!(target.end, 100);
    }
}
