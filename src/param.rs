//! `ParamWithRange`: the composite amp/freq parameter type shared by every
//! oscillating operator.
//!
//! Grounded in the teacher's `ModulatedParam`/`ParamRange` pair
//! (`port.rs`), generalized from a single base+cv+attenuverter composition
//! into the spec's two-list (value-range + additive) composition over a
//! [`crate::line::Line`] pair.

use crate::line::Line;

/// An immutable, Program-owned list of operator ids. A shared empty list
/// stands in for "no modulators" so most `ParamWithRange` instances don't
/// need their own allocation, mirroring the teacher's preference for
/// zero-cost defaults on hot-path structs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModulatorList(pub Vec<u32>);

impl ModulatorList {
    pub fn blank() -> Self {
        ModulatorList(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> &[u32] {
        &self.0
    }
}

/// A composite parameter: a main trajectory (`par`), an optional
/// second-boundary trajectory (`r_par`) used for value-range modulation,
/// and two modulator lists (value-range `r_mods`, additive `mods`).
#[derive(Debug, Clone)]
pub struct ParamWithRange {
    pub par: Line,
    pub r_par: Line,
    pub mods: ModulatorList,
    pub r_mods: ModulatorList,
}

impl ParamWithRange {
    pub fn constant(value: f64) -> Self {
        ParamWithRange {
            par: Line::constant(value),
            r_par: Line::constant(value),
            mods: ModulatorList::blank(),
            r_mods: ModulatorList::blank(),
        }
    }

    /// Per-block evaluation, following the teacher's buffer-out-parameter
    /// style rather than returning an owned `Vec` on the hot path.
    ///
    /// `mod_eval` evaluates one modulator operator's output into `mod_buf`
    /// (wave-env mode for `r_mods`, plain additive mode for `mods`); it is
    /// injected rather than called directly so this module stays free of a
    /// dependency on `crate::operator` (which itself depends on
    /// `ParamWithRange`).
    pub fn eval(
        &mut self,
        par_buf: &mut [f64],
        param_mulbuf: Option<&[f64]>,
        mut mod_eval: impl FnMut(u32, &mut [f64], bool),
    ) {
        self.par.run(par_buf, param_mulbuf);

        if !self.r_mods.is_empty() {
            let len = par_buf.len();
            let mut r_par_buf = vec![0.0; len];
            self.r_par.run(&mut r_par_buf, param_mulbuf);

            let mut mod_buf = vec![0.0; len];
            for &id in self.r_mods.ids() {
                mod_eval(id, &mut mod_buf, true);
            }
            for i in 0..len {
                par_buf[i] += (r_par_buf[i] - par_buf[i]) * mod_buf[i];
            }
        } else {
            self.r_par.skip(par_buf.len() as u32);
        }

        for &id in self.mods.ids() {
            mod_eval(id, par_buf, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_no_modulators_output_equals_main_line() {
        let mut p = ParamWithRange::constant(0.75);
        let mut buf = [0.0; 8];
        p.eval(&mut buf, None, |_, _, _| {});
        assert!(buf.iter().all(|&v| v == 0.75));
    }

    #[test]
    fn value_range_mods_interpolate_toward_r_par() {
        let mut p = ParamWithRange::constant(0.0);
        p.r_par = Line::constant(1.0);
        p.r_mods = ModulatorList(vec![1]);
        let mut buf = [0.0; 4];
        p.eval(&mut buf, None, |_, out, wave_env| {
            assert!(wave_env);
            out.iter_mut().for_each(|v| *v = 0.5);
        });
        assert!(buf.iter().all(|&v| (v - 0.5).abs() < 1e-9));
    }

    #[test]
    fn additive_mods_sum_into_par_buf() {
        let mut p = ParamWithRange::constant(1.0);
        p.mods = ModulatorList(vec![2]);
        let mut buf = [0.0; 4];
        p.eval(&mut buf, None, |_, out, wave_env| {
            assert!(!wave_env);
            out.iter_mut().for_each(|v| *v += 0.25);
        });
        assert!(buf.iter().all(|&v| (v - 1.25).abs() < 1e-9));
    }

    #[test]
    fn empty_r_mods_preserves_r_par_trajectory_position_via_skip() {
        let mut p = ParamWithRange::constant(0.0);
        p.r_par = Line::sweep(0.0, 1.0, 100, crate::line::Shape::Lin);
        let mut buf = [0.0; 10];
        p.eval(&mut buf, None, |_, _, _| {});
        assert_eq!(p.r_par.pos, 10);
    }
}
