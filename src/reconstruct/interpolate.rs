//! Separable polynomial interpolation kernels.
//!
//! Every kernel here evaluates a small square patch of source samples and weighs them with one
//! set of coefficients per axis. The patch is positioned relative to `x - 0.5`, because sample
//! `n` sits at continuous coordinate `n + 0.5`.

use super::{definitions, Reconstructer};
use crate::error::{PipelineError, Result};
use crate::pipeline::{Capability, Label, PassContext};
use crate::raster::SourceView;
use rand::RngCore;

const SIXTH: f64 = 1.0 / 6.0;
const THIRD: f64 = 1.0 / 3.0;

/// Coefficients of the quadratic family, blended by the continuity parameter.
///
/// A parameter of 1 yields the interpolating quadratic, 0.5 the approximating one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticBasis {
    parameter: f64,
    q0: f64,
    q1: f64,
    q2: f64,
}

impl QuadraticBasis {
    pub const INTERPOLATING: QuadraticBasis = QuadraticBasis {
        parameter: 1.0,
        q0: 0.0,
        q1: 1.0,
        q2: -2.0,
    };

    pub const APPROXIMATING: QuadraticBasis = QuadraticBasis {
        parameter: 0.5,
        q0: 0.125,
        q1: 0.75,
        q2: -1.0,
    };

    pub fn new(parameter: f64) -> Self {
        QuadraticBasis {
            parameter,
            q0: 0.25 * (1.0 - parameter),
            q1: 0.5 * (1.0 + parameter),
            q2: -2.0 * parameter,
        }
    }

    pub fn parameter(&self) -> f64 {
        self.parameter
    }

    /// Weights of the samples at `col - 1`, `col` and `col + 1`, for `t` in `[-0.5, 0.5]`.
    pub fn weights(&self, t: f64) -> [f64; 3] {
        [
            self.q0 + t * (-0.5 + self.parameter * t),
            self.q1 + self.q2 * t * t,
            self.q0 + t * (0.5 + self.parameter * t),
        ]
    }
}

/// The polynomial kernels an [`Interpolator`] can evaluate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    Nearest,
    Linear,
    Overhauser,
    TwoPointCubic,
    BSpline,
    Quadratic(QuadraticBasis),
    /// Ignores the source entirely and returns zero.
    Null,
}

fn overhauser(t: f64) -> [f64; 4] {
    let s1 = t + 1.0;
    let s_1 = t - 1.0;
    let s_2 = t - 2.0;
    [
        2.0 + s1 * (-4.0 + s1 * (2.5 - 0.5 * s1)),
        1.0 + t * t * (-2.5 + 1.5 * t),
        1.0 + s_1 * s_1 * (-2.5 - 1.5 * s_1),
        2.0 + s_2 * (4.0 + s_2 * (2.5 + 0.5 * s_2)),
    ]
}

fn bspline(t: f64) -> [f64; 4] {
    [
        SIXTH + t * (-0.5 + t * (0.5 - t * SIXTH)),
        2.0 * THIRD + t * t * (-1.0 + t * 0.5),
        SIXTH + t * (0.5 + t * (0.5 - t * 0.5)),
        t * t * t * SIXTH,
    ]
}

fn linear(t: f64) -> [f64; 2] {
    [1.0 - t, t]
}

fn two_point_cubic(t: f64) -> [f64; 2] {
    [1.0 + t * t * (-3.0 + 2.0 * t), t * t * (3.0 - 2.0 * t)]
}

/// First tap and weights of a kernel reaching `before` samples behind the cell holding `coordinate`.
fn floor_taps<const N: usize>(
    coordinate: f64,
    before: i64,
    weights: fn(f64) -> [f64; N],
) -> (i64, [f64; N]) {
    let shifted = coordinate - 0.5;
    let cell = shifted.floor();
    (cell as i64 - before, weights(shifted - cell))
}

fn quadratic_taps(basis: &QuadraticBasis, coordinate: f64) -> (i64, [f64; 3]) {
    let shifted = coordinate - 0.5;
    // f64::round rounds half away from zero, the cell whose center is nearest.
    let cell = shifted.round();
    (cell as i64 - 1, basis.weights(shifted - cell))
}

impl Kernel {
    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Nearest => "Nearest-neighbour",
            Kernel::Linear => "Linear interpolation",
            Kernel::Overhauser => "Overhauser cubic interpolation",
            Kernel::TwoPointCubic => "Two point cubic interpolation",
            Kernel::BSpline => "Approximating cubic B-spline",
            Kernel::Quadratic(b) if *b == QuadraticBasis::INTERPOLATING => "Interpolating quadratic",
            Kernel::Quadratic(b) if *b == QuadraticBasis::APPROXIMATING => "Approximating quadratic",
            Kernel::Quadratic(_) => "General quadratic",
            Kernel::Null => "Null reconstructor",
        }
    }
}

fn weigh<const N: usize>(
    source: &SourceView<'_>,
    (col, wx): (i64, [f64; N]),
    (row, wy): (i64, [f64; N]),
    channel: usize,
) -> f64 {
    wy.iter()
        .enumerate()
        .map(|(j, wj)| {
            let r = row + j as i64;
            wx.iter()
                .enumerate()
                .map(|(i, wi)| source.sample(col + i as i64, r, channel) * wi)
                .sum::<f64>()
                * wj
        })
        .sum()
}

/// Reconstructer evaluating one of the polynomial [`Kernel`]s.
#[derive(Debug, Clone)]
pub struct Interpolator {
    kernel: Kernel,
    /// Reads its continuity parameter from the pass configuration.
    general: bool,
}

impl Interpolator {
    pub fn new(kernel: Kernel) -> Self {
        Interpolator {
            kernel,
            general: false,
        }
    }

    /// The general quadratic, starting from the process wide basis.
    pub fn general_quadratic() -> Self {
        Interpolator {
            kernel: Kernel::Quadratic(definitions().quadratic),
            general: true,
        }
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }
}

impl Capability for Interpolator {
    fn name(&self) -> &'static str {
        if self.general {
            "General quadratic"
        } else {
            self.kernel.name()
        }
    }

    fn describe(&self) -> String {
        match self.kernel {
            Kernel::Quadratic(basis) if self.general => format!(
                "Quadratic reconstruction; parameter ={:7.4}",
                basis.parameter()
            ),
            _ => self.name().to_string(),
        }
    }
}

impl Reconstructer for Interpolator {
    fn setup(&mut self, pass: &PassContext<'_>) -> Result<Option<Label>> {
        if self.general {
            let parameter = pass.config.quadratic_parameter;
            if !parameter.is_finite() {
                return Err(PipelineError::invalid(
                    self.name(),
                    format!("quadratic parameter {parameter} is not finite"),
                ));
            }
            self.kernel = Kernel::Quadratic(QuadraticBasis::new(parameter));
        }
        Ok(None)
    }

    fn reconstruct(
        &mut self,
        source: &SourceView<'_>,
        _rng: &mut dyn RngCore,
        x: f64,
        y: f64,
        channel: usize,
    ) -> f64 {
        match self.kernel {
            Kernel::Null => 0.0,
            Kernel::Nearest => source.sample(x.floor() as i64, y.floor() as i64, channel),
            Kernel::Linear => weigh(
                source,
                floor_taps(x, 0, linear),
                floor_taps(y, 0, linear),
                channel,
            ),
            Kernel::TwoPointCubic => weigh(
                source,
                floor_taps(x, 0, two_point_cubic),
                floor_taps(y, 0, two_point_cubic),
                channel,
            ),
            Kernel::Overhauser => weigh(
                source,
                floor_taps(x, 1, overhauser),
                floor_taps(y, 1, overhauser),
                channel,
            ),
            Kernel::BSpline => weigh(
                source,
                floor_taps(x, 1, bspline),
                floor_taps(y, 1, bspline),
                channel,
            ),
            Kernel::Quadratic(basis) => weigh(
                source,
                quadratic_taps(&basis, x),
                quadratic_taps(&basis, y),
                channel,
            ),
        }
    }
}
