//! Reconstructers turn the discrete source image into a continuous one.
//!
//! A reconstructer is asked for the value of one channel at a continuous source coordinate and
//! combines neighbouring samples to produce it. Besides the interpolation kernels this family
//! also hosts the median and convolution filters, which the invariant transformer drives as if
//! they were interpolators.

pub mod filter;
pub mod interpolate;
pub mod nyquist;

use crate::error::Result;
use crate::pipeline::{Capability, Label, PassContext};
use crate::raster::SourceView;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub use filter::{ConvolutionFilter, ConvolutionKernel, MedianFilter, MedianWindow};
pub use interpolate::{Interpolator, Kernel, QuadraticBasis};
pub use nyquist::{NyquistConfig, NyquistKernel, SincTable};

/// Continuity parameter of the general quadratic when none is configured; the interpolating basis.
pub const QUADRATIC_PARAMETER: f64 = 1.0;

/// Kernel constants shared by every pass of the process.
///
/// Built once, on first use, and never mutated afterwards.
#[derive(Debug)]
pub struct Definitions {
    pub sinc: SincTable,
    pub quadratic: QuadraticBasis,
}

impl Definitions {
    fn build() -> Self {
        Definitions {
            sinc: SincTable::new(nyquist::DEFAULT_CUTOFF),
            quadratic: QuadraticBasis::new(QUADRATIC_PARAMETER),
        }
    }
}

static DEFINITIONS: OnceLock<Definitions> = OnceLock::new();

/// The process wide kernel constants.
pub fn definitions() -> &'static Definitions {
    DEFINITIONS.get_or_init(Definitions::build)
}

/// Interpolation or filter kernel.
pub trait Reconstructer: Capability {
    /// Per-pass preparation. Filters parse their window or kernel here and may name the pass.
    fn setup(&mut self, _pass: &PassContext<'_>) -> Result<Option<Label>> {
        Ok(None)
    }

    /// Value of `channel` at the continuous source position `(x, y)`.
    fn reconstruct(
        &mut self,
        source: &SourceView<'_>,
        rng: &mut dyn RngCore,
        x: f64,
        y: f64,
        channel: usize,
    ) -> f64;
}

/// Selects a reconstructer for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructerId {
    NearestNeighbour,
    Linear,
    OverhauserCubic,
    TwoPointCubic,
    InterpolatingQuadratic,
    ApproximatingQuadratic,
    ApproximatingBSpline,
    GeneralQuadratic,
    Nyquist,
    MedianFilter,
    ConvolutionFilter,
    Null,
}

/// Reconstructer used by the geometric tests.
pub const DEFAULT_RECONSTRUCTER: ReconstructerId = ReconstructerId::InterpolatingQuadratic;

impl ReconstructerId {
    /// Instantiate a fresh reconstructer for one pass.
    pub fn build(self) -> Box<dyn Reconstructer> {
        match self {
            ReconstructerId::NearestNeighbour => Box::new(Interpolator::new(Kernel::Nearest)),
            ReconstructerId::Linear => Box::new(Interpolator::new(Kernel::Linear)),
            ReconstructerId::OverhauserCubic => Box::new(Interpolator::new(Kernel::Overhauser)),
            ReconstructerId::TwoPointCubic => Box::new(Interpolator::new(Kernel::TwoPointCubic)),
            ReconstructerId::ApproximatingBSpline => Box::new(Interpolator::new(Kernel::BSpline)),
            ReconstructerId::InterpolatingQuadratic => Box::new(Interpolator::new(
                Kernel::Quadratic(QuadraticBasis::INTERPOLATING),
            )),
            ReconstructerId::ApproximatingQuadratic => Box::new(Interpolator::new(
                Kernel::Quadratic(QuadraticBasis::APPROXIMATING),
            )),
            ReconstructerId::GeneralQuadratic => Box::new(Interpolator::general_quadratic()),
            ReconstructerId::Null => Box::new(Interpolator::new(Kernel::Null)),
            ReconstructerId::Nyquist => Box::new(NyquistKernel::new()),
            ReconstructerId::MedianFilter => Box::new(MedianFilter::new()),
            ReconstructerId::ConvolutionFilter => Box::new(ConvolutionFilter::new()),
        }
    }
}
