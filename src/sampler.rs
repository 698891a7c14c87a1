//! Samplers drive the per-pixel loop and write the destination image.
//!
//! Both samplers visit pixels column by column, each column top to bottom, channels innermost.
//! That order fixes the sequence of random draws a pass consumes, which replay depends on.

use crate::error::{PipelineError, Result};
use crate::pipeline::{Capability, PassContext};
use crate::raster::{Image, SourceView};
use crate::reconstruct::Reconstructer;
use crate::transform::Transformer;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Round to the nearest integer and clamp to `0..=max`.
pub fn quantise(value: f64, max: u8) -> u8 {
    // NaN saturates to zero in the cast.
    value.round().clamp(0.0, max as f64) as u8
}

/// Output generation strategy.
pub trait Sampler: Capability {
    fn setup(&mut self, _pass: &PassContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Fill every sample of `destination`.
    fn sample(
        &mut self,
        reconstructer: &mut dyn Reconstructer,
        transformer: &mut dyn Transformer,
        source: &SourceView<'_>,
        destination: &mut Image,
        rng: &mut dyn RngCore,
    );
}

/// Selects a sampler for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerId {
    #[default]
    Point,
    Super,
}

impl SamplerId {
    pub fn build(self) -> Box<dyn Sampler> {
        match self {
            SamplerId::Point => Box::new(PointSampler),
            SamplerId::Super => Box::new(SuperSampler::default()),
        }
    }
}

/// One evaluation at each destination pixel center.
#[derive(Debug, Default)]
pub struct PointSampler;

impl Capability for PointSampler {
    fn name(&self) -> &'static str {
        "Point sampler"
    }
}

impl Sampler for PointSampler {
    fn sample(
        &mut self,
        reconstructer: &mut dyn Reconstructer,
        transformer: &mut dyn Transformer,
        source: &SourceView<'_>,
        destination: &mut Image,
        rng: &mut dyn RngCore,
    ) {
        let max = destination.max();
        for col in 0..destination.width() {
            for row in 0..destination.height() {
                let (x, y) = (col as f64 + 0.5, row as f64 + 0.5);
                for channel in 0..destination.depth() {
                    let v = transformer.transform(reconstructer, source, rng, x, y, channel);
                    destination.set(col, row, channel, quantise(v, max));
                }
            }
        }
    }
}

/// Average of a regular grid of evaluations inside each destination pixel.
#[derive(Debug)]
pub struct SuperSampler {
    grid: (u32, u32),
}

/// Grid used when a pass does not configure one.
pub const DEFAULT_SUPERSAMPLE: (u32, u32) = (2, 2);

impl Default for SuperSampler {
    fn default() -> Self {
        SuperSampler {
            grid: DEFAULT_SUPERSAMPLE,
        }
    }
}

impl Capability for SuperSampler {
    fn name(&self) -> &'static str {
        "Super sampler"
    }

    fn describe(&self) -> String {
        format!("Super sampler {}x{}", self.grid.0, self.grid.1)
    }
}

impl Sampler for SuperSampler {
    fn setup(&mut self, pass: &PassContext<'_>) -> Result<()> {
        let (nx, ny) = pass.config.supersample;
        if nx == 0 || ny == 0 {
            return Err(PipelineError::invalid(
                self.name(),
                format!("empty {nx}x{ny} grid"),
            ));
        }
        self.grid = (nx, ny);
        Ok(())
    }

    fn sample(
        &mut self,
        reconstructer: &mut dyn Reconstructer,
        transformer: &mut dyn Transformer,
        source: &SourceView<'_>,
        destination: &mut Image,
        rng: &mut dyn RngCore,
    ) {
        let max = destination.max();
        let (nx, ny) = self.grid;
        let count = (nx * ny) as f64;
        for col in 0..destination.width() {
            for row in 0..destination.height() {
                for channel in 0..destination.depth() {
                    let mut sum = 0.0;
                    for i in 0..nx {
                        for j in 0..ny {
                            let x = col as f64 + (i as f64 + 0.5) / nx as f64;
                            let y = row as f64 + (j as f64 + 0.5) / ny as f64;
                            sum += transformer.transform(reconstructer, source, rng, x, y, channel);
                        }
                    }
                    destination.set(col, row, channel, quantise(sum / count, max));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantise() {
        assert_eq!(quantise(-3.0, 255), 0);
        assert_eq!(quantise(254.5, 255), 255);
        assert_eq!(quantise(300.0, 255), 255);
        assert_eq!(quantise(12.49, 255), 12);
        assert_eq!(quantise(200.0, 100), 100);
        assert_eq!(quantise(f64::NAN, 255), 0);
    }
}
