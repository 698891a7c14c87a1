//! Median and convolution filters, hosted by the invariant transformer.
//!
//! Both look at the window of samples around the source pixel the coordinate falls in, so under
//! the invariant transformer each output pixel is computed from its own neighbourhood.

use super::Reconstructer;
use crate::error::{PipelineError, Result};
use crate::pipeline::{Capability, Label, Parameter, PassContext};
use crate::raster::SourceView;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Largest supported convolution kernel side.
pub const MAX_FILTER_SIZE: usize = 9;

/// Window of a median filter, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedianWindow {
    pub width: u32,
    pub height: u32,
}

impl MedianWindow {
    pub fn square(size: u32) -> Self {
        MedianWindow {
            width: size,
            height: size,
        }
    }
}

/// Named square convolution kernel; `coefficients[row][col]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvolutionKernel {
    pub name: String,
    pub coefficients: Vec<Vec<i32>>,
}

impl ConvolutionKernel {
    pub fn gaussian() -> Self {
        ConvolutionKernel {
            name: "Gaussian filtering".to_string(),
            coefficients: vec![vec![1, 2, 1], vec![2, 4, 2], vec![1, 2, 1]],
        }
    }

    /// Laplacian sharpening, `5 f(i, j)` minus the four direct neighbours.
    pub fn sharpening() -> Self {
        ConvolutionKernel {
            name: "Sharpening".to_string(),
            coefficients: vec![vec![0, -1, 0], vec![-1, 5, -1], vec![0, -1, 0]],
        }
    }

    pub fn size(&self) -> usize {
        self.coefficients.len()
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let size = self.size();
        if size == 0 || size > MAX_FILTER_SIZE {
            return Err(format!(
                "kernel size {size} outside 1..={MAX_FILTER_SIZE}"
            ));
        }
        if self.coefficients.iter().any(|row| row.len() != size) {
            return Err(format!("kernel '{}' is not square", self.name));
        }
        Ok(())
    }
}

/// Median of the in-image samples of a window.
#[derive(Debug, Default)]
pub struct MedianFilter {
    window: Option<MedianWindow>,
    half: (i64, i64),
    scratch: Vec<f64>,
}

impl MedianFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Capability for MedianFilter {
    fn name(&self) -> &'static str {
        "Median filtering"
    }

    fn cleanup(&mut self) -> Result<()> {
        self.scratch = Vec::new();
        self.window = None;
        Ok(())
    }
}

impl Reconstructer for MedianFilter {
    fn setup(&mut self, pass: &PassContext<'_>) -> Result<Option<Label>> {
        let window = match &pass.config.parameter {
            Parameter::Window(w) => *w,
            other => {
                return Err(PipelineError::invalid(
                    self.name(),
                    format!("expected a window, got {other:?}"),
                ))
            }
        };
        if window.width == 0 || window.height == 0 {
            return Err(PipelineError::invalid(
                self.name(),
                format!("empty {}x{} window", window.width, window.height),
            ));
        }
        if window.width as usize > MAX_FILTER_SIZE || window.height as usize > MAX_FILTER_SIZE {
            return Err(PipelineError::invalid(
                self.name(),
                format!(
                    "{}x{} window exceeds {MAX_FILTER_SIZE}x{MAX_FILTER_SIZE}",
                    window.width, window.height
                ),
            ));
        }
        self.half = ((window.width / 2) as i64, (window.height / 2) as i64);
        self.scratch = Vec::with_capacity(window.width as usize * window.height as usize);
        self.window = Some(window);
        Ok(Some(Label::new(
            format!("{}x{} Median Filtering", window.width, window.height),
            format!("_{}x{}_median_filter", window.width, window.height),
        )))
    }

    fn reconstruct(
        &mut self,
        source: &SourceView<'_>,
        _rng: &mut dyn RngCore,
        x: f64,
        y: f64,
        channel: usize,
    ) -> f64 {
        let Some(window) = self.window else {
            return 0.0;
        };
        let (cx, cy) = (x as i64 - self.half.0, y as i64 - self.half.1);
        self.scratch.clear();
        for dx in 0..window.width as i64 {
            for dy in 0..window.height as i64 {
                let (col, row) = (cx + dx, cy + dy);
                // Border samples are left out, never mirrored.
                if source.contains(col, row) {
                    self.scratch.push(source.sample(col, row, channel));
                }
            }
        }
        if self.scratch.is_empty() {
            return 0.0;
        }
        self.scratch.sort_by(f64::total_cmp);
        self.scratch[self.scratch.len() / 2]
    }
}

/// Normalised convolution with one uniform dither draw per sample.
#[derive(Debug, Default)]
pub struct ConvolutionFilter {
    kernel: Option<ConvolutionKernel>,
    sum: i64,
    half: i64,
}

impl ConvolutionFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Capability for ConvolutionFilter {
    fn name(&self) -> &'static str {
        "Convolution filter"
    }

    fn cleanup(&mut self) -> Result<()> {
        self.kernel = None;
        Ok(())
    }
}

impl Reconstructer for ConvolutionFilter {
    fn setup(&mut self, pass: &PassContext<'_>) -> Result<Option<Label>> {
        let kernel = match &pass.config.parameter {
            Parameter::Kernel(k) => k.clone(),
            other => {
                return Err(PipelineError::invalid(
                    self.name(),
                    format!("expected a convolution kernel, got {other:?}"),
                ))
            }
        };
        kernel
            .validate()
            .map_err(|reason| PipelineError::invalid(self.name(), reason))?;
        let size = kernel.size();
        self.sum = kernel.coefficients.iter().flatten().map(|c| *c as i64).sum();
        self.half = (size / 2) as i64;
        let label = Label::new(
            format!("{} {size}x{size}", kernel.name),
            format!("_{}_{size}_{size}", kernel.name),
        );
        self.kernel = Some(kernel);
        Ok(Some(label))
    }

    fn reconstruct(
        &mut self,
        source: &SourceView<'_>,
        rng: &mut dyn RngCore,
        x: f64,
        y: f64,
        channel: usize,
    ) -> f64 {
        let Some(kernel) = &self.kernel else {
            return 0.0;
        };
        let (cx, cy) = (x as i64 - self.half, y as i64 - self.half);
        let mut value = 0.0;
        for (dy, row) in kernel.coefficients.iter().enumerate() {
            for (dx, c) in row.iter().enumerate() {
                value += *c as f64 * source.sample(cx + dx as i64, cy + dy as i64, channel);
            }
        }
        if self.sum != 0 {
            value /= self.sum as f64;
        }
        value + rng.gen::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{BorderPolicy, Image};
    use rand::SeedableRng;

    #[test]
    fn test_median_picks_middle_of_in_image_samples() {
        let img = Image::from_raw(3, 3, 1, 255, vec![9, 1, 8, 2, 7, 3, 6, 4, 5]).unwrap();
        let view = SourceView::new(&img, (0, 0), BorderPolicy::Zero);
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0);
        let mut filter = MedianFilter::new();
        filter.window = Some(MedianWindow::square(3));
        filter.half = (1, 1);
        assert_eq!(filter.reconstruct(&view, &mut rng, 1.5, 1.5, 0), 5.0);
        // Corner: only 9, 1, 2, 7 are inside, sorted 1 2 7 9.
        assert_eq!(filter.reconstruct(&view, &mut rng, 0.5, 0.5, 0), 7.0);
    }

    #[test]
    fn test_kernel_validation() {
        assert!(ConvolutionKernel::gaussian().validate().is_ok());
        let empty = ConvolutionKernel {
            name: "empty".into(),
            coefficients: vec![],
        };
        assert!(empty.validate().is_err());
        let ragged = ConvolutionKernel {
            name: "ragged".into(),
            coefficients: vec![vec![1, 2], vec![1]],
        };
        assert!(ragged.validate().is_err());
    }

    #[test]
    fn test_convolution_normalises_and_dithers() {
        let img = Image::from_raw(3, 3, 1, 255, vec![100; 9]).unwrap();
        let view = SourceView::new(&img, (0, 0), BorderPolicy::Mirror);
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0);
        let mut filter = ConvolutionFilter::new();
        filter.kernel = Some(ConvolutionKernel::gaussian());
        filter.sum = 16;
        filter.half = 1;
        let v = filter.reconstruct(&view, &mut rng, 0.5, 0.5, 0);
        assert!((100.0..101.0).contains(&v), "{v}");
    }
}
