//! Windowed sinc reconstruction.
//!
//! The sinc function is tabulated once with [`SINC_RESOLUTION`] entries per unit distance, out
//! to the cutoff distance. Contributions beyond the cutoff are folded back into the table so the
//! truncated kernel keeps the energy of the full one.

use super::Reconstructer;
use crate::error::{PipelineError, Result};
use crate::pipeline::{Capability, Label, PassContext};
use crate::raster::SourceView;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::f64::consts::PI;

/// Table entries per unit distance.
pub const SINC_RESOLUTION: usize = 20;

/// Cutoff distance, in samples, of the process wide table.
pub const DEFAULT_CUTOFF: usize = 6;

/// Largest configurable cutoff distance.
pub const MAX_CUTOFF: usize = 64;

/// Smallest rolloff magnitude; the window widens as `cutoff / rolloff`.
pub const MIN_ROLLOFF: f64 = 0.1;

/// How far the folding reaches, in multiples of the cutoff.
const FOLD_EXTENT: usize = 100;

/// Tabulated, energy preserving sinc.
#[derive(Debug, Clone, PartialEq)]
pub struct SincTable {
    cutoff: usize,
    values: Vec<f64>,
}

fn sinc(x: f64) -> f64 {
    let px = PI * x;
    px.sin() / px
}

impl SincTable {
    pub fn new(cutoff: usize) -> Self {
        let span = cutoff * SINC_RESOLUTION;
        let mut values = vec![0.0; span + 1];
        values[0] = 1.0;

        // Walk inwards from far outside the cutoff, zig-zagging over the table so every far
        // sample lands on the entry it aliases to. Small values first for numerical stability.
        let resolution = SINC_RESOLUTION as f64;
        let mut i = span * FOLD_EXTENT;
        while i > 0 {
            for v in values.iter_mut().take(span) {
                if i == 0 {
                    break;
                }
                *v += sinc(i as f64 / resolution);
                i -= 1;
            }
            for v in values.iter_mut().skip(1).rev() {
                if i == 0 {
                    break;
                }
                *v += sinc(i as f64 / resolution);
                i -= 1;
            }
        }
        SincTable { cutoff, values }
    }

    pub fn cutoff(&self) -> usize {
        self.cutoff
    }

    /// Linearly interpolated table lookup; zero at and beyond the cutoff.
    pub fn sinc(&self, x: f64) -> f64 {
        let x = x.abs() * SINC_RESOLUTION as f64;
        let b = x as usize;
        if b >= self.cutoff * SINC_RESOLUTION {
            return 0.0;
        }
        let frac = x - b as f64;
        (1.0 - frac) * self.values[b] + frac * self.values[b + 1]
    }
}

/// Per-axis low-pass (or high-pass) configuration of the sinc kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NyquistConfig {
    /// Rolloff factors along x and y; a negative value selects the high-pass variant.
    pub rolloff: (f64, f64),
    /// Cutoff distance in samples.
    pub cutoff: usize,
}

impl Default for NyquistConfig {
    fn default() -> Self {
        NyquistConfig {
            rolloff: (1.0, 1.0),
            cutoff: DEFAULT_CUTOFF,
        }
    }
}

/// Weighting along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Axis {
    rolloff: f64,
    highpass: bool,
    window: i64,
}

impl Axis {
    fn new(rolloff: f64, cutoff: usize) -> Self {
        let highpass = rolloff < 0.0;
        let rolloff = rolloff.abs();
        Axis {
            rolloff,
            highpass,
            window: (cutoff as f64 / rolloff + 0.5) as i64,
        }
    }

    fn weight(&self, table: &SincTable, d: f64) -> f64 {
        let lowpass = table.sinc(d * self.rolloff) * self.rolloff;
        if self.highpass {
            table.sinc(d) - lowpass
        } else {
            lowpass
        }
    }
}

/// Sinc interpolation with a configurable cutoff and rolloff.
#[derive(Debug)]
pub struct NyquistKernel {
    table: Option<Cow<'static, SincTable>>,
    axes: (Axis, Axis),
}

impl NyquistKernel {
    pub fn new() -> Self {
        let config = NyquistConfig::default();
        NyquistKernel {
            table: None,
            axes: (
                Axis::new(config.rolloff.0, config.cutoff),
                Axis::new(config.rolloff.1, config.cutoff),
            ),
        }
    }
}

impl Default for NyquistKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Capability for NyquistKernel {
    fn name(&self) -> &'static str {
        "Nyquist interpolation"
    }

    fn cleanup(&mut self) -> Result<()> {
        self.table = None;
        Ok(())
    }
}

impl Reconstructer for NyquistKernel {
    fn setup(&mut self, pass: &PassContext<'_>) -> Result<Option<Label>> {
        let config = pass.config.nyquist;
        let (rx, ry) = config.rolloff;
        if config.cutoff == 0 || config.cutoff > MAX_CUTOFF {
            return Err(PipelineError::invalid(
                self.name(),
                format!("cutoff {} outside 1..={MAX_CUTOFF}", config.cutoff),
            ));
        }
        let usable = |r: f64| r.is_finite() && r.abs() >= MIN_ROLLOFF;
        if !(usable(rx) && usable(ry)) {
            return Err(PipelineError::invalid(
                self.name(),
                format!("rolloff ({rx}, {ry}) must be finite and at least {MIN_ROLLOFF} in size"),
            ));
        }
        self.axes = (Axis::new(rx, config.cutoff), Axis::new(ry, config.cutoff));
        let shared = &super::definitions().sinc;
        self.table = Some(if shared.cutoff() == config.cutoff {
            Cow::Borrowed(shared)
        } else {
            Cow::Owned(SincTable::new(config.cutoff))
        });
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
        let Some(table) = self.table.as_deref() else {
            return 0.0;
        };
        let (ax, ay) = self.axes;

        // Upper left sample of the patch holding (x, y), kept inside the image.
        let base = |v: f64, size: i64| ((v - 0.5).floor() as i64).min(size - 2).max(0);
        let (px, py) = (base(x, source.width()), base(y, source.height()));

        let mut value = 0.0;
        for l in (1 - ax.window)..=ax.window {
            let wx = ax.weight(table, (px + l) as f64 + 0.5 - x);
            for m in (1 - ay.window)..=ay.window {
                let wy = ay.weight(table, (py + m) as f64 + 0.5 - y);
                value += source.sample_mirrored(px + l, py + m, channel) * wx * wy;
            }
        }
        value
    }
}
