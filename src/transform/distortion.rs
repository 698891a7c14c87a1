//! The geometric distortion attack.
//!
//! The four image corners are moved by random amounts and the image is remapped bilinearly onto
//! the resulting quadrilateral. On top of that come a global sinusoidal bending, a low frequency
//! per-pixel jitter, a random piecewise linear transfer function and a dither draw.
//!
//! The corner displacements and the transfer table (the main parameters) are drawn once per pass
//! and may be saved to or loaded from a parameter file. A full file also carries every per-pixel
//! draw, which makes the attack replayable bit for bit.

use super::stream::{DrawSource, ParameterMode, ParameterRecord, RecordKind, SourceDescriptor};
use super::{TransformSetup, Transformer};
use crate::error::{PipelineError, Result};
use crate::pipeline::{Capability, Label, Parameter, PassContext};
use crate::raster::{Image, SourceView};
use crate::reconstruct::Reconstructer;
use log::{debug, warn};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Width of one transfer function bucket, in sample values.
pub const TRANSFER_STEP: f64 = 16.0;

/// Number of transfer function knots, one more than there are buckets.
pub const TRANSFER_ROWS: usize = 256 / TRANSFER_STEP as usize + 1;

/// User facing knobs of the distortion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistortionOptions {
    /// How far a corner may move into the image.
    pub inwards: f64,
    /// How far a corner may move out of the image.
    pub outwards: f64,
    /// `inwards` is a percentage of the smaller image side.
    pub relative_inwards: bool,
    /// `outwards` is a percentage of the smaller image side.
    pub relative_outwards: bool,
    /// Amplitude of the per-pixel jitter.
    pub jitter: f64,
    /// Amplitude of the global bending, per 200 pixels of width plus height.
    pub bending: f64,
    /// Largest transfer function offset.
    pub deviation: f64,
    /// JPEG quality applied after the attack.
    pub jpeg_quality: u8,
    pub parameters: ParameterMode,
    pub parameter_file: Option<PathBuf>,
}

impl Default for DistortionOptions {
    fn default() -> Self {
        DistortionOptions {
            inwards: 2.0,
            outwards: 0.7,
            relative_inwards: true,
            relative_outwards: false,
            jitter: 0.1,
            bending: 2.0,
            deviation: 1.5,
            jpeg_quality: 70,
            parameters: ParameterMode::Fresh,
            parameter_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
}

/// Corner displacements, in image coordinates with the y axis pointing down.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Corners {
    pub ul: Vector,
    pub ur: Vector,
    pub ll: Vector,
    pub lr: Vector,
}

impl Corners {
    /// Map `(x, y)` through the bilinear patch spanned by the displaced corners.
    fn warp(&self, x: f64, y: f64, width: f64, height: f64) -> (f64, f64) {
        let a = (self.ll.x, height + self.ll.y);
        let b = (self.ul.x, self.ul.y);
        let c = (width + self.ur.x, self.ur.y);
        let d = (width + self.lr.x, height + self.lr.y);
        let ab = (b.0 - a.0, b.1 - a.1);
        let cb = (b.0 - c.0, b.1 - c.1);
        let cd = (d.0 - c.0, d.1 - c.1);
        let v = (ab.0 + cd.0, ab.1 + cd.1);

        let px = 1.0 - x / width;
        let py = y / height;
        (
            -px * py * v.0 + px * cb.0 + py * cd.0 + c.0,
            -px * py * v.1 + px * cb.1 + py * cd.1 + c.1,
        )
    }
}

/// Random offsets added to reconstructed values, interpolated between knots every
/// [`TRANSFER_STEP`] sample values.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferTable {
    channels: usize,
    offsets: Vec<f64>,
}

impl TransferTable {
    pub fn from_offsets(rows: usize, channels: usize, offsets: Vec<f64>) -> Option<Self> {
        if rows != TRANSFER_ROWS || channels == 0 || offsets.len() != rows * channels {
            return None;
        }
        Some(TransferTable { channels, offsets })
    }

    pub fn rows(&self) -> usize {
        TRANSFER_ROWS
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    fn at(&self, row: usize, channel: usize) -> f64 {
        self.offsets
            .get(row * self.channels + channel)
            .copied()
            .unwrap_or(0.0)
    }

    /// Offset for `value` on `channel`.
    pub fn offset(&self, value: f64, channel: usize) -> f64 {
        let bucket = ((value / TRANSFER_STEP) as i64).clamp(0, TRANSFER_ROWS as i64 - 2) as usize;
        let frac = (value - bucket as f64 * TRANSFER_STEP) / TRANSFER_STEP;
        (1.0 - frac) * self.at(bucket, channel) + frac * self.at(bucket + 1, channel)
    }
}

/// The main parameters of one distortion.
#[derive(Debug, Clone, PartialEq)]
pub struct DistortionState {
    pub corners: Corners,
    /// Bending amplitude in pixels.
    pub bending: f64,
    pub jitter: f64,
    pub deviation: f64,
    pub transfer: TransferTable,
}

impl DistortionState {
    /// Draw fresh main parameters for `source`.
    ///
    /// Consumes the corners first, `ul.x ul.y ll.x ll.y ur.x ur.y lr.x lr.y`, then the transfer
    /// table knot by knot, channel by channel.
    pub fn generate(options: &DistortionOptions, source: &Image, rng: &mut dyn RngCore) -> Self {
        let (w, h) = (source.width() as f64, source.height() as f64);
        let side = w.min(h);
        let relative = |v: f64, flag: bool| if flag { side * v / 100.0 } else { v };
        let inwards = relative(options.inwards, options.relative_inwards);
        let outwards = relative(options.outwards, options.relative_outwards);
        let span = inwards + outwards;

        // Positive values point into the image.
        let mut inside = || rng.gen::<f64>() * span - outwards;
        let ul = Vector {
            x: inside(),
            y: inside(),
        };
        let ll = Vector {
            x: inside(),
            y: -inside(),
        };
        let ur = Vector {
            x: -inside(),
            y: inside(),
        };
        let lr = Vector {
            x: -inside(),
            y: -inside(),
        };

        let deviation = options.deviation;
        let offsets = (0..TRANSFER_ROWS * source.depth())
            .map(|_| rng.gen::<f64>() * 2.0 * deviation - deviation)
            .collect();

        DistortionState {
            corners: Corners { ul, ur, ll, lr },
            bending: options.bending * (w + h) / 400.0,
            jitter: options.jitter,
            deviation,
            transfer: TransferTable {
                channels: source.depth(),
                offsets,
            },
        }
    }
}

/// The geometric distortion transformer.
#[derive(Debug)]
pub struct Distortion {
    state: Option<DistortionState>,
    draws: DrawSource,
    size: (f64, f64),
    frequency: (f64, f64),
}

impl Distortion {
    pub fn new() -> Self {
        Distortion {
            state: None,
            draws: DrawSource::Generator,
            size: (1.0, 1.0),
            frequency: (0.0, 0.0),
        }
    }

    /// The main parameters of the current pass.
    pub fn state(&self) -> Option<&DistortionState> {
        self.state.as_ref()
    }

    /// Try to take the main parameters, and possibly the draw stream, from a parameter file.
    ///
    /// Returns `None`, after a warning, when the file was drawn for a differently shaped image.
    fn load(
        &mut self,
        path: &Path,
        mode: ParameterMode,
        source: &Image,
    ) -> Result<Option<DistortionState>> {
        let file = File::open(path).map_err(|source| PipelineError::ParameterFile {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let record = ParameterRecord::read_from(&mut reader)?;
        if !record.source.matches(source) {
            warn!(
                "parameter file {path:?} was made for a {}x{}x{} image, drawing fresh parameters",
                record.source.width, record.source.height, record.source.depth
            );
            return Ok(None);
        }
        if record.state.transfer.channels() != source.depth() {
            return Err(PipelineError::ParameterFormat(format!(
                "transfer table of {path:?} covers {} channels, the image has {}",
                record.state.transfer.channels(),
                source.depth()
            )));
        }
        debug!("loaded distortion parameters from {path:?}: {:?}", record.options);
        if mode == ParameterMode::LoadFull {
            if record.kind == RecordKind::Full {
                self.draws = DrawSource::Replay {
                    reader: Box::new(reader),
                    exhausted: false,
                };
            } else {
                warn!("parameter file {path:?} holds only the main parameters, per-pixel values are drawn fresh");
            }
        }
        Ok(Some(record.state))
    }

    /// Save freshly drawn main parameters, arming the recorder for a full save.
    fn save(
        &mut self,
        path: &Path,
        mode: ParameterMode,
        options: &DistortionOptions,
        source: &Image,
        state: &DistortionState,
    ) -> Result<()> {
        let file = match File::create(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("cannot create parameter file {path:?} ({e}), parameters will not be saved");
                return Ok(());
            }
        };
        let mut writer = BufWriter::new(file);
        let record = ParameterRecord {
            kind: if mode.full() {
                RecordKind::Full
            } else {
                RecordKind::Main
            },
            source: SourceDescriptor::of(source),
            options: options.clone(),
            state: state.clone(),
        };
        record.write_to(&mut writer)?;
        if mode.full() {
            self.draws = DrawSource::Record {
                writer: Box::new(writer),
                error: None,
            };
        } else {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new()
    }
}

impl Capability for Distortion {
    fn name(&self) -> &'static str {
        "Geometric distortion"
    }

    fn cleanup(&mut self) -> Result<()> {
        self.state = None;
        self.draws.finish()
    }
}

impl Transformer for Distortion {
    fn setup(&mut self, pass: &PassContext<'_>, rng: &mut dyn RngCore) -> Result<TransformSetup> {
        let options = match &pass.config.parameter {
            Parameter::Distortion(o) => o.clone(),
            Parameter::None => DistortionOptions::default(),
            other => {
                return Err(PipelineError::invalid(
                    self.name(),
                    format!("unexpected parameter {other:?}"),
                ))
            }
        };
        let source = pass.source;
        let mode = options.parameters;
        let path = match (&options.parameter_file, mode) {
            (_, ParameterMode::Fresh) => None,
            (Some(p), _) => Some(p.clone()),
            (None, _) => {
                return Err(PipelineError::invalid(
                    self.name(),
                    format!("{mode:?} needs a parameter file"),
                ))
            }
        };
        self.draws = DrawSource::Generator;

        let loaded = match &path {
            Some(p) if mode.loads() => self.load(p, mode, source)?,
            _ => None,
        };
        let state = match loaded {
            Some(state) => state,
            None => {
                let state = DistortionState::generate(&options, source, rng);
                if let (Some(p), true) = (&path, mode.saves()) {
                    self.save(p, mode, &options, source, &state)?;
                }
                state
            }
        };

        let (w, h) = (source.width(), source.height());
        self.size = (w as f64, h as f64);
        self.frequency = ((w / 20) as f64 / w as f64, (h / 20) as f64 / h as f64);
        self.state = Some(state);

        Ok(TransformSetup::same_as(&pass.view()).with_label(Label::new(
            "StirMark with randomisation and bending",
            "_stirmark_random_bend",
        )))
    }

    fn transform(
        &mut self,
        reconstructer: &mut dyn Reconstructer,
        source: &SourceView<'_>,
        rng: &mut dyn RngCore,
        x: f64,
        y: f64,
        channel: usize,
    ) -> f64 {
        let Some(state) = self.state.as_ref() else {
            return reconstructer.reconstruct(source, rng, x, y, channel);
        };
        let (w, h) = self.size;
        let (mut mx, mut my) = state.corners.warp(x, y, w, h);

        if state.bending != 0.0 {
            mx += state.bending * (my * PI / h).sin();
            my += state.bending * (mx * PI / w).sin();
        }

        if state.jitter != 0.0 {
            let (fx, fy) = self.frequency;
            let displacement = state.jitter * (mx * 2.0 * PI * fx).sin() * (my * 2.0 * PI * fy).sin();
            mx += displacement * (1.0 + self.draws.draw(rng));
            my += displacement * (1.0 + self.draws.draw(rng));
        }

        let mut value = reconstructer.reconstruct(source, rng, mx, my, channel);
        value += state.transfer.offset(value, channel);

        // Dither spreads the quantisation noise.
        value + self.draws.draw(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_undisplaced_corners_are_identity() {
        let corners = Corners::default();
        let (x, y) = corners.warp(3.5, 1.25, 8.0, 4.0);
        assert!((x - 3.5).abs() < 1e-12);
        assert!((y - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_corner_ranges() {
        let image = Image::new(100, 50, 1, 255).unwrap();
        let options = DistortionOptions::default();
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
        for _ in 0..20 {
            let s = DistortionState::generate(&options, &image, &mut rng);
            // One percent of 50 inwards, 0.7 pixels outwards.
            let (inwards, outwards) = (1.0, 0.7);
            let c = s.corners;
            for v in [c.ul.x, c.ul.y, c.ll.x, -c.ll.y, -c.ur.x, c.ur.y, -c.lr.x, -c.lr.y] {
                assert!(v >= -outwards && v <= inwards, "{v}");
            }
            assert_eq!(s.transfer.offsets().len(), TRANSFER_ROWS);
            assert!(s.transfer.offsets().iter().all(|v| v.abs() <= 1.5));
            assert!((s.bending - 2.0 * 150.0 / 400.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_generation_is_seeded() {
        let image = Image::new(16, 16, 3, 255).unwrap();
        let options = DistortionOptions::default();
        let a = DistortionState::generate(&options, &image, &mut rand_chacha::ChaCha8Rng::seed_from_u64(7));
        let b = DistortionState::generate(&options, &image, &mut rand_chacha::ChaCha8Rng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_transfer_interpolates_between_knots() {
        let mut offsets = vec![0.0; TRANSFER_ROWS];
        offsets[2] = 1.0;
        offsets[3] = 3.0;
        let table = TransferTable::from_offsets(TRANSFER_ROWS, 1, offsets).unwrap();
        assert_eq!(table.offset(32.0, 0), 1.0);
        assert_eq!(table.offset(40.0, 0), 2.0);
        assert_eq!(table.offset(-5.0, 0), 0.0);
        assert!(table.offset(300.0, 0).is_finite());
    }

    #[test]
    fn test_transfer_table_must_cover_every_channel() {
        use crate::pipeline::{Orchestrator, PassConfig};
        use crate::reconstruct::ReconstructerId;
        use crate::sampler::SamplerId;
        use crate::transform::TransformerId;

        let gray = Image::new(8, 8, 1, 255).unwrap();
        let rgb = Image::new(8, 8, 3, 255).unwrap();
        let options = DistortionOptions::default();
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(3);
        // Claims the colour image but carries a single channel table.
        let record = ParameterRecord {
            kind: RecordKind::Main,
            source: SourceDescriptor::of(&rgb),
            options: options.clone(),
            state: DistortionState::generate(&options, &gray, &mut rng),
        };
        let path = std::env::temp_dir().join(format!(
            "stirmark_transfer_channels_{}.smd",
            std::process::id()
        ));
        record
            .write_to(&mut File::create(&path).unwrap())
            .unwrap();

        let options = DistortionOptions {
            parameters: ParameterMode::LoadMain,
            parameter_file: Some(path.clone()),
            ..Default::default()
        };
        let config = PassConfig::new(
            ReconstructerId::Linear,
            TransformerId::Distortion,
            SamplerId::Point,
        )
        .with_parameter(Parameter::Distortion(options));
        let err = Orchestrator::seeded(1).run(&rgb, &config).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, PipelineError::ParameterFormat(_)), "{err}");
    }
}
