//! One pass of the three axis pipeline: reconstructer, transformer and sampler.
//!
//! A pass moves through its lifecycle as a chain of types, [`Orchestrator::run`] being the only
//! driver:
//!
//! * `Resolved`: the three capabilities are instantiated from their ids.
//! * `Prepared`: every setup succeeded and the destination image is allocated.
//! * `Ready`: every initialisation succeeded.
//! * `Executed`: the sampler has filled the destination.
//!
//! The first failing setup or initialisation ends the pass; the capabilities are then simply
//! dropped, without running the sampler or any cleanup. Cleanup failures are collected as
//! warnings and never stop the remaining cleanups.

use crate::error::{PipelineError, Result, Stage};
use crate::raster::{BorderPolicy, Image, SourceView};
use crate::reconstruct::{
    definitions, ConvolutionKernel, Definitions, MedianWindow, NyquistConfig, Reconstructer,
    ReconstructerId, QUADRATIC_PARAMETER,
};
use crate::sampler::{Sampler, SamplerId, DEFAULT_SUPERSAMPLE};
use crate::transform::{DistortionOptions, Transformer, TransformerId};
use log::{debug, warn};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

/// Behaviour shared by reconstructers, transformers and samplers.
pub trait Capability {
    fn name(&self) -> &'static str;

    /// Longer description, for diagnostics.
    fn describe(&self) -> String {
        self.name().to_string()
    }

    /// Called once per process for each kind of capability, before its first pass.
    fn define(&self, _definitions: &'static Definitions) -> Result<()> {
        Ok(())
    }

    /// Called after every setup succeeded, once the destination image exists.
    fn initialise(&mut self, _source: &Image, _destination: &Image) -> Result<()> {
        Ok(())
    }

    /// Release whatever the pass acquired.
    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Human readable name of a pass and the suffix of its output files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Label {
    pub test_name: String,
    pub file_suffix: String,
}

impl Label {
    pub fn new(test_name: impl Into<String>, file_suffix: impl Into<String>) -> Self {
        Label {
            test_name: test_name.into(),
            file_suffix: file_suffix.into(),
        }
    }
}

/// The test specific parameter of a pass.
///
/// Which variant is valid depends on the transformer, or for the filters on the reconstructer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    #[default]
    None,
    /// Percentage cut away from width and height, centered.
    Crop(u32),
    /// Columns and rows removed at regular intervals.
    Remove { columns: u32, rows: u32 },
    Scale { x: f64, y: f64 },
    /// Rotation in degrees, counter clockwise.
    Angle(f64),
    /// Shift in percent of width and height.
    Shear { x: f64, y: f64 },
    /// `[[a, b], [c, d]]`
    Matrix([[f64; 2]; 2]),
    Distortion(DistortionOptions),
    Window(MedianWindow),
    Kernel(ConvolutionKernel),
}

/// Everything needed to run one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassConfig {
    pub reconstructer: ReconstructerId,
    pub transformer: TransformerId,
    pub sampler: SamplerId,
    pub parameter: Parameter,
    pub border: BorderPolicy,
    pub nyquist: NyquistConfig,
    /// Evaluations per pixel along x and y for the super sampler.
    pub supersample: (u32, u32),
    /// Continuity parameter of the general quadratic.
    pub quadratic_parameter: f64,
}

impl PassConfig {
    pub fn new(reconstructer: ReconstructerId, transformer: TransformerId, sampler: SamplerId) -> Self {
        PassConfig {
            reconstructer,
            transformer,
            sampler,
            parameter: Parameter::None,
            border: BorderPolicy::Zero,
            nyquist: NyquistConfig::default(),
            supersample: DEFAULT_SUPERSAMPLE,
            quadratic_parameter: QUADRATIC_PARAMETER,
        }
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameter = parameter;
        self
    }

    pub fn with_border(mut self, border: BorderPolicy) -> Self {
        self.border = border;
        self
    }

    pub fn with_nyquist(mut self, nyquist: NyquistConfig) -> Self {
        self.nyquist = nyquist;
        self
    }

    pub fn with_supersample(mut self, nx: u32, ny: u32) -> Self {
        self.supersample = (nx, ny);
        self
    }

    pub fn with_quadratic_parameter(mut self, parameter: f64) -> Self {
        self.quadratic_parameter = parameter;
        self
    }
}

/// What setups get to look at.
#[derive(Debug, Clone, Copy)]
pub struct PassContext<'a> {
    pub source: &'a Image,
    pub config: &'a PassConfig,
}

impl<'a> PassContext<'a> {
    /// The source under the pass border policy, without offset.
    pub fn view(&self) -> SourceView<'a> {
        SourceView::new(self.source, (0, 0), self.config.border)
    }
}

/// A completed pass.
#[derive(Debug)]
pub struct PassResult {
    pub image: Image,
    pub label: Label,
    /// Cleanup failures, already logged.
    pub warnings: Vec<PipelineError>,
}

#[derive(Debug)]
pub enum PassOutcome {
    Completed(PassResult),
    /// A setup or initialisation refused to continue; no output was produced.
    Abandoned(PipelineError),
}

impl PassOutcome {
    pub fn completed(self) -> Option<PassResult> {
        match self {
            PassOutcome::Completed(r) => Some(r),
            PassOutcome::Abandoned(_) => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PassOutcome::Completed(_))
    }
}

struct Capabilities {
    reconstructer: Box<dyn Reconstructer>,
    transformer: Box<dyn Transformer>,
    sampler: Box<dyn Sampler>,
}

static DEFINED: OnceLock<Mutex<HashSet<&'static str>>> = OnceLock::new();

/// Run `define` unless a capability called `name` was already defined in this process.
fn define_once(name: &'static str, define: impl FnOnce() -> Result<()>) {
    let defined = DEFINED.get_or_init(|| Mutex::new(HashSet::new()));
    let first = defined
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(name);
    if first {
        if let Err(e) = define() {
            warn!("{name} definition failed: {e}");
        }
    }
}

struct Resolved<'a> {
    capabilities: Capabilities,
    source: &'a Image,
    config: &'a PassConfig,
}

struct Prepared<'a> {
    capabilities: Capabilities,
    source: &'a Image,
    config: &'a PassConfig,
    destination: Image,
    offset: (i64, i64),
    label: Label,
}

struct Ready<'a>(Prepared<'a>);

struct Executed {
    capabilities: Capabilities,
    destination: Image,
    label: Label,
}

impl<'a> Resolved<'a> {
    fn new(source: &'a Image, config: &'a PassConfig) -> Self {
        Resolved {
            capabilities: Capabilities {
                reconstructer: config.reconstructer.build(),
                transformer: config.transformer.build(),
                sampler: config.sampler.build(),
            },
            source,
            config,
        }
    }

    fn define(&self) {
        let c = &self.capabilities;
        define_once(c.reconstructer.name(), || c.reconstructer.define(definitions()));
        define_once(c.transformer.name(), || c.transformer.define(definitions()));
        define_once(c.sampler.name(), || c.sampler.define(definitions()));
        debug!("reconstructer - {}", c.reconstructer.describe());
        debug!("transformer   - {}", c.transformer.describe());
        debug!("sampler       - {}", c.sampler.describe());
    }

    fn setup(mut self, rng: &mut dyn RngCore) -> Result<Prepared<'a>> {
        let context = PassContext {
            source: self.source,
            config: self.config,
        };
        let c = &mut self.capabilities;
        let filter_label = c.reconstructer.setup(&context)?;
        let geometry = c.transformer.setup(&context, rng)?;
        c.sampler.setup(&context)?;

        if geometry.width == 0 || geometry.height == 0 {
            return Err(PipelineError::stage(
                Stage::Setup,
                c.transformer.name(),
                format!(
                    "destination would be {}x{}",
                    geometry.width, geometry.height
                ),
            ));
        }
        let destination = self.source.blank_like(geometry.width, geometry.height)?;
        let label = geometry.label.or(filter_label).unwrap_or_else(|| {
            Label::new(
                format!("{} with {}", c.transformer.name(), c.reconstructer.name()),
                "",
            )
        });
        Ok(Prepared {
            capabilities: self.capabilities,
            source: self.source,
            config: self.config,
            destination,
            offset: geometry.offset,
            label,
        })
    }
}

impl<'a> Prepared<'a> {
    fn initialise(mut self) -> Result<Ready<'a>> {
        let c = &mut self.capabilities;
        c.reconstructer.initialise(self.source, &self.destination)?;
        c.transformer.initialise(self.source, &self.destination)?;
        c.sampler.initialise(self.source, &self.destination)?;
        Ok(Ready(self))
    }
}

impl Ready<'_> {
    fn execute(self, rng: &mut dyn RngCore) -> Executed {
        let Prepared {
            mut capabilities,
            source,
            config,
            mut destination,
            offset,
            label,
        } = self.0;
        let view = SourceView::new(source, offset, config.border);
        let c = &mut capabilities;
        c.sampler.sample(
            c.reconstructer.as_mut(),
            c.transformer.as_mut(),
            &view,
            &mut destination,
            rng,
        );
        Executed {
            capabilities,
            destination,
            label,
        }
    }
}

impl Executed {
    fn cleanup(mut self) -> PassResult {
        let c = &mut self.capabilities;
        let results = [
            ("reconstructer", c.reconstructer.cleanup()),
            ("transformer", c.transformer.cleanup()),
            ("sampler", c.sampler.cleanup()),
        ];
        let mut warnings = Vec::new();
        for (role, result) in results {
            if let Err(e) = result {
                warn!("{role} cleanup failed: {e}");
                warnings.push(e);
            }
        }
        PassResult {
            image: self.destination,
            label: self.label,
            warnings,
        }
    }
}

/// Runs passes, owning the process generator every random draw comes from.
#[derive(Debug)]
pub struct Orchestrator<R: RngCore = ChaCha8Rng> {
    rng: R,
}

impl Orchestrator<ChaCha8Rng> {
    /// Orchestrator whose runs are reproducible from `seed`.
    pub fn seeded(seed: u64) -> Self {
        Orchestrator::new(ChaCha8Rng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Orchestrator::new(ChaCha8Rng::from_entropy())
    }
}

impl<R: RngCore> Orchestrator<R> {
    pub fn new(rng: R) -> Self {
        Orchestrator { rng }
    }

    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    /// Run one pass over `source`.
    ///
    /// Fatal errors are returned as `Err`; a pass abandoned during setup or initialisation is
    /// logged and reported as [`PassOutcome::Abandoned`].
    pub fn run(&mut self, source: &Image, config: &PassConfig) -> Result<PassOutcome> {
        let pass = Resolved::new(source, config);
        pass.define();

        let prepared = match pass.setup(&mut self.rng) {
            Ok(p) => p,
            Err(e) => return abandon(e),
        };
        let ready = match prepared.initialise() {
            Ok(r) => r,
            Err(e) => return abandon(e),
        };
        let executed = ready.execute(&mut self.rng);
        Ok(PassOutcome::Completed(executed.cleanup()))
    }
}

fn abandon(e: PipelineError) -> Result<PassOutcome> {
    if e.is_fatal() {
        return Err(e);
    }
    warn!("{e}, pass abandoned");
    Ok(PassOutcome::Abandoned(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> Image {
        let data = (0..8u32 * 6).map(|v| (v * 5) as u8).collect();
        Image::from_raw(8, 6, 1, 255, data).unwrap()
    }

    #[test]
    fn test_invariant_nearest_is_identity() {
        let img = gradient();
        let config = PassConfig::new(
            ReconstructerId::NearestNeighbour,
            TransformerId::Invariant,
            SamplerId::Point,
        );
        let result = Orchestrator::seeded(1)
            .run(&img, &config)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(result.image, img);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_full_crop_abandons_pass() {
        let img = gradient();
        let config = PassConfig::new(
            ReconstructerId::NearestNeighbour,
            TransformerId::Cropping,
            SamplerId::Point,
        )
        .with_parameter(Parameter::Crop(100));
        let outcome = Orchestrator::seeded(1).run(&img, &config).unwrap();
        match outcome {
            PassOutcome::Abandoned(PipelineError::Stage { stage, .. }) => {
                assert_eq!(stage, Stage::Setup)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_singular_matrix_is_fatal() {
        let img = gradient();
        let config = PassConfig::new(
            ReconstructerId::Linear,
            TransformerId::Linear,
            SamplerId::Point,
        )
        .with_parameter(Parameter::Matrix([[1.0, 2.0], [2.0, 4.0]]));
        let err = Orchestrator::seeded(1).run(&img, &config).unwrap_err();
        assert!(matches!(err, PipelineError::SingularMatrix { .. }));
    }

    #[test]
    fn test_wrong_parameter_is_fatal() {
        let img = gradient();
        let config = PassConfig::new(
            ReconstructerId::MedianFilter,
            TransformerId::Invariant,
            SamplerId::Point,
        );
        let err = Orchestrator::seeded(1).run(&img, &config).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_parameter_json_shape() {
        let p: Parameter = serde_json::from_str(r#"{"scale": {"x": 0.5, "y": 0.5}}"#).unwrap();
        assert_eq!(p, Parameter::Scale { x: 0.5, y: 0.5 });
        let p: Parameter = serde_json::from_str(r#""none""#).unwrap();
        assert_eq!(p, Parameter::None);
    }
}
