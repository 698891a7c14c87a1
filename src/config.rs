//! The classic one-shot StirMark attack and its configuration.

use crate::error::{PipelineError, Result};
use crate::pipeline::{Orchestrator, Parameter, PassConfig, PassOutcome};
use crate::raster::{BorderPolicy, Image};
use crate::reconstruct::{NyquistConfig, ReconstructerId, DEFAULT_RECONSTRUCTER};
use crate::sampler::SamplerId;
use crate::transform::{DistortionOptions, TransformerId};
use log::warn;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything the attack can be told, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttackConfig {
    pub distortion: DistortionOptions,
    /// Reconstructer sampling the warped source.
    pub reconstructer: ReconstructerId,
    /// Only read by the Nyquist reconstructer.
    pub nyquist: NyquistConfig,
    /// Seed of the process generator; entropy when absent.
    pub seed: Option<u64>,
    /// Round trip the result through JPEG at `distortion.jpeg_quality`.
    pub jpeg: bool,
}

impl Default for AttackConfig {
    fn default() -> Self {
        AttackConfig {
            distortion: DistortionOptions::default(),
            reconstructer: DEFAULT_RECONSTRUCTER,
            nyquist: NyquistConfig::default(),
            seed: None,
            jpeg: true,
        }
    }
}

impl AttackConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|source| PipelineError::ParameterFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    /// The pass the attack runs.
    pub fn pass_config(&self) -> PassConfig {
        PassConfig::new(
            self.reconstructer,
            TransformerId::Distortion,
            SamplerId::Point,
        )
        .with_parameter(Parameter::Distortion(self.distortion.clone()))
        .with_border(BorderPolicy::Mirror)
        .with_nyquist(self.nyquist)
    }
}

/// Apply the geometric distortion attack to `source`, followed by JPEG compression if enabled.
///
/// An abandoned pass is an error here, there is no next test to move on to.
pub fn stirmark<R: RngCore>(
    source: &Image,
    config: &AttackConfig,
    orchestrator: &mut Orchestrator<R>,
) -> Result<Image> {
    let result = match orchestrator.run(source, &config.pass_config())? {
        PassOutcome::Completed(result) => result,
        PassOutcome::Abandoned(e) => return Err(e),
    };
    for w in &result.warnings {
        warn!("attack finished with: {w}");
    }
    if !config.jpeg {
        return Ok(result.image);
    }
    let bytes = result.image.encode_jpeg(config.distortion.jpeg_quality)?;
    Image::decode(&bytes)
}
