#![allow(clippy::excessive_precision)]

pub mod bench;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod quality;
pub mod raster;
pub mod reconstruct;
pub mod sampler;
pub mod transform;
pub mod util;

// expose the capability traits in the prelude.
pub mod prelude {
    pub use crate::pipeline::Capability;
    pub use crate::reconstruct::Reconstructer;
    pub use crate::sampler::Sampler;
    pub use crate::transform::Transformer;
}
// Export the public components of the pipeline here.
pub use error::{PipelineError, Result, Stage};
pub use pipeline::{Orchestrator, Parameter, PassConfig, PassOutcome, PassResult};
pub use raster::{BorderPolicy, Image};
pub use reconstruct::ReconstructerId;
pub use sampler::SamplerId;
pub use transform::{DistortionOptions, ParameterMode, TransformerId};
pub use bench::{Benchmark, BenchmarkTable, TestReport, TestSet};
pub use config::{stirmark, AttackConfig};
pub use quality::{psnr, snr, Quality};
