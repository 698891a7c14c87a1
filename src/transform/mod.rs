//! Transformers map destination pixel coordinates back into the source image.
//!
//! A transformer decides the destination geometry during setup, then for every destination
//! coordinate asks the reconstructer for the value at the matching source position. The
//! geometric distortion additionally perturbs the reconstructed value.

pub mod distortion;
pub mod geometry;
pub mod stream;

use crate::error::Result;
use crate::pipeline::{Capability, Label, PassContext};
use crate::raster::SourceView;
use crate::reconstruct::Reconstructer;
use rand::RngCore;
use serde::{Deserialize, Serialize};

pub use distortion::{Corners, Distortion, DistortionOptions, DistortionState, TransferTable};
pub use geometry::Geometric;
pub use stream::ParameterMode;

/// Destination geometry chosen by a transformer's setup.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformSetup {
    pub width: u32,
    pub height: u32,
    /// Added to every source lookup; cropping uses it to pick the kept window.
    pub offset: (i64, i64),
    pub label: Option<Label>,
}

impl TransformSetup {
    /// Destination of the same size as the source, no offset.
    pub fn same_as(source: &SourceView<'_>) -> Self {
        TransformSetup {
            width: source.width() as u32,
            height: source.height() as u32,
            offset: (0, 0),
            label: None,
        }
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }
}

/// Coordinate mapping from destination to source.
pub trait Transformer: Capability {
    /// Parse the pass parameter and decide the destination geometry.
    ///
    /// The process generator is handed in for transformers that draw their parameters once.
    fn setup(&mut self, pass: &PassContext<'_>, rng: &mut dyn RngCore) -> Result<TransformSetup>;

    /// Value of `channel` at destination position `(x, y)`.
    fn transform(
        &mut self,
        reconstructer: &mut dyn Reconstructer,
        source: &SourceView<'_>,
        rng: &mut dyn RngCore,
        x: f64,
        y: f64,
        channel: usize,
    ) -> f64;
}

/// Selects a transformer for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformerId {
    Invariant,
    Cropping,
    Flip,
    Scale,
    Rotation,
    RotationScale,
    Shearing,
    Linear,
    RowColumnRemoval,
    Distortion,
}

impl TransformerId {
    /// Instantiate a fresh transformer for one pass.
    pub fn build(self) -> Box<dyn Transformer> {
        match self {
            TransformerId::Distortion => Box::new(Distortion::new()),
            id => Box::new(Geometric::new(id)),
        }
    }
}
