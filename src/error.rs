//! The single error type used throughout the crate.
//!
//! Errors fall in two groups. Fatal ones (see [`PipelineError::is_fatal`]) abort the whole run:
//! absent images, singular matrices, unsupported filters, unreadable parameter files. The others
//! only abandon the current pass, or are reported as warnings once the pass has finished.

use std::path::PathBuf;
use thiserror::Error;

/// Lifecycle stage of a pipeline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Define,
    Setup,
    Initialise,
    Cleanup,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Define => "define",
            Stage::Setup => "setup",
            Stage::Initialise => "initialisation",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The image has no pixels, or its buffer disagrees with its shape.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// The general linear transform cannot be inverted.
    #[error("linear transform [[{a} {b}][{c} {d}]] is not invertible")]
    SingularMatrix { a: f64, b: f64, c: f64, d: f64 },

    /// A capability received a parameter it cannot work with.
    #[error("invalid parameter for {capability}: {reason}")]
    InvalidParameter {
        capability: &'static str,
        reason: String,
    },

    /// A distortion parameter file that must be read could not be opened.
    #[error("cannot open parameter file {path:?}: {source}")]
    ParameterFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A distortion parameter file exists but does not hold a valid record.
    #[error("malformed parameter file: {0}")]
    ParameterFormat(String),

    /// A lifecycle stage refused to continue; only the current pass is lost.
    #[error("{capability} {stage} failed: {reason}")]
    Stage {
        stage: Stage,
        capability: &'static str,
        reason: String,
    },

    /// The per-pixel parameter stream misbehaved during a pass.
    #[error("parameter stream: {0}")]
    ParameterStream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether this error must terminate the run instead of just the current pass.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PipelineError::Stage { .. } | PipelineError::ParameterStream(_)
        )
    }

    pub(crate) fn stage(stage: Stage, capability: &'static str, reason: impl Into<String>) -> Self {
        PipelineError::Stage {
            stage,
            capability,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(capability: &'static str, reason: impl Into<String>) -> Self {
        PipelineError::InvalidParameter {
            capability,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
