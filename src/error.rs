//! Error types for the inference pipeline.
//!
//! Asset and manifest failures are process-fatal: the predictor must not be
//! built from a partial artifact set. Every other variant aborts a single
//! request and carries enough detail (stage, field, expected vs. actual
//! width) to diagnose drift between the serving code and the artifacts.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while loading artifacts or serving a prediction.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required artifact file does not exist at its resolved path.
    #[error("asset '{name}' not found at {}", .path.display())]
    AssetMissing { name: String, path: PathBuf },

    /// The artifact file exists but could not be decoded or is inconsistent.
    #[error("asset '{name}' at {} is corrupt: {reason}", .path.display())]
    AssetCorrupt {
        name: String,
        path: PathBuf,
        reason: String,
    },

    /// The pipeline manifest is unreadable or describes an invalid layout.
    #[error("invalid pipeline manifest: {reason}")]
    Manifest { reason: String },

    /// A raw input field could not be coerced to the declared type.
    #[error("invalid value for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// The numeric sub-vector does not have the width the scaler was fit on.
    #[error("scaling failed: scaler expects {expected} numeric features, got {actual}")]
    ScalingError { expected: usize, actual: usize },

    /// The assembled feature vector does not match the selector mask width.
    #[error(
        "feature count mismatch: selector mask expects {expected} features, \
         assembled vector has {actual}"
    )]
    FeatureCountMismatch { expected: usize, actual: usize },

    /// The regressor rejected the input or produced an unusable output.
    #[error("prediction failed: {0}")]
    PredictionError(String),
}

impl PipelineError {
    /// Create an asset corruption error.
    pub fn corrupt(name: impl Into<String>, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::AssetCorrupt {
            name: name.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a manifest error.
    pub fn manifest(reason: impl Into<String>) -> Self {
        Self::Manifest {
            reason: reason.into(),
        }
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a prediction error.
    pub fn prediction(msg: impl Into<String>) -> Self {
        Self::PredictionError(msg.into())
    }

    /// Name of the pipeline stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::AssetMissing { .. } | Self::AssetCorrupt { .. } => "assets",
            Self::Manifest { .. } => "manifest",
            Self::InvalidField { .. } => "numeric",
            Self::ScalingError { .. } => "scaling",
            Self::FeatureCountMismatch { .. } => "selection",
            Self::PredictionError(_) => "regression",
        }
    }

    /// Whether the error invalidates the whole process rather than one request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AssetMissing { .. } | Self::AssetCorrupt { .. } | Self::Manifest { .. }
        )
    }
}
