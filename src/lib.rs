//! Production inference for artisan product price prediction.
//!
//! This crate loads a pre-fit pipeline (numeric scaler, text vectorizers,
//! feature-selection mask and regressor) from disk once, and turns raw product
//! records into predicted selling prices. Feature assembly must reproduce the
//! offline training layout exactly; the layout is declared by a versioned
//! [`PipelineManifest`] shipped with the artifacts.

pub mod artifacts;
pub mod error;
pub mod features;
pub mod manifest;
pub mod predictor;

pub use artifacts::{ArtifactSet, AssetStore, Regressor, Scaler, Vectorizer};
pub use error::{PipelineError, Result};
pub use features::{FeatureVector, FieldValue, RawInput, SparseVector};
pub use manifest::{PipelineManifest, MANIFEST_FILE};
pub use predictor::{PredictedPrice, PricePrediction, PricePredictor, TargetTransform};
