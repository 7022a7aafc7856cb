//! Pre-fit pipeline artifacts and the store that loads them.
//!
//! The scaler, selector, vectorizers and regressor are fit offline. Here they are
//! black boxes behind thin capability traits; only the transform each fitted
//! object applies at inference time is implemented, nothing is ever fit.

pub mod regressor;
pub mod scaler;
pub mod selector;
pub mod store;
pub mod vectorizer;

pub use regressor::LinearRegressor;
#[cfg(feature = "onnx")]
pub use regressor::OnnxRegressor;
pub use scaler::FittedScaler;
pub use selector::SupportMask;
pub use store::{ArtifactSet, AssetStore};
pub use vectorizer::{FittedVectorizer, VectorizerSpec, Weighting};

use crate::error::Result;
use crate::features::SparseVector;
use anyhow::Context;
use ndarray::{Array1, ArrayView1};
use serde::de::DeserializeOwned;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Fitted numeric transform (min-max or standard scaling).
pub trait Scaler: Send + Sync + fmt::Debug {
    /// Number of columns the scaler was fit on.
    fn n_features_in(&self) -> usize;

    /// Scale one row. Fails with `ScalingError` on a width mismatch.
    fn transform(&self, row: &[f64]) -> Result<Array1<f64>>;

    /// Undo the scaling of one row.
    fn inverse_transform(&self, row: &[f64]) -> Result<Array1<f64>>;
}

/// Fitted text-to-vector transform over a fixed vocabulary.
pub trait Vectorizer: Send + Sync + fmt::Debug {
    /// Width of every vector this vectorizer produces.
    fn vocabulary_size(&self) -> usize;

    /// Vectorize one document. Empty text yields an all-zero vector.
    fn transform(&self, text: &str) -> SparseVector;
}

/// Fitted regressor producing one scalar in its native (transformed) target space.
pub trait Regressor: Send + Sync + fmt::Debug {
    /// Expected input width, when the artifact declares one.
    fn n_features_in(&self) -> Option<usize>;

    /// Predict for a single selected feature row.
    fn predict(&self, features: ArrayView1<'_, f64>) -> Result<f64>;
}

/// An artifact kind that can be decoded from a file on disk.
pub trait Artifact: Sized + Send + Sync + 'static {
    /// Short kind label used in logs.
    const KIND: &'static str;

    /// Decode and validate the artifact at `path`.
    fn read(path: &Path) -> anyhow::Result<Self>;
}

/// Deserialize a JSON artifact file.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("decoding {}", path.display()))?;
    Ok(value)
}
