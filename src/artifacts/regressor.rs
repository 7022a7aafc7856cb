//! Regressor artifacts.
//!
//! Tree ensembles are exported to ONNX and run through ONNX Runtime; linear
//! models are small enough to ship as JSON coefficients.

use super::{read_json, Artifact, Regressor};
use crate::error::{PipelineError, Result};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Linear model: `coef · x + intercept`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub coef: Vec<f64>,
    pub intercept: f64,
}

impl LinearRegressor {
    pub fn new(coef: Vec<f64>, intercept: f64) -> Self {
        Self { coef, intercept }
    }
}

impl Regressor for LinearRegressor {
    fn n_features_in(&self) -> Option<usize> {
        Some(self.coef.len())
    }

    fn predict(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
        if features.len() != self.coef.len() {
            return Err(PipelineError::prediction(format!(
                "regressor expects {} features, got {}",
                self.coef.len(),
                features.len()
            )));
        }

        let dot: f64 = features
            .iter()
            .zip(&self.coef)
            .map(|(x, w)| x * w)
            .sum();
        Ok(dot + self.intercept)
    }
}

impl Artifact for LinearRegressor {
    const KIND: &'static str = "regressor";

    fn read(path: &Path) -> anyhow::Result<Self> {
        let model: LinearRegressor = read_json(path)?;
        if model.coef.is_empty() {
            anyhow::bail!("linear regressor has no coefficients");
        }
        if !model.intercept.is_finite() || model.coef.iter().any(|w| !w.is_finite()) {
            anyhow::bail!("linear regressor has non-finite parameters");
        }
        Ok(model)
    }
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxRegressor;

#[cfg(feature = "onnx")]
mod onnx {
    use super::*;
    use ndarray::Array2;
    use ort::session::{builder::GraphOptimizationLevel, Session};
    use ort::value::Value;
    use parking_lot::Mutex;

    /// Regressor exported to ONNX, executed by ONNX Runtime.
    ///
    /// The model takes a single `float32[1, n]` input and its first output holds
    /// the prediction. `n` is read from the model when it is fixed.
    pub struct OnnxRegressor {
        session: Mutex<Session>,
        output_name: String,
        n_features_in: Option<usize>,
    }

    impl std::fmt::Debug for OnnxRegressor {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OnnxRegressor")
                .field("output_name", &self.output_name)
                .field("n_features_in", &self.n_features_in)
                .finish()
        }
    }

    impl OnnxRegressor {
        /// Load an ONNX model from disk.
        pub fn load(model_path: &Path) -> anyhow::Result<Self> {
            let session = Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(1)? // Single-threaded for determinism
                .commit_from_file(model_path)?;

            let output_name = session
                .outputs
                .first()
                .map(|o| o.name.clone())
                .ok_or_else(|| anyhow::anyhow!("ONNX model declares no outputs"))?;

            let n_features_in = session
                .inputs
                .first()
                .and_then(|input| input.input_type.tensor_shape())
                .and_then(|shape| declared_width(shape));

            Ok(Self {
                session: Mutex::new(session),
                output_name,
                n_features_in,
            })
        }
    }

    /// Feature width from a declared input shape: its last dimension, unless
    /// that dimension is symbolic (negative).
    pub(super) fn declared_width(dims: &[i64]) -> Option<usize> {
        dims.last()
            .copied()
            .filter(|&d| d > 0)
            .map(|d| d as usize)
    }

    impl Regressor for OnnxRegressor {
        fn n_features_in(&self) -> Option<usize> {
            self.n_features_in
        }

        fn predict(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
            let row: Vec<f32> = features.iter().map(|&x| x as f32).collect();
            let input = Array2::from_shape_vec((1, row.len()), row)
                .map_err(|e| PipelineError::prediction(e.to_string()))?;
            let input_tensor =
                Value::from_array(input).map_err(|e| PipelineError::prediction(e.to_string()))?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![input_tensor])
                .map_err(|e| PipelineError::prediction(format!("ONNX inference failed: {}", e)))?;

            let output = outputs.get(&self.output_name).ok_or_else(|| {
                PipelineError::prediction(format!("model output '{}' missing", self.output_name))
            })?;
            let tensor_data = output
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::prediction(e.to_string()))?;

            let prediction = tensor_data.1.first().copied();
            prediction
                .map(|y| y as f64)
                .ok_or_else(|| PipelineError::prediction("model returned an empty tensor"))
        }
    }

    impl Artifact for OnnxRegressor {
        const KIND: &'static str = "regressor";

        fn read(path: &Path) -> anyhow::Result<Self> {
            OnnxRegressor::load(path)
        }
    }
}
