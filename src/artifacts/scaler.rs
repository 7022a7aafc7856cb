//! Fitted numeric scalers.
//!
//! Parameters follow the fitted attributes of the offline scalers:
//! min-max scaling computes `x * scale + min` (optionally clipped to the feature
//! range), standard scaling computes `(x - mean) / scale`.

use super::{read_json, Artifact, Scaler};
use crate::error::{PipelineError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_feature_range() -> (f64, f64) {
    (0.0, 1.0)
}

/// A scaler fit offline, stored as its per-column parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedScaler {
    MinMax {
        min: Vec<f64>,
        scale: Vec<f64>,
        #[serde(default = "default_feature_range")]
        feature_range: (f64, f64),
        #[serde(default)]
        clip: bool,
    },
    Standard {
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
}

impl FittedScaler {
    /// Min-max scaler from fitted `min_`/`scale_` without clipping.
    pub fn min_max(min: Vec<f64>, scale: Vec<f64>) -> Self {
        FittedScaler::MinMax {
            min,
            scale,
            feature_range: default_feature_range(),
            clip: false,
        }
    }

    /// Standard scaler from fitted `mean_`/`scale_`.
    pub fn standard(mean: Vec<f64>, scale: Vec<f64>) -> Self {
        FittedScaler::Standard { mean, scale }
    }

    /// Check parameter shapes and values.
    pub fn validate(&self) -> anyhow::Result<()> {
        let (offsets, scale) = match self {
            FittedScaler::MinMax { min, scale, .. } => (min, scale),
            FittedScaler::Standard { mean, scale } => (mean, scale),
        };

        if scale.is_empty() {
            anyhow::bail!("scaler has no columns");
        }
        if offsets.len() != scale.len() {
            anyhow::bail!(
                "scaler parameter length mismatch: {} offsets vs {} scales",
                offsets.len(),
                scale.len()
            );
        }
        if let Some(i) = scale.iter().position(|s| !s.is_finite() || *s == 0.0) {
            anyhow::bail!("scale for column {} is zero or non-finite", i);
        }
        if let Some(i) = offsets.iter().position(|o| !o.is_finite()) {
            anyhow::bail!("offset for column {} is non-finite", i);
        }
        Ok(())
    }

    fn check_width(&self, row: &[f64]) -> Result<()> {
        let expected = self.n_features_in();
        if row.len() != expected {
            return Err(PipelineError::ScalingError {
                expected,
                actual: row.len(),
            });
        }
        Ok(())
    }
}

impl Scaler for FittedScaler {
    fn n_features_in(&self) -> usize {
        match self {
            FittedScaler::MinMax { scale, .. } => scale.len(),
            FittedScaler::Standard { scale, .. } => scale.len(),
        }
    }

    fn transform(&self, row: &[f64]) -> Result<Array1<f64>> {
        self.check_width(row)?;

        let out = match self {
            FittedScaler::MinMax {
                min,
                scale,
                feature_range,
                clip,
            } => row
                .iter()
                .zip(min.iter().zip(scale))
                .map(|(x, (m, s))| {
                    let v = x * s + m;
                    if *clip {
                        v.clamp(feature_range.0, feature_range.1)
                    } else {
                        v
                    }
                })
                .collect(),
            FittedScaler::Standard { mean, scale } => row
                .iter()
                .zip(mean.iter().zip(scale))
                .map(|(x, (m, s))| (x - m) / s)
                .collect(),
        };

        Ok(out)
    }

    fn inverse_transform(&self, row: &[f64]) -> Result<Array1<f64>> {
        self.check_width(row)?;

        let out = match self {
            FittedScaler::MinMax { min, scale, .. } => row
                .iter()
                .zip(min.iter().zip(scale))
                .map(|(x, (m, s))| (x - m) / s)
                .collect(),
            FittedScaler::Standard { mean, scale } => row
                .iter()
                .zip(mean.iter().zip(scale))
                .map(|(x, (m, s))| x * s + m)
                .collect(),
        };

        Ok(out)
    }
}

impl Artifact for FittedScaler {
    const KIND: &'static str = "scaler";

    fn read(path: &Path) -> anyhow::Result<Self> {
        let scaler: FittedScaler = read_json(path)?;
        scaler.validate()?;
        Ok(scaler)
    }
}
