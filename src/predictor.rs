//! Price prediction inference interface.
//!
//! Provides the main [`PricePredictor`], which turns one raw product record into
//! a price: scale numeric columns, vectorize text fields, concatenate in the
//! manifest layout, apply the selection mask, run the regressor and invert the
//! target transform.

use crate::artifacts::{ArtifactSet, AssetStore, Scaler};
use crate::error::{PipelineError, Result};
use crate::features::{
    assemble_numeric, EncodedCategory, FeatureVector, FeatureVectorBuilder, RawInput,
};
use crate::manifest::{LayoutBlock, PipelineManifest, TargetSpec, MANIFEST_FILE};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Name of the numeric block inside an assembled feature vector.
pub const NUMERIC_SEGMENT: &str = "numeric";

/// Inverse of the transform applied to the training target.
#[derive(Debug, Clone)]
pub enum TargetTransform {
    /// `exp(x) - 1`, inverse of `log1p(price)`.
    Expm1,
    /// Inverse of a one-column target scaler.
    InverseScale(Arc<dyn Scaler>),
}

impl TargetTransform {
    /// Convert a regressor output back to currency units.
    pub fn inverse(&self, y: f64) -> Result<f64> {
        match self {
            TargetTransform::Expm1 => Ok(y.exp_m1()),
            TargetTransform::InverseScale(scaler) => Ok(scaler.inverse_transform(&[y])?[0]),
        }
    }

    /// Apply the training-time forward transform to a price.
    pub fn forward(&self, price: f64) -> Result<f64> {
        match self {
            TargetTransform::Expm1 => Ok(price.ln_1p()),
            TargetTransform::InverseScale(scaler) => Ok(scaler.transform(&[price])?[0]),
        }
    }
}

/// A price in currency units, never below the pipeline floor.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct PredictedPrice(f64);

impl PredictedPrice {
    /// Clamp a raw price to `floor`.
    pub fn with_floor(price: f64, floor: f64) -> Self {
        Self(price.max(floor))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for PredictedPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_amount(self.0))
    }
}

/// Format with two decimals and thousands separators, e.g. `12,345.68`.
pub fn format_amount(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && fixed.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, frac_part)
}

/// A price plus the trace of how it was produced.
#[derive(Debug, Clone, Serialize)]
pub struct PricePrediction {
    /// Final price, floor applied
    pub price: PredictedPrice,

    /// Currency label from the manifest
    pub currency: String,

    /// Regressor output in its native target space
    pub raw_output: f64,

    /// Price before the floor was applied
    pub unclamped_price: f64,

    /// Whether the floor raised the price
    pub clamped: bool,

    /// Width of the assembled feature vector
    pub feature_width: usize,

    /// Width after selection
    pub selected_width: usize,

    /// Categorical encodings applied to this record
    pub encodings: Vec<EncodedCategory>,

    /// Manifest schema version
    pub schema_version: String,
}

impl fmt::Display for PricePrediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.price, self.currency)
    }
}

/// Feature assembly and inference over a loaded artifact set.
///
/// Holds only immutable state; `predict` takes `&self` and may be called from
/// many threads at once.
#[derive(Debug, Clone)]
pub struct PricePredictor {
    manifest: PipelineManifest,
    artifacts: ArtifactSet,
    target: TargetTransform,
}

impl PricePredictor {
    /// Build a predictor from a manifest and an already loaded artifact set.
    ///
    /// # Errors
    ///
    /// `Manifest` when the manifest is invalid or the artifact set lacks a
    /// vectorizer or target scaler the manifest requires.
    pub fn new(manifest: PipelineManifest, artifacts: ArtifactSet) -> Result<Self> {
        manifest.validate()?;

        for (field, _) in manifest.text_fields() {
            if !artifacts.vectorizers.contains_key(field) {
                return Err(PipelineError::manifest(format!(
                    "no vectorizer loaded for text field '{}'",
                    field
                )));
            }
        }

        let target = match &manifest.target {
            TargetSpec::Expm1 => TargetTransform::Expm1,
            TargetSpec::InverseScale { scaler } => {
                let target_scaler = artifacts.target_scaler.clone().ok_or_else(|| {
                    PipelineError::manifest(format!("target scaler '{}' is not loaded", scaler))
                })?;
                if target_scaler.n_features_in() != 1 {
                    return Err(PipelineError::manifest(format!(
                        "target scaler '{}' has {} columns, expected 1",
                        scaler,
                        target_scaler.n_features_in()
                    )));
                }
                TargetTransform::InverseScale(target_scaler)
            }
        };

        let predictor = Self {
            manifest,
            artifacts,
            target,
        };
        predictor.warn_on_drift();
        Ok(predictor)
    }

    /// Read `manifest.json` from `dir` and load the artifact set it names.
    ///
    /// # Example
    /// ```no_run
    /// use artisan_inference::{PricePredictor, RawInput};
    ///
    /// let predictor = PricePredictor::from_dir("models").unwrap();
    /// let raw = RawInput::new()
    ///     .with_text("description", "A hand-knitted woolen scarf, extra long.")
    ///     .with_number("production_time", 1.0)
    ///     .with_text("target_market", "Luxury");
    /// let price = predictor.predict(&raw).unwrap();
    /// println!("{price} USD");
    /// ```
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest = PipelineManifest::from_file(dir.join(MANIFEST_FILE))?;
        let store = AssetStore::new(dir);
        let artifacts = store.load_artifact_set(&manifest)?;
        Self::new(manifest, artifacts)
    }

    /// The contract this predictor serves.
    pub fn manifest(&self) -> &PipelineManifest {
        &self.manifest
    }

    /// The loaded artifacts.
    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    /// The target inverse transform in use.
    pub fn target(&self) -> &TargetTransform {
        &self.target
    }

    /// Width the assembled feature vector will have for any input.
    ///
    /// Depends only on the numeric field count and the vectorizer vocabularies.
    pub fn expected_feature_width(&self) -> usize {
        let text: usize = self
            .manifest
            .text_fields()
            .filter_map(|(field, _)| self.artifacts.vectorizers.get(field))
            .map(|v| v.vocabulary_size())
            .sum();
        self.manifest.numeric_fields.len() + text
    }

    /// Predict a price for one record.
    pub fn predict(&self, raw: &RawInput) -> Result<PredictedPrice> {
        self.predict_detailed(raw).map(|p| p.price)
    }

    /// Predict a price and return the diagnostic trace alongside it.
    pub fn predict_detailed(&self, raw: &RawInput) -> Result<PricePrediction> {
        let (features, encodings) = self.assemble(raw)?;

        let selector = &self.artifacts.selector;
        let selected = selector.apply(&features).map_err(|e| {
            warn!(
                expected = selector.width(),
                actual = features.width(),
                layout = %features.describe_layout(),
                schema = %self.manifest.schema_version,
                "Assembled features do not match the selector mask"
            );
            e
        })?;
        debug!(selected = selected.len(), "Applied feature selection");

        let regressor = &self.artifacts.regressor;
        if let Some(expected) = regressor.n_features_in() {
            if expected != selected.len() {
                return Err(PipelineError::prediction(format!(
                    "regressor expects {} features, selector produced {}",
                    expected,
                    selected.len()
                )));
            }
        }

        let raw_output = regressor.predict(selected.view())?;
        if !raw_output.is_finite() {
            return Err(PipelineError::prediction(format!(
                "regressor returned a non-finite value ({})",
                raw_output
            )));
        }

        let unclamped_price = self.target.inverse(raw_output)?;
        if !unclamped_price.is_finite() {
            return Err(PipelineError::prediction(format!(
                "inverse target transform of {} is not finite",
                raw_output
            )));
        }

        let price = PredictedPrice::with_floor(unclamped_price, self.manifest.price_floor);
        let clamped = unclamped_price < self.manifest.price_floor;
        debug!(
            raw_output,
            unclamped_price,
            price = price.value(),
            clamped,
            "Prediction complete"
        );

        Ok(PricePrediction {
            price,
            currency: self.manifest.currency.clone(),
            raw_output,
            unclamped_price,
            clamped,
            feature_width: features.width(),
            selected_width: selected.len(),
            encodings,
            schema_version: self.manifest.schema_version.clone(),
        })
    }

    /// Build the full feature vector for one record, before selection.
    pub fn assemble(&self, raw: &RawInput) -> Result<(FeatureVector, Vec<EncodedCategory>)> {
        let numeric = assemble_numeric(&self.manifest.numeric_fields, raw)?;
        let scaled = self.artifacts.scaler.transform(&numeric.values)?;
        debug!(columns = scaled.len(), "Scaled numeric features");

        let mut builder = FeatureVectorBuilder::new();
        for block in &self.manifest.layout {
            match block {
                LayoutBlock::Numeric => {
                    builder.push_dense(NUMERIC_SEGMENT, &scaled.to_vec());
                }
                LayoutBlock::Text { field, .. } => {
                    let vectorizer = self.artifacts.vectorizers.get(field).ok_or_else(|| {
                        PipelineError::manifest(format!("no vectorizer for text field '{}'", field))
                    })?;
                    let text = raw.text(field).unwrap_or_default();
                    let block = vectorizer.transform(&text);
                    debug!(field = %field, nnz = block.nnz(), "Vectorized text field");
                    builder.push_sparse(field.as_str(), &block);
                }
            }
        }

        let features = builder.build();
        debug!(width = features.width(), layout = %features.describe_layout(), "Assembled features");
        Ok((features, numeric.encodings))
    }

    fn warn_on_drift(&self) {
        let n_numeric = self.manifest.numeric_fields.len();
        let scaler_width = self.artifacts.scaler.n_features_in();
        if scaler_width != n_numeric {
            warn!(
                scaler_width,
                numeric_fields = n_numeric,
                "Scaler width disagrees with declared numeric fields"
            );
        }

        let selector = &self.artifacts.selector;
        let expected = self.expected_feature_width();
        if selector.width() != expected {
            warn!(
                selector_width = selector.width(),
                assembled_width = expected,
                "Selector mask width disagrees with the assembled feature width"
            );
        }

        if let Some(n) = self.artifacts.regressor.n_features_in() {
            if n != selector.n_selected() {
                warn!(
                    regressor_width = n,
                    selected = selector.n_selected(),
                    "Regressor width disagrees with the selector output"
                );
            }
        }
    }
}
