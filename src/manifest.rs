//! Pipeline manifest: the versioned feature contract bundled with an artifact set.
//!
//! The fitted artifacts only work with the exact numeric field order, categorical
//! codes, concatenation layout and target transform used when they were trained.
//! The manifest records that contract as data next to the artifacts so the serving
//! code never has to guess feature counts.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// File name of the manifest inside an asset directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Schema version of the gradient-boosting pipeline shipped by default.
pub const DEFAULT_SCHEMA_VERSION: &str = "artisan-gbr-v1";

/// At most one vectorizer each for description, details and materials.
pub const MAX_TEXT_BLOCKS: usize = 3;

/// A numeric input column, in the order the scaler was fit on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NumericField {
    /// Plain number; missing values become `default`.
    Number {
        name: String,
        #[serde(default)]
        default: f64,
    },
    /// Label mapped through a fixed table agreed upon at training time.
    Categorical {
        name: String,
        codes: BTreeMap<String, i64>,
        default_code: i64,
    },
}

impl NumericField {
    /// Name of the raw input field this column reads.
    pub fn name(&self) -> &str {
        match self {
            NumericField::Number { name, .. } => name,
            NumericField::Categorical { name, .. } => name,
        }
    }
}

/// One block of the concatenated feature vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum LayoutBlock {
    /// The scaled numeric sub-vector.
    Numeric,
    /// A text field passed through its dedicated vectorizer artifact.
    Text { field: String, vectorizer: String },
}

/// Serialization format of the regressor artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressorFormat {
    /// ONNX graph executed by ONNX Runtime (tree ensembles).
    Onnx,
    /// Linear model exported as JSON coefficients.
    Linear,
}

/// Regressor artifact file and its format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressorSource {
    pub file: String,
    pub format: RegressorFormat,
}

/// Artifact file names, relative to the asset directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFiles {
    pub scaler: String,
    pub selector: String,
    pub regressor: RegressorSource,
}

/// Inverse of the transform applied to the price target during training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSpec {
    /// Target was `log1p(price)`; inverse is `exp(x) - 1`.
    Expm1,
    /// Target was scaled by a one-column scaler artifact; inverse is its `inverse_transform`.
    InverseScale { scaler: String },
}

/// The feature and inference contract of one trained pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineManifest {
    /// Version tag of the contract the artifacts were trained against.
    pub schema_version: String,

    /// Numeric columns in scaler order.
    pub numeric_fields: Vec<NumericField>,

    /// Concatenation order of the feature blocks.
    pub layout: Vec<LayoutBlock>,

    /// Artifact file names.
    pub artifacts: ArtifactFiles,

    /// Target inverse transform.
    pub target: TargetSpec,

    /// Minimum price ever returned.
    #[serde(default = "default_price_floor")]
    pub price_floor: f64,

    /// Currency label used for display.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_price_floor() -> f64 {
    1.0
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for PipelineManifest {
    fn default() -> Self {
        let codes = BTreeMap::from([
            ("Luxury".to_string(), 0),
            ("Mid-Range".to_string(), 1),
            ("Budget".to_string(), 2),
        ]);

        Self {
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            numeric_fields: vec![
                NumericField::Number {
                    name: "production_time".to_string(),
                    default: 0.0,
                },
                NumericField::Categorical {
                    name: "target_market".to_string(),
                    codes,
                    default_code: 1, // Mid-Range
                },
            ],
            layout: vec![
                LayoutBlock::Numeric,
                LayoutBlock::Text {
                    field: "description".to_string(),
                    vectorizer: "tfidf_vectorizer_desc.json".to_string(),
                },
                LayoutBlock::Text {
                    field: "details".to_string(),
                    vectorizer: "count_vectorizer_details.json".to_string(),
                },
                LayoutBlock::Text {
                    field: "materials".to_string(),
                    vectorizer: "count_vectorizer_materials.json".to_string(),
                },
            ],
            artifacts: ArtifactFiles {
                scaler: "minmax_scaler.json".to_string(),
                selector: "feature_selector.json".to_string(),
                regressor: RegressorSource {
                    file: "best_gbr_model.onnx".to_string(),
                    format: RegressorFormat::Onnx,
                },
            },
            target: TargetSpec::Expm1,
            price_floor: default_price_floor(),
            currency: default_currency(),
        }
    }
}

impl PipelineManifest {
    /// Read and validate a manifest from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| MANIFEST_FILE.to_string());
            return Err(PipelineError::AssetMissing {
                name,
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::manifest(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a manifest from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(raw)
            .map_err(|e| PipelineError::manifest(format!("malformed manifest: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the contract for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version.trim().is_empty() {
            return Err(PipelineError::manifest("schema_version must not be empty"));
        }

        let numeric_blocks = self
            .layout
            .iter()
            .filter(|b| matches!(b, LayoutBlock::Numeric))
            .count();
        if numeric_blocks != 1 {
            return Err(PipelineError::manifest(format!(
                "layout must contain exactly one numeric block, found {}",
                numeric_blocks
            )));
        }

        let text_blocks = self.text_fields().count();
        if text_blocks > MAX_TEXT_BLOCKS {
            return Err(PipelineError::manifest(format!(
                "layout declares {} text blocks, at most {} are supported",
                text_blocks, MAX_TEXT_BLOCKS
            )));
        }

        let mut seen = HashSet::new();
        let names = self
            .numeric_fields
            .iter()
            .map(NumericField::name)
            .chain(self.text_fields().map(|(field, _)| field));
        for name in names {
            if !seen.insert(name) {
                return Err(PipelineError::manifest(format!(
                    "field '{}' is declared more than once",
                    name
                )));
            }
        }

        for field in &self.numeric_fields {
            match field {
                NumericField::Number { name, default } if !default.is_finite() => {
                    return Err(PipelineError::manifest(format!(
                        "default for '{}' must be finite",
                        name
                    )));
                }
                NumericField::Categorical {
                    name,
                    codes,
                    default_code,
                } if !codes.values().any(|c| c == default_code) => {
                    return Err(PipelineError::manifest(format!(
                        "default code {} for '{}' is not one of its codes",
                        default_code, name
                    )));
                }
                _ => {}
            }
        }

        if !self.price_floor.is_finite() || self.price_floor < 0.0 {
            return Err(PipelineError::manifest(format!(
                "price_floor must be a non-negative number, got {}",
                self.price_floor
            )));
        }

        Ok(())
    }

    /// Text blocks in layout order as `(field, vectorizer file)`.
    pub fn text_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.layout.iter().filter_map(|block| match block {
            LayoutBlock::Text { field, vectorizer } => Some((field.as_str(), vectorizer.as_str())),
            LayoutBlock::Numeric => None,
        })
    }

    /// Every artifact file the manifest references, in load order.
    pub fn artifact_names(&self) -> Vec<&str> {
        let mut names = vec![
            self.artifacts.scaler.as_str(),
            self.artifacts.selector.as_str(),
        ];
        names.extend(self.text_fields().map(|(_, vectorizer)| vectorizer));
        names.push(self.artifacts.regressor.file.as_str());
        if let TargetSpec::InverseScale { scaler } = &self.target {
            names.push(scaler.as_str());
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest_is_valid() {
        let manifest = PipelineManifest::default();
        manifest.validate().unwrap();

        assert_eq!(manifest.numeric_fields.len(), 2);
        assert_eq!(manifest.numeric_fields[0].name(), "production_time");
        assert_eq!(manifest.text_fields().count(), 3);
        assert_eq!(manifest.target, TargetSpec::Expm1);
        assert_eq!(manifest.price_floor, 1.0);
        assert_eq!(manifest.artifact_names().len(), 6);
    }

    #[test]
    fn test_manifest_json_roundtrip_preserves_layout_order() {
        let manifest = PipelineManifest::default();
        let json = serde_json::to_string(&manifest).unwrap();
        let parsed = PipelineManifest::from_json(&json).unwrap();

        let fields: Vec<&str> = parsed.text_fields().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["description", "details", "materials"]);
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_manifest_from_minimal_json() {
        let raw = r#"{
            "schema_version": "rating-v2",
            "numeric_fields": [
                {"kind": "number", "name": "rating"},
                {"kind": "number", "name": "sales", "default": 0.0}
            ],
            "layout": [
                {"block": "text", "field": "description", "vectorizer": "desc.json"},
                {"block": "numeric"}
            ],
            "artifacts": {
                "scaler": "scaler.json",
                "selector": "selector.json",
                "regressor": {"file": "model.json", "format": "linear"}
            },
            "target": {"kind": "inverse_scale", "scaler": "target.json"}
        }"#;

        let manifest = PipelineManifest::from_json(raw).unwrap();
        assert_eq!(manifest.price_floor, 1.0);
        assert_eq!(manifest.currency, "USD");
        assert_eq!(manifest.layout[1], LayoutBlock::Numeric);
        assert_eq!(
            manifest.artifact_names(),
            vec!["scaler.json", "selector.json", "desc.json", "model.json", "target.json"]
        );
    }

    #[test]
    fn test_layout_without_numeric_block_is_rejected() {
        let mut manifest = PipelineManifest::default();
        manifest.layout.retain(|b| !matches!(b, LayoutBlock::Numeric));

        let err = manifest.validate().unwrap_err();
        assert!(matches!(err, PipelineError::Manifest { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_duplicate_field_is_rejected() {
        let mut manifest = PipelineManifest::default();
        manifest.layout.push(LayoutBlock::Text {
            field: "description".to_string(),
            vectorizer: "other.json".to_string(),
        });
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_default_code_must_be_known() {
        let mut manifest = PipelineManifest::default();
        if let NumericField::Categorical { default_code, .. } = &mut manifest.numeric_fields[1] {
            *default_code = 7;
        }
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_negative_floor_is_rejected() {
        let manifest = PipelineManifest {
            price_floor: -1.0,
            ..PipelineManifest::default()
        };
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_missing_manifest_file() {
        let err = PipelineManifest::from_file("/nonexistent/manifest.json").unwrap_err();
        assert!(err.is_fatal());
        match err {
            PipelineError::AssetMissing { name, path } => {
                assert_eq!(name, "manifest.json");
                assert_eq!(path, Path::new("/nonexistent/manifest.json"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
