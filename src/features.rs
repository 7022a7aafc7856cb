//! Feature assembly for model inputs.
//!
//! Turns one raw product record into the numeric columns the scaler expects and
//! concatenates scaled numeric and vectorized text blocks into the feature vector
//! the selector mask was fit on.
//!
//! **Critical for correctness**: column order, categorical codes and block order
//! must match the offline pipeline exactly to avoid train/serve skew.

use crate::error::{PipelineError, Result};
use crate::manifest::NumericField;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// A single scalar attribute of a raw record.
///
/// `Null` (JSON `null`) is treated exactly like an absent field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Null,
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// One raw product record as collected from the user.
///
/// Deserializes from a flat JSON object such as
/// `{"description": "Hand-knitted scarf", "production_time": 1.5}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawInput {
    fields: BTreeMap<String, FieldValue>,
}

impl RawInput {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of any field value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style insert of a text field.
    pub fn with_text(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(name, FieldValue::Text(value.into()))
    }

    /// Builder-style insert of a numeric field.
    pub fn with_number(self, name: impl Into<String>, value: f64) -> Self {
        self.with(name, FieldValue::Number(value))
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a field by name; `null` values read as missing.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .get(name)
            .filter(|v| !matches!(v, FieldValue::Null))
    }

    /// Field rendered as text; numbers are formatted, missing fields are `None`.
    pub fn text(&self, name: &str) -> Option<Cow<'_, str>> {
        match self.get(name)? {
            FieldValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            FieldValue::Number(n) => Some(Cow::Owned(n.to_string())),
            FieldValue::Null => None,
        }
    }

    /// Number of fields present.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// How a categorical field was encoded for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedCategory {
    /// Field name
    pub field: String,

    /// Label as received, if any
    pub label: Option<String>,

    /// Integer code fed to the scaler
    pub code: i64,

    /// True when the label was missing or unknown and the default code was used
    pub fell_back: bool,
}

/// Unscaled numeric columns plus the categorical encodings applied.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericFeatures {
    pub values: Vec<f64>,
    pub encodings: Vec<EncodedCategory>,
}

/// Map a label through a fixed enumeration table.
///
/// Labels are matched exactly, surrounding whitespace included. Returns the
/// code and whether the default was used.
pub fn encode_category(codes: &BTreeMap<String, i64>, default_code: i64, label: Option<&str>) -> (i64, bool) {
    match label.and_then(|l| codes.get(l)) {
        Some(&code) => (code, false),
        None => (default_code, true),
    }
}

/// Extract the declared numeric columns from a raw record, in declared order.
///
/// Missing numbers become the field default. Categorical labels go through
/// their table and fall back to the default code instead of failing.
pub fn assemble_numeric(fields: &[NumericField], raw: &RawInput) -> Result<NumericFeatures> {
    let mut values = Vec::with_capacity(fields.len());
    let mut encodings = Vec::new();

    for field in fields {
        match field {
            NumericField::Number { name, default } => {
                values.push(coerce_number(name, raw.get(name), *default)?);
            }
            NumericField::Categorical {
                name,
                codes,
                default_code,
            } => {
                let (label, code, fell_back) = match raw.get(name) {
                    // A numeric value that is already a known code is taken as-is.
                    Some(FieldValue::Number(n))
                        if n.fract() == 0.0 && codes.values().any(|&c| c as f64 == *n) =>
                    {
                        (Some(n.to_string()), *n as i64, false)
                    }
                    _ => {
                        let label = raw.text(name).map(Cow::into_owned);
                        let (code, fell_back) =
                            encode_category(codes, *default_code, label.as_deref());
                        (label, code, fell_back)
                    }
                };

                if fell_back {
                    warn!(
                        field = %name,
                        label = ?label,
                        code,
                        "Unrecognized category label, using default code"
                    );
                }

                values.push(code as f64);
                encodings.push(EncodedCategory {
                    field: name.clone(),
                    label,
                    code,
                    fell_back,
                });
            }
        }
    }

    Ok(NumericFeatures { values, encodings })
}

fn coerce_number(name: &str, value: Option<&FieldValue>, default: f64) -> Result<f64> {
    let number = match value {
        None | Some(FieldValue::Null) => return Ok(default),
        Some(FieldValue::Number(n)) => *n,
        Some(FieldValue::Text(s)) if s.trim().is_empty() => return Ok(default),
        Some(FieldValue::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| PipelineError::invalid_field(name, format!("'{}' is not a number", s)))?,
    };

    if !number.is_finite() {
        return Err(PipelineError::invalid_field(
            name,
            format!("{} is not a finite number", number),
        ));
    }
    Ok(number)
}

/// Fixed-width sparse vector as produced by a text vectorizer.
///
/// Entries are sorted by index and hold no duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    dim: usize,
    entries: Vec<(usize, f64)>,
}

impl SparseVector {
    /// All-zero vector of the given width.
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            entries: Vec::new(),
        }
    }

    /// Build from unordered `(index, value)` pairs, summing duplicates and dropping zeros.
    ///
    /// Indices at or beyond `dim` are discarded.
    pub fn from_entries(dim: usize, mut entries: Vec<(usize, f64)>) -> Self {
        entries.retain(|&(i, _)| i < dim);
        entries.sort_by_key(|&(i, _)| i);

        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(entries.len());
        for (i, v) in entries {
            match merged.last_mut() {
                Some((last, acc)) if *last == i => *acc += v,
                _ => merged.push((i, v)),
            }
        }
        merged.retain(|&(_, v)| v != 0.0);

        Self {
            dim,
            entries: merged,
        }
    }

    /// Declared width.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored non-zero entries.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Sorted non-zero entries.
    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    /// Check if every component is zero.
    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value at `index` (zero when not stored).
    pub fn get(&self, index: usize) -> f64 {
        self.entries
            .binary_search_by_key(&index, |&(i, _)| i)
            .map(|pos| self.entries[pos].1)
            .unwrap_or(0.0)
    }

    /// Apply `f` to every stored value in place.
    pub fn map_values(&mut self, mut f: impl FnMut(usize, f64) -> f64) {
        for (i, v) in self.entries.iter_mut() {
            *v = f(*i, *v);
        }
    }

    /// Dense copy.
    pub fn to_dense(&self) -> Array1<f64> {
        let mut dense = Array1::<f64>::zeros(self.dim);
        for &(i, v) in &self.entries {
            dense[i] = v;
        }
        dense
    }
}

/// Position of one block inside a concatenated feature vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureSegment {
    pub name: String,
    pub offset: usize,
    pub width: usize,
}

/// Concatenated feature vector with its block layout.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Array1<f64>,
    segments: Vec<FeatureSegment>,
}

impl FeatureVector {
    /// Total width.
    pub fn width(&self) -> usize {
        self.values.len()
    }

    /// Dense values.
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Blocks in concatenation order.
    pub fn segments(&self) -> &[FeatureSegment] {
        &self.segments
    }

    /// Values of one named block.
    pub fn segment_values(&self, name: &str) -> Option<ndarray::ArrayView1<'_, f64>> {
        let seg = self.segments.iter().find(|s| s.name == name)?;
        Some(
            self.values
                .slice(ndarray::s![seg.offset..seg.offset + seg.width]),
        )
    }

    /// Human-readable layout such as `numeric[0..2] description[2..1002]`.
    pub fn describe_layout(&self) -> String {
        self.segments
            .iter()
            .map(|s| format!("{}[{}..{}]", s.name, s.offset, s.offset + s.width))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeatureVector(width={}, {})", self.width(), self.describe_layout())
    }
}

/// Horizontally stacks blocks into a [`FeatureVector`].
///
/// Purely structural: values are copied into place, nothing is computed.
#[derive(Debug, Default)]
pub struct FeatureVectorBuilder {
    values: Vec<f64>,
    segments: Vec<FeatureSegment>,
}

impl FeatureVectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a dense block.
    pub fn push_dense(&mut self, name: impl Into<String>, block: &[f64]) -> &mut Self {
        self.segments.push(FeatureSegment {
            name: name.into(),
            offset: self.values.len(),
            width: block.len(),
        });
        self.values.extend_from_slice(block);
        self
    }

    /// Append a sparse block, densified.
    pub fn push_sparse(&mut self, name: impl Into<String>, block: &SparseVector) -> &mut Self {
        let offset = self.values.len();
        self.segments.push(FeatureSegment {
            name: name.into(),
            offset,
            width: block.dim(),
        });
        self.values.resize(offset + block.dim(), 0.0);
        for &(i, v) in block.entries() {
            self.values[offset + i] = v;
        }
        self
    }

    /// Finish the vector.
    pub fn build(self) -> FeatureVector {
        FeatureVector {
            values: Array1::from(self.values),
            segments: self.segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PipelineManifest;

    fn market_codes() -> BTreeMap<String, i64> {
        BTreeMap::from([
            ("Luxury".to_string(), 0),
            ("Mid-Range".to_string(), 1),
            ("Budget".to_string(), 2),
        ])
    }

    #[test]
    fn test_encode_category_known_and_unknown() {
        let codes = market_codes();
        assert_eq!(encode_category(&codes, 1, Some("Luxury")), (0, false));
        assert_eq!(encode_category(&codes, 1, Some("Budget")), (2, false));
        assert_eq!(encode_category(&codes, 1, Some(" Luxury")), (1, true));
        assert_eq!(encode_category(&codes, 1, Some("luxury")), (1, true));
        assert_eq!(encode_category(&codes, 1, Some("Artisanal")), (1, true));
        assert_eq!(encode_category(&codes, 1, None), (1, true));
    }

    #[test]
    fn test_assemble_numeric_default_manifest() {
        let manifest = PipelineManifest::default();
        let raw = RawInput::new()
            .with_number("production_time", 1.0)
            .with_text("target_market", "Mid-Range");

        let numeric = assemble_numeric(&manifest.numeric_fields, &raw).unwrap();
        assert_eq!(numeric.values, vec![1.0, 1.0]);
        assert_eq!(numeric.encodings.len(), 1);
        assert_eq!(numeric.encodings[0].code, 1);
        assert!(!numeric.encodings[0].fell_back);
    }

    #[test]
    fn test_assemble_numeric_unknown_label_falls_back() {
        let manifest = PipelineManifest::default();
        let raw = RawInput::new()
            .with_number("production_time", 3.5)
            .with_text("target_market", "Ultra-Premium");

        let numeric = assemble_numeric(&manifest.numeric_fields, &raw).unwrap();
        assert_eq!(numeric.values, vec![3.5, 1.0]);
        assert!(numeric.encodings[0].fell_back);
        assert_eq!(numeric.encodings[0].label.as_deref(), Some("Ultra-Premium"));
    }

    #[test]
    fn test_assemble_numeric_missing_fields_use_defaults() {
        let manifest = PipelineManifest::default();
        let numeric = assemble_numeric(&manifest.numeric_fields, &RawInput::new()).unwrap();
        assert_eq!(numeric.values, vec![0.0, 1.0]);
    }

    #[test]
    fn test_assemble_numeric_parses_text_numbers() {
        let manifest = PipelineManifest::default();
        let raw = RawInput::new()
            .with_text("production_time", " 2.5 ")
            .with_number("target_market", 2.0);

        let numeric = assemble_numeric(&manifest.numeric_fields, &raw).unwrap();
        assert_eq!(numeric.values, vec![2.5, 2.0]);
        assert!(!numeric.encodings[0].fell_back);
    }

    #[test]
    fn test_assemble_numeric_rejects_garbage() {
        let manifest = PipelineManifest::default();
        let raw = RawInput::new().with_text("production_time", "two hours");

        let err = assemble_numeric(&manifest.numeric_fields, &raw).unwrap_err();
        match err {
            PipelineError::InvalidField { field, .. } => assert_eq!(field, "production_time"),
            other => panic!("unexpected error: {other}"),
        }

        let raw = RawInput::new().with_number("production_time", f64::NAN);
        assert!(assemble_numeric(&manifest.numeric_fields, &raw).is_err());
    }

    #[test]
    fn test_raw_input_from_json() {
        let raw: RawInput = serde_json::from_str(
            r#"{"description": "Wool scarf", "production_time": 1.5, "target_market": "Luxury"}"#,
        )
        .unwrap();

        assert_eq!(raw.len(), 3);
        assert_eq!(raw.get("production_time"), Some(&FieldValue::Number(1.5)));
        assert_eq!(raw.text("description").as_deref(), Some("Wool scarf"));
        assert!(raw.text("materials").is_none());
    }

    #[test]
    fn test_null_fields_count_as_missing() {
        let raw: RawInput = serde_json::from_str(
            r#"{"description": null, "production_time": null, "target_market": null}"#,
        )
        .unwrap();

        assert_eq!(raw.len(), 3);
        assert!(raw.get("production_time").is_none());
        assert!(raw.text("description").is_none());

        let manifest = PipelineManifest::default();
        let numeric = assemble_numeric(&manifest.numeric_fields, &raw).unwrap();
        assert_eq!(numeric.values, vec![0.0, 1.0]);
        assert!(numeric.encodings[0].fell_back);
        assert!(numeric.encodings[0].label.is_none());
    }

    #[test]
    fn test_null_number_next_to_known_label() {
        let raw: RawInput =
            serde_json::from_str(r#"{"production_time": null, "target_market": "Luxury"}"#).unwrap();

        let manifest = PipelineManifest::default();
        let numeric = assemble_numeric(&manifest.numeric_fields, &raw).unwrap();
        assert_eq!(numeric.values, vec![0.0, 0.0]);
        assert!(!numeric.encodings[0].fell_back);
    }

    #[test]
    fn test_sparse_vector_merges_and_drops_out_of_range() {
        let v = SparseVector::from_entries(5, vec![(3, 1.0), (1, 2.0), (3, 1.0), (9, 4.0), (0, 0.0)]);
        assert_eq!(v.dim(), 5);
        assert_eq!(v.entries(), &[(1, 2.0), (3, 2.0)]);
        assert_eq!(v.get(3), 2.0);
        assert_eq!(v.get(4), 0.0);
        assert_eq!(v.to_dense().to_vec(), vec![0.0, 2.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_builder_concatenates_in_order() {
        let mut builder = FeatureVectorBuilder::new();
        builder
            .push_dense("numeric", &[0.5, 1.0])
            .push_sparse("description", &SparseVector::from_entries(3, vec![(2, 0.7)]))
            .push_sparse("details", &SparseVector::zeros(4));
        let fv = builder.build();

        assert_eq!(fv.width(), 9);
        assert_eq!(
            fv.values().to_vec(),
            vec![0.5, 1.0, 0.0, 0.0, 0.7, 0.0, 0.0, 0.0, 0.0]
        );
        assert_eq!(fv.describe_layout(), "numeric[0..2] description[2..5] details[5..9]");
        assert_eq!(fv.segment_values("description").unwrap().to_vec(), vec![0.0, 0.0, 0.7]);
        assert!(fv.segment_values("materials").is_none());
    }

    #[test]
    fn test_width_is_independent_of_content() {
        let build = |text: &SparseVector| {
            let mut b = FeatureVectorBuilder::new();
            b.push_dense("numeric", &[1.0, 1.0]).push_sparse("description", text);
            b.build().width()
        };
        let empty = SparseVector::zeros(100);
        let full = SparseVector::from_entries(100, (0..100).map(|i| (i, 1.0)).collect());
        assert_eq!(build(&empty), build(&full));
    }
}
