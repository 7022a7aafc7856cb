//! Feature-selection support mask.
//!
//! The mask was fit on the concatenated feature vector; its width is the single
//! most fragile joint of the pipeline. Any drift in block order or vocabulary size
//! changes the assembled width, so the width is checked explicitly on every call.

use super::{read_json, Artifact};
use crate::error::{PipelineError, Result};
use crate::features::FeatureVector;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk forms of a support mask.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaskRepr {
    /// One boolean per input feature.
    Support { support: Vec<bool> },
    /// Selected column indices plus the total input width.
    Indices {
        n_features_in: usize,
        indices: Vec<usize>,
    },
}

/// Boolean mask over the concatenated feature vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MaskRepr", into = "MaskRepr")]
pub struct SupportMask {
    support: Vec<bool>,
    selected: Vec<usize>,
}

impl SupportMask {
    /// Mask from one boolean per feature.
    pub fn from_support(support: Vec<bool>) -> Self {
        let selected = support
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        Self { support, selected }
    }

    /// Mask from selected indices over `n_features_in` columns.
    pub fn from_indices(n_features_in: usize, indices: &[usize]) -> std::result::Result<Self, String> {
        let mut support = vec![false; n_features_in];
        for &i in indices {
            if i >= n_features_in {
                return Err(format!(
                    "selected index {} out of range for {} features",
                    i, n_features_in
                ));
            }
            support[i] = true;
        }
        Ok(Self::from_support(support))
    }

    /// Mask keeping every one of `width` features.
    pub fn all(width: usize) -> Self {
        Self::from_support(vec![true; width])
    }

    /// Width of the vector the mask was fit on.
    pub fn width(&self) -> usize {
        self.support.len()
    }

    /// Number of features kept; equals the selected vector width.
    pub fn n_selected(&self) -> usize {
        self.selected.len()
    }

    /// Kept column indices, ascending.
    pub fn selected_indices(&self) -> &[usize] {
        &self.selected
    }

    /// Boolean support.
    pub fn support(&self) -> &[bool] {
        &self.support
    }

    /// Restrict a feature vector to the kept columns.
    ///
    /// Fails with `FeatureCountMismatch` instead of indexing out of range when
    /// the assembled width differs from the mask width.
    pub fn apply(&self, features: &FeatureVector) -> Result<Array1<f64>> {
        if features.width() != self.width() {
            return Err(PipelineError::FeatureCountMismatch {
                expected: self.width(),
                actual: features.width(),
            });
        }

        let values = features.values();
        Ok(self.selected.iter().map(|&i| values[i]).collect())
    }
}

impl TryFrom<MaskRepr> for SupportMask {
    type Error = String;

    fn try_from(repr: MaskRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            MaskRepr::Support { support } => Ok(Self::from_support(support)),
            MaskRepr::Indices {
                n_features_in,
                indices,
            } => Self::from_indices(n_features_in, &indices),
        }
    }
}

impl From<SupportMask> for MaskRepr {
    fn from(mask: SupportMask) -> Self {
        MaskRepr::Support {
            support: mask.support,
        }
    }
}

impl Artifact for SupportMask {
    const KIND: &'static str = "selector";

    fn read(path: &Path) -> anyhow::Result<Self> {
        let mask: SupportMask = read_json(path)?;
        if mask.n_selected() == 0 {
            anyhow::bail!("support mask selects no features");
        }
        Ok(mask)
    }
}
