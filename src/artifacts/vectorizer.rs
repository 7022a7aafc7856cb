//! Fitted text vectorizers: term counts and TF-IDF over a fixed vocabulary.
//!
//! Analysis mirrors the offline word analyzer: optional lowercasing, tokens from
//! a regex (default: runs of two or more word characters), stop-word removal,
//! then word n-grams joined by a single space. Terms outside the learned
//! vocabulary are ignored.

use super::{read_json, Artifact, Vectorizer};
use crate::features::SparseVector;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Token pattern used by the offline vectorizers unless overridden.
pub const DEFAULT_TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

/// [`DEFAULT_TOKEN_PATTERN`] with the offline word class spelled out.
///
/// The offline `\w` covers letters, digits and underscore only, while the
/// `regex` crate's `\w` (and hence `\b`) also covers combining marks. Runs of
/// two or more offline word characters are exactly the default tokens.
const DEFAULT_TOKEN_REGEX: &str = r"[\p{L}\p{N}_]{2,}";

fn compile_token_pattern(pattern: &str) -> anyhow::Result<Regex> {
    let source = if pattern == DEFAULT_TOKEN_PATTERN || pattern == r"\b\w\w+\b" {
        DEFAULT_TOKEN_REGEX
    } else {
        pattern
    };
    Regex::new(source).map_err(|e| anyhow::anyhow!("invalid token pattern '{}': {}", pattern, e))
}

fn default_true() -> bool {
    true
}

fn default_token_pattern() -> String {
    DEFAULT_TOKEN_PATTERN.to_string()
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

/// Row normalization applied after TF-IDF weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Norm {
    L1,
    L2,
}

/// How term occurrences become vector values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Weighting {
    /// Raw term counts, or presence flags when `binary`.
    Count {
        #[serde(default)]
        binary: bool,
    },
    /// Term frequency times inverse document frequency, then row-normalized.
    Tfidf {
        idf: Vec<f64>,
        #[serde(default = "default_norm")]
        norm: Option<Norm>,
        #[serde(default)]
        sublinear_tf: bool,
        #[serde(default)]
        binary: bool,
    },
}

/// Serialized form of a fitted vectorizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerSpec {
    /// Term to column index
    pub vocabulary: HashMap<String, usize>,

    #[serde(default = "default_true")]
    pub lowercase: bool,

    #[serde(default = "default_token_pattern")]
    pub token_pattern: String,

    #[serde(default)]
    pub stop_words: Vec<String>,

    /// Inclusive word n-gram range
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),

    pub weighting: Weighting,
}

impl VectorizerSpec {
    /// Count vectorizer over the given terms, indexed in order.
    pub fn count<S: AsRef<str>>(terms: &[S]) -> Self {
        Self {
            vocabulary: index_terms(terms),
            lowercase: true,
            token_pattern: default_token_pattern(),
            stop_words: Vec::new(),
            ngram_range: default_ngram_range(),
            weighting: Weighting::Count { binary: false },
        }
    }

    /// L2-normalized TF-IDF vectorizer over the given terms and idf weights.
    pub fn tfidf<S: AsRef<str>>(terms: &[S], idf: Vec<f64>) -> Self {
        Self {
            weighting: Weighting::Tfidf {
                idf,
                norm: default_norm(),
                sublinear_tf: false,
                binary: false,
            },
            ..Self::count(terms)
        }
    }
}

fn index_terms<S: AsRef<str>>(terms: &[S]) -> HashMap<String, usize> {
    terms
        .iter()
        .enumerate()
        .map(|(i, t)| (t.as_ref().to_string(), i))
        .collect()
}

/// A vectorizer ready for inference: validated spec plus compiled tokenizer.
#[derive(Debug, Clone)]
pub struct FittedVectorizer {
    vocabulary: HashMap<String, usize>,
    lowercase: bool,
    token_regex: Regex,
    stop_words: HashSet<String>,
    ngram_range: (usize, usize),
    weighting: Weighting,
}

impl FittedVectorizer {
    /// Validate a spec and compile its token pattern.
    pub fn from_spec(spec: VectorizerSpec) -> anyhow::Result<Self> {
        let width = spec.vocabulary.len();
        if width == 0 {
            anyhow::bail!("vocabulary is empty");
        }

        let mut seen = vec![false; width];
        for (term, &index) in &spec.vocabulary {
            if index >= width {
                anyhow::bail!(
                    "term '{}' has index {} outside vocabulary of {} terms",
                    term,
                    index,
                    width
                );
            }
            if std::mem::replace(&mut seen[index], true) {
                anyhow::bail!("vocabulary index {} is assigned to more than one term", index);
            }
        }

        let (min_n, max_n) = spec.ngram_range;
        if min_n == 0 || min_n > max_n {
            anyhow::bail!("invalid ngram_range ({}, {})", min_n, max_n);
        }

        if let Weighting::Tfidf { idf, .. } = &spec.weighting {
            if idf.len() != width {
                anyhow::bail!(
                    "idf has {} weights but vocabulary has {} terms",
                    idf.len(),
                    width
                );
            }
            if idf.iter().any(|w| !w.is_finite()) {
                anyhow::bail!("idf contains non-finite weights");
            }
        }

        let token_regex = compile_token_pattern(&spec.token_pattern)?;

        Ok(Self {
            vocabulary: spec.vocabulary,
            lowercase: spec.lowercase,
            token_regex,
            stop_words: spec.stop_words.into_iter().collect(),
            ngram_range: spec.ngram_range,
            weighting: spec.weighting,
        })
    }

    /// Analyze a document into the terms that would be looked up in the vocabulary.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        let text = if self.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        let tokens: Vec<&str> = self
            .token_regex
            .find_iter(&text)
            .map(|m| m.as_str())
            .filter(|t| !self.stop_words.contains(*t))
            .collect();

        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n.min(tokens.len()) {
            for window in tokens.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }

    /// Raw term counts keyed by column.
    fn count_terms(&self, text: &str) -> Vec<(usize, f64)> {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for term in self.analyze(text) {
            if let Some(&index) = self.vocabulary.get(&term) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }
        counts.into_iter().collect()
    }
}

impl Vectorizer for FittedVectorizer {
    fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    fn transform(&self, text: &str) -> SparseVector {
        let width = self.vocabulary_size();
        if text.trim().is_empty() {
            return SparseVector::zeros(width);
        }

        let mut vector = SparseVector::from_entries(width, self.count_terms(text));

        match &self.weighting {
            Weighting::Count { binary } => {
                if *binary {
                    vector.map_values(|_, _| 1.0);
                }
            }
            Weighting::Tfidf {
                idf,
                norm,
                sublinear_tf,
                binary,
            } => {
                vector.map_values(|i, tf| {
                    let tf = if *binary {
                        1.0
                    } else if *sublinear_tf {
                        1.0 + tf.ln()
                    } else {
                        tf
                    };
                    tf * idf[i]
                });

                let total = match norm {
                    Some(Norm::L2) => vector.entries().iter().map(|(_, v)| v * v).sum::<f64>().sqrt(),
                    Some(Norm::L1) => vector.entries().iter().map(|(_, v)| v.abs()).sum::<f64>(),
                    None => 1.0,
                };
                if total > 0.0 {
                    vector.map_values(|_, v| v / total);
                }
            }
        }

        vector
    }
}

impl Artifact for FittedVectorizer {
    const KIND: &'static str = "vectorizer";

    fn read(path: &Path) -> anyhow::Result<Self> {
        let spec: VectorizerSpec = read_json(path)?;
        FittedVectorizer::from_spec(spec)
    }
}
