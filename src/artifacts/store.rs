//! Asset store: resolves artifact files under a base directory and caches them.
//!
//! Each artifact is decoded at most once per store; later loads return the same
//! `Arc`. Loading an artifact set is all-or-nothing, so a predictor is never
//! built from a partial set.

use super::{
    Artifact, FittedScaler, FittedVectorizer, LinearRegressor, Regressor, Scaler, SupportMask,
    Vectorizer,
};
use crate::error::{PipelineError, Result};
use crate::manifest::{PipelineManifest, RegressorFormat, TargetSpec};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

struct CachedArtifact {
    kind: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

/// Process-lifetime cache of decoded artifacts.
pub struct AssetStore {
    base_dir: PathBuf,
    cache: RwLock<HashMap<String, CachedArtifact>>,
}

impl std::fmt::Debug for AssetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetStore")
            .field("base_dir", &self.base_dir)
            .field("cached", &self.cache.read().len())
            .finish()
    }
}

impl AssetStore {
    /// Create a store rooted at `base_dir`. Nothing is read until the first load.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Base directory artifact names are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolved path of an artifact name.
    pub fn resolve(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Number of artifacts decoded so far.
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    /// Load an artifact by name, decoding it only on the first call.
    ///
    /// # Errors
    ///
    /// `AssetMissing` when the file does not exist, `AssetCorrupt` when it cannot
    /// be decoded or was already loaded as a different artifact kind.
    pub fn load<T: Artifact>(&self, name: &str) -> Result<Arc<T>> {
        let path = self.resolve(name);

        if let Some(cached) = self.cache.read().get(name) {
            return downcast::<T>(name, &path, cached);
        }

        if !path.is_file() {
            error!(artifact = name, path = %path.display(), "Artifact file not found");
            return Err(PipelineError::AssetMissing {
                name: name.to_string(),
                path,
            });
        }

        let artifact = T::read(&path).map_err(|e| {
            error!(artifact = name, kind = T::KIND, "Failed to decode artifact: {:#}", e);
            PipelineError::corrupt(name, &path, format!("{:#}", e))
        })?;
        info!(artifact = name, kind = T::KIND, "Successfully loaded artifact");

        let mut cache = self.cache.write();
        let cached = cache.entry(name.to_string()).or_insert_with(|| CachedArtifact {
            kind: T::KIND,
            value: Arc::new(artifact),
        });
        downcast::<T>(name, &path, cached)
    }

    /// Load every artifact the manifest names.
    ///
    /// Aborts on the first failure; no partial set is returned.
    pub fn load_artifact_set(&self, manifest: &PipelineManifest) -> Result<ArtifactSet> {
        debug!(
            base_dir = %self.base_dir.display(),
            schema = %manifest.schema_version,
            "Loading artifact set"
        );

        let scaler: Arc<dyn Scaler> = self.load::<FittedScaler>(&manifest.artifacts.scaler)?;
        let selector = self.load::<SupportMask>(&manifest.artifacts.selector)?;

        let mut vectorizers: BTreeMap<String, Arc<dyn Vectorizer>> = BTreeMap::new();
        for (field, file) in manifest.text_fields() {
            let vectorizer: Arc<dyn Vectorizer> = self.load::<FittedVectorizer>(file)?;
            vectorizers.insert(field.to_string(), vectorizer);
        }

        let source = &manifest.artifacts.regressor;
        let regressor: Arc<dyn Regressor> = match source.format {
            RegressorFormat::Linear => self.load::<LinearRegressor>(&source.file)?,
            #[cfg(feature = "onnx")]
            RegressorFormat::Onnx => self.load::<super::OnnxRegressor>(&source.file)?,
            #[cfg(not(feature = "onnx"))]
            RegressorFormat::Onnx => {
                return Err(PipelineError::corrupt(
                    source.file.as_str(),
                    self.resolve(&source.file),
                    "ONNX regressors require the `onnx` feature",
                ))
            }
        };

        let target_scaler = match &manifest.target {
            TargetSpec::Expm1 => None,
            TargetSpec::InverseScale { scaler } => {
                let scaler: Arc<dyn Scaler> = self.load::<FittedScaler>(scaler)?;
                Some(scaler)
            }
        };

        info!(
            artifacts = manifest.artifact_names().len(),
            schema = %manifest.schema_version,
            "Artifact set ready"
        );

        Ok(ArtifactSet {
            scaler,
            selector,
            vectorizers,
            regressor,
            target_scaler,
        })
    }
}

fn downcast<T: Artifact>(name: &str, path: &Path, cached: &CachedArtifact) -> Result<Arc<T>> {
    Arc::clone(&cached.value).downcast::<T>().map_err(|_| {
        PipelineError::corrupt(
            name,
            path,
            format!("already loaded as a {} artifact, not a {}", cached.kind, T::KIND),
        )
    })
}

/// The complete, immutable set of fitted artifacts a predictor runs on.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    /// Numeric feature scaler
    pub scaler: Arc<dyn Scaler>,

    /// Feature-selection mask over the concatenated vector
    pub selector: Arc<SupportMask>,

    /// One vectorizer per text field, keyed by field name
    pub vectorizers: BTreeMap<String, Arc<dyn Vectorizer>>,

    /// Final regressor
    pub regressor: Arc<dyn Regressor>,

    /// Target scaler, present only for inverse-scale pipelines
    pub target_scaler: Option<Arc<dyn Scaler>>,
}
