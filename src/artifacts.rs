//! Artifact loading - customer table, model, explainer and threshold
//!
//! Everything is read once at startup. Any failure here is fatal: the server
//! never starts with a partial set of artifacts.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::ArtifactError;
use crate::models::{
    CustomerTable, Explainer, ExplainerArtifact, LogisticModel, ModelArtifact,
    ProbabilityThreshold, ScoringModel, SplitFrame, ThresholdArtifact,
};

/// Read-only state shared by every request
pub struct Artifacts {
    pub customers: CustomerTable,
    pub model: Arc<dyn ScoringModel>,
    pub explainer: Explainer,
    pub threshold: ProbabilityThreshold,
    /// sha256 of each artifact file, by artifact name
    pub digests: BTreeMap<&'static str, String>,
}

impl std::fmt::Debug for Artifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifacts")
            .field("customers", &self.customers.len())
            .field("model", &self.model.kind())
            .field("explainer", &self.explainer.kind())
            .field("threshold", &self.threshold)
            .finish()
    }
}

/// Load every artifact named in the configuration
pub fn load(config: &Config) -> Result<Artifacts, ArtifactError> {
    let mut digests = BTreeMap::new();

    let (frame, digest) = read_json::<SplitFrame>(&config.customers_path)?;
    digests.insert("customers", digest);
    let customers = CustomerTable::from_split(frame, &config.id_column, &config.drop_columns)?;
    tracing::info!(
        "Loaded {} customers with {} features ({} numeric) from {}",
        customers.len(),
        customers.columns().len(),
        customers.stats().len(),
        config.customers_path.display()
    );

    let (artifact, digest) = read_json::<ModelArtifact>(&config.model_path)?;
    digests.insert("model", digest);
    let model = Arc::new(LogisticModel::from_artifact(artifact)?);
    model.check_columns(&customers)?;
    tracing::info!(
        "Loaded {} model ({} features) from {}",
        model.kind(),
        model.feature_names().len(),
        config.model_path.display()
    );

    let (artifact, digest) = read_json::<ExplainerArtifact>(&config.explainer_path)?;
    digests.insert("explainer", digest);
    let explainer = Explainer::from_artifact(artifact, &customers, Arc::clone(&model))?;
    tracing::info!("Loaded {} explainer from {}", explainer.kind(), config.explainer_path.display());

    let threshold = load_threshold(config, &mut digests)?;
    tracing::info!("Probability threshold: {}", threshold.value());

    for (name, digest) in &digests {
        tracing::debug!("Artifact {} sha256={}", name, digest);
    }

    Ok(Artifacts {
        customers,
        model,
        explainer,
        threshold,
        digests,
    })
}

/// Env override first, then the threshold file, then the default cutoff
fn load_threshold(
    config: &Config,
    digests: &mut BTreeMap<&'static str, String>,
) -> Result<ProbabilityThreshold, ArtifactError> {
    if let Some(raw) = &config.proba_threshold {
        let value = raw.trim()
            .parse::<f64>()
            .map_err(|_| ArtifactError::ThresholdOverride(raw.clone()))?;
        return ProbabilityThreshold::new(value);
    }

    if !config.threshold_path.exists() {
        tracing::warn!(
            "No threshold file at {}, using default {}",
            config.threshold_path.display(),
            ProbabilityThreshold::default().value()
        );
        return Ok(ProbabilityThreshold::default());
    }

    let (artifact, digest) = read_json::<ThresholdArtifact>(&config.threshold_path)?;
    digests.insert("threshold", digest);
    ProbabilityThreshold::new(artifact.value)
}

/// Read and parse a JSON artifact, returning its sha256 alongside
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<(T, String), ArtifactError> {
    let bytes = fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!("Read {} ({} bytes)", path.display(), bytes.len());

    let value = serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    Ok((value, hash_bytes(&bytes)))
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
