//! Local explanations (SHAP values)
//!
//! Two explainer flavours are supported:
//!
//! - `precomputed`: explanations exported offline, keyed by customer id
//! - `linear`: exact SHAP values of the logistic model, computed per request
//!   against a background mean (log-odds space)
//!
//! Both produce an [`Explanation`], whose JSON form is:
//!
//! ```text
//! {
//!   "values":       { feature: attribution },
//!   "base_values":  f64 | [f64, ...],
//!   "data":         { feature: model input value },
//!   "display_data": { feature: raw value }
//! }
//! ```
//!
//! Missing inputs are written as `""` like everywhere else in the API.

use std::collections::HashMap;
use std::sync::Arc;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize, Serializer};
use serde::ser::SerializeMap;
use serde_json::Value;

use crate::error::{ArtifactError, ScoringError};
use super::customer::{CustomerRecord, CustomerTable, FeatureValue};
use super::scoring::{LogisticModel, ScoringModel};

/// Features kept on each side of `/shap_summary`
pub const SUMMARY_SIZE: usize = 10;

/// Expected model output before any feature is known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BaseValue {
    Scalar(f64),
    PerClass(Vec<f64>),
}

/// Attribution of one customer row
#[derive(Debug, Clone, PartialEq)]
pub struct Explanation {
    pub features: Arc<[String]>,
    pub values: Vec<f64>,
    pub base_values: BaseValue,
    pub data: Vec<FeatureValue>,
    pub display_data: Vec<FeatureValue>,
}

/// Parallel slices written out as `{name: value}`
struct ByFeature<'a, T>(&'a [String], &'a [T]);

impl<T: Serialize> Serialize for ByFeature<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0.iter().zip(self.1) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for Explanation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("values", &ByFeature(&self.features, &self.values))?;
        map.serialize_entry("base_values", &self.base_values)?;
        map.serialize_entry("data", &ByFeature(&self.features, &self.data))?;
        map.serialize_entry("display_data", &ByFeature(&self.features, &self.display_data))?;
        map.end()
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

/// Highest and lowest standardised attributions, `/shap_summary/{id}`
#[derive(Debug, Clone, PartialEq)]
pub struct ExplanationSummary {
    pub top: Vec<(String, f64)>,
    pub bottom: Vec<(String, f64)>,
}

struct Ranked<'a>(&'a [(String, f64)]);

impl Serialize for Ranked<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for ExplanationSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("top", &Ranked(&self.top))?;
        map.serialize_entry("bottom", &Ranked(&self.bottom))?;
        map.end()
    }
}

/// Standardise to zero mean and unit (population) variance.
/// A constant vector maps to zeros.
pub fn standardize(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    let scale = if std > 0.0 { std } else { 1.0 };

    values.iter().map(|v| (v - mean) / scale).collect()
}

impl Explanation {
    /// `n` highest (descending) and `n` lowest (ascending) scaled attributions.
    /// Ties keep feature order.
    pub fn summarize(&self, n: usize) -> ExplanationSummary {
        let scaled = standardize(&self.values);
        let mut ranked: Vec<(String, f64)> = self.features.iter().cloned().zip(scaled).collect();

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let top = ranked.iter().take(n).cloned().collect();

        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        let bottom = ranked.into_iter().take(n).collect();

        ExplanationSummary { top, bottom }
    }
}

// ============================================================================
// ARTIFACT FORMAT
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExplainerArtifact {
    Precomputed(PrecomputedSpec),
    Linear(LinearSpec),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrecomputedSpec {
    pub feature_names: Vec<String>,
    pub base_values: BaseValue,
    /// Keyed by customer id (JSON object keys are strings)
    pub explanations: HashMap<String, ExplanationEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplanationEntry {
    pub values: Vec<f64>,
    pub data: Vec<Value>,
    #[serde(default)]
    pub display_data: Option<Vec<Value>>,
    /// Overrides the shared base value
    #[serde(default)]
    pub base_values: Option<BaseValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinearSpec {
    /// Background in model input space; table mean when absent
    #[serde(default)]
    pub background_mean: Option<Vec<f64>>,
}

// ============================================================================
// EXPLAINERS
// ============================================================================

#[derive(Debug, Clone)]
pub enum Explainer {
    Precomputed(PrecomputedExplanations),
    Linear(LinearExplainer),
}

impl Explainer {
    /// Build the explainer named by the artifact and check it against the
    /// table and model it will serve.
    pub fn from_artifact(
        artifact: ExplainerArtifact,
        table: &CustomerTable,
        model: Arc<LogisticModel>,
    ) -> Result<Self, ArtifactError> {
        match artifact {
            ExplainerArtifact::Precomputed(spec) => {
                PrecomputedExplanations::new(spec, table).map(Explainer::Precomputed)
            }
            ExplainerArtifact::Linear(spec) => {
                LinearExplainer::new(spec, table, model).map(Explainer::Linear)
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Explainer::Precomputed(_) => "precomputed",
            Explainer::Linear(_) => "linear",
        }
    }

    pub fn explain(&self, record: &CustomerRecord<'_>) -> Result<Explanation, ScoringError> {
        match self {
            Explainer::Precomputed(p) => p.explain(record.id()),
            Explainer::Linear(l) => l.explain(record),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrecomputedExplanations {
    entries: HashMap<i64, Explanation>,
}

impl PrecomputedExplanations {
    pub fn new(spec: PrecomputedSpec, table: &CustomerTable) -> Result<Self, ArtifactError> {
        let features: Arc<[String]> = spec.feature_names.into();
        let n = features.len();
        let mut entries = HashMap::with_capacity(spec.explanations.len());

        for (key, entry) in spec.explanations {
            let id: i64 = key.parse()
                .map_err(|_| ArtifactError::Explainer(format!("invalid customer id key '{}'", key)))?;

            let data = to_feature_values(entry.data, n, id, "data")?;
            let display_data = match entry.display_data {
                Some(raw) => to_feature_values(raw, n, id, "display_data")?,
                None => data.clone(),
            };
            if entry.values.len() != n {
                return Err(ArtifactError::Explainer(format!(
                    "customer {}: values has {} entries, expected {}",
                    id, entry.values.len(), n
                )));
            }

            entries.insert(id, Explanation {
                features: Arc::clone(&features),
                values: entry.values,
                base_values: entry.base_values.unwrap_or_else(|| spec.base_values.clone()),
                data,
                display_data,
            });
        }

        let uncovered = table.records().filter(|r| !entries.contains_key(&r.id())).count();
        if uncovered > 0 {
            return Err(ArtifactError::Explainer(format!(
                "{} customers have no precomputed explanation",
                uncovered
            )));
        }

        let extra = entries.keys().filter(|id| !table.contains(**id)).count();
        if extra > 0 {
            tracing::warn!("{} precomputed explanations match no customer", extra);
        }

        Ok(Self { entries })
    }

    pub fn explain(&self, id: i64) -> Result<Explanation, ScoringError> {
        self.entries
            .get(&id)
            .cloned()
            .ok_or(ScoringError::MissingExplanation(id))
    }
}

fn to_feature_values(raw: Vec<Value>, expected: usize, id: i64, field: &str) -> Result<Vec<FeatureValue>, ArtifactError> {
    if raw.len() != expected {
        return Err(ArtifactError::Explainer(format!(
            "customer {}: {} has {} entries, expected {}",
            id, field, raw.len(), expected
        )));
    }

    raw.into_iter()
        .map(|v| match v {
            Value::Null => Ok(FeatureValue::Missing),
            Value::Number(n) => Ok(n.as_f64().map_or(FeatureValue::Missing, FeatureValue::Number)),
            Value::Bool(b) => Ok(FeatureValue::Bool(b)),
            Value::String(s) if s.is_empty() => Ok(FeatureValue::Missing),
            Value::String(s) => Ok(FeatureValue::Text(s)),
            other => Err(ArtifactError::Explainer(format!("customer {}: unsupported {} value {}", id, field, other))),
        })
        .collect()
}

/// Exact SHAP values for a linear model with independent features:
/// `phi_i = coef_i * (x_i - E[x_i])`
#[derive(Debug, Clone)]
pub struct LinearExplainer {
    model: Arc<LogisticModel>,
    features: Arc<[String]>,
    background: Array1<f64>,
    base_value: f64,
}

impl LinearExplainer {
    pub fn new(spec: LinearSpec, table: &CustomerTable, model: Arc<LogisticModel>) -> Result<Self, ArtifactError> {
        let features: Arc<[String]> = model.feature_names().to_vec().into();
        let n = features.len();

        let background = match spec.background_mean {
            Some(mean) if mean.len() == n => Array1::from(mean),
            Some(mean) => {
                return Err(ArtifactError::Explainer(format!(
                    "background_mean has {} entries, expected {}",
                    mean.len(), n
                )))
            }
            None => table_background(table, &model)?,
        };

        let base_value = model.decision_function(&background);

        Ok(Self {
            model,
            features,
            background,
            base_value,
        })
    }

    pub fn explain(&self, record: &CustomerRecord<'_>) -> Result<Explanation, ScoringError> {
        let x = self.model.transform(record)?;
        let values = self.model.coefficients() * &(&x - &self.background);

        let display_data = self.features.iter()
            .map(|f| record.get(f).cloned().unwrap_or(FeatureValue::Missing))
            .collect();

        Ok(Explanation {
            features: Arc::clone(&self.features),
            values: values.to_vec(),
            base_values: BaseValue::Scalar(self.base_value),
            data: x.iter().copied().map(FeatureValue::Number).collect(),
            display_data,
        })
    }
}

/// Column means of the whole table in model input space
fn table_background(table: &CustomerTable, model: &LogisticModel) -> Result<Array1<f64>, ArtifactError> {
    let n = model.feature_names().len();
    let mut matrix = Array2::<f64>::zeros((table.len(), n));

    for (row, record) in table.records().enumerate() {
        let x = model.transform(&record)
            .map_err(|e| ArtifactError::Explainer(format!("customer {}: {}", record.id(), e)))?;
        matrix.row_mut(row).assign(&x);
    }

    Ok(matrix.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n)))
}
