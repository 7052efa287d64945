//! Scoring model
//!
//! `ScoringModel` is the seam between handlers and whatever classifier was
//! exported. The only shipped implementation is a logistic regression with
//! optional mean imputation and standard scaling, i.e. the usual
//! `SimpleImputer -> StandardScaler -> LogisticRegression` pipeline.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{ArtifactError, ScoringError};
use super::customer::{CustomerRecord, CustomerTable, FeatureValue};

/// Binary classifier over a customer row
pub trait ScoringModel: Send + Sync {
    /// Short identifier reported by `/health`
    fn kind(&self) -> &'static str;

    /// Input features, in model order
    fn feature_names(&self) -> &[String];

    /// `[p(class 0), p(class 1)]`
    fn predict_proba(&self, record: &CustomerRecord<'_>) -> Result<[f64; 2], ScoringError>;
}

// ============================================================================
// ARTIFACT FORMAT
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    LogisticRegression(LogisticSpec),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogisticSpec {
    pub features: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub imputer: Option<ImputerSpec>,
    #[serde(default)]
    pub scaler: Option<ScalerSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImputerSpec {
    pub statistics: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScalerSpec {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

// ============================================================================
// LOGISTIC REGRESSION
// ============================================================================

#[derive(Debug, Clone)]
pub struct LogisticModel {
    features: Vec<String>,
    coefficients: Array1<f64>,
    intercept: f64,
    fill_values: Array1<f64>,
    scaler: Option<(Array1<f64>, Array1<f64>)>,
}

impl LogisticModel {
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ArtifactError> {
        let ModelArtifact::LogisticRegression(spec) = artifact;
        let n = spec.features.len();

        if n == 0 {
            return Err(ArtifactError::Model("model has no features".to_string()));
        }
        check_len("coefficients", spec.coefficients.len(), n)?;

        let fill_values = match spec.imputer {
            Some(imputer) => {
                check_len("imputer.statistics", imputer.statistics.len(), n)?;
                Array1::from(imputer.statistics)
            }
            None => Array1::zeros(n),
        };

        let scaler = match spec.scaler {
            Some(scaler) => {
                check_len("scaler.mean", scaler.mean.len(), n)?;
                check_len("scaler.scale", scaler.scale.len(), n)?;
                // Zero-variance columns are left unscaled
                let scale = scaler.scale.iter()
                    .map(|&s| if s == 0.0 { 1.0 } else { s })
                    .collect::<Array1<f64>>();
                Some((Array1::from(scaler.mean), scale))
            }
            None => None,
        };

        Ok(Self {
            features: spec.features,
            coefficients: Array1::from(spec.coefficients),
            intercept: spec.intercept,
            fill_values,
            scaler,
        })
    }

    /// Every model feature must exist as a table column
    pub fn check_columns(&self, table: &CustomerTable) -> Result<(), ArtifactError> {
        let missing: Vec<&str> = self.features.iter()
            .filter(|f| table.column_position(f).is_none())
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ArtifactError::Model(format!("features missing from customer table: {}", missing.join(", "))))
        }
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    /// Impute and scale a row into model input space
    pub fn transform(&self, record: &CustomerRecord<'_>) -> Result<Array1<f64>, ScoringError> {
        let mut x = Array1::zeros(self.features.len());

        for (i, name) in self.features.iter().enumerate() {
            x[i] = match record.get(name) {
                Some(FeatureValue::Missing) | None => self.fill_values[i],
                Some(value) => value.as_model_input().ok_or_else(|| ScoringError::NonNumeric(name.clone()))?,
            };
        }

        if let Some((mean, scale)) = &self.scaler {
            x = (x - mean) / scale;
        }

        Ok(x)
    }

    /// Log-odds of class 1 for an already transformed row
    pub fn decision_function(&self, x: &Array1<f64>) -> f64 {
        self.intercept + self.coefficients.dot(x)
    }
}

impl ScoringModel for LogisticModel {
    fn kind(&self) -> &'static str {
        "logistic_regression"
    }

    fn feature_names(&self) -> &[String] {
        &self.features
    }

    fn predict_proba(&self, record: &CustomerRecord<'_>) -> Result<[f64; 2], ScoringError> {
        let x = self.transform(record)?;
        let p1 = sigmoid(self.decision_function(&x));
        Ok([1.0 - p1, p1])
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn check_len(field: &str, got: usize, expected: usize) -> Result<(), ArtifactError> {
    if got == expected {
        Ok(())
    } else {
        Err(ArtifactError::Model(format!("{} has {} entries, expected {}", field, got, expected)))
    }
}

// ============================================================================
// THRESHOLD
// ============================================================================

/// Default cutoff when no threshold artifact is shipped
pub const DEFAULT_PROBA_THRESHOLD: f64 = 0.5;

/// Serialized threshold, `{"value": 0.42}`
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdArtifact {
    pub value: f64,
}

/// Probability cutoff for class 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProbabilityThreshold(f64);

impl ProbabilityThreshold {
    pub fn new(value: f64) -> Result<Self, ArtifactError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ArtifactError::Threshold(value))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// 1 when strictly above the cutoff
    pub fn classify(&self, proba: f64) -> u8 {
        u8::from(proba > self.0)
    }
}

impl Default for ProbabilityThreshold {
    fn default() -> Self {
        Self(DEFAULT_PROBA_THRESHOLD)
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

/// `/predict/{id}` response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoanResult {
    pub loan_result: u8,
}

/// `/predict_proba/{id}` response, keyed by class label
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassProbabilities {
    #[serde(rename = "0")]
    pub repaid: f64,
    #[serde(rename = "1")]
    pub default: f64,
}

impl From<[f64; 2]> for ClassProbabilities {
    fn from([repaid, default]: [f64; 2]) -> Self {
        Self { repaid, default }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::customer::SplitFrame;
    use serde_json::json;

    fn table() -> CustomerTable {
        let frame: SplitFrame = serde_json::from_value(json!({
            "columns": ["SK_ID_CURR", "A", "B", "C"],
            "data": [
                [1, 2.0, 10.0, "x"],
                [2, null, 30.0, "y"]
            ]
        }))
        .unwrap();
        CustomerTable::from_split(frame, "SK_ID_CURR", &[]).unwrap()
    }

    fn model() -> LogisticModel {
        let artifact: ModelArtifact = serde_json::from_value(json!({
            "kind": "logistic_regression",
            "features": ["A", "B"],
            "coefficients": [0.5, -0.1],
            "intercept": 0.25,
            "imputer": {"statistics": [4.0, 20.0]},
            "scaler": {"mean": [3.0, 20.0], "scale": [1.0, 10.0]}
        }))
        .unwrap();
        LogisticModel::from_artifact(artifact).unwrap()
    }

    #[test]
    fn test_transform_imputes_and_scales() {
        let table = table();
        let model = model();

        let x = model.transform(&table.get(2).unwrap()).unwrap();
        // A imputed to 4 -> (4 - 3) / 1, B (30 - 20) / 10
        assert_eq!(x.to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_flag_feature_is_zero_or_one() {
        let frame: SplitFrame = serde_json::from_value(json!({
            "columns": ["SK_ID_CURR", "FLAG_OWN_CAR"],
            "data": [[1, true], [2, false]]
        }))
        .unwrap();
        let table = CustomerTable::from_split(frame, "SK_ID_CURR", &[]).unwrap();
        let artifact: ModelArtifact = serde_json::from_value(json!({
            "kind": "logistic_regression",
            "features": ["FLAG_OWN_CAR"],
            "coefficients": [2.0],
            "intercept": -1.0
        }))
        .unwrap();
        let model = LogisticModel::from_artifact(artifact).unwrap();

        assert_eq!(model.transform(&table.get(1).unwrap()).unwrap().to_vec(), vec![1.0]);
        assert_eq!(model.transform(&table.get(2).unwrap()).unwrap().to_vec(), vec![0.0]);
    }

    #[test]
    fn test_predict_proba_sums_to_one() {
        let table = table();
        let model = model();

        let [p0, p1] = model.predict_proba(&table.get(1).unwrap()).unwrap();
        // z = 0.25 + 0.5 * (-1) - 0.1 * (-1) = -0.15
        assert!((p1 - sigmoid(-0.15)).abs() < 1e-12);
        assert!((p0 + p1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_text_feature_is_an_error() {
        let artifact: ModelArtifact = serde_json::from_value(json!({
            "kind": "logistic_regression",
            "features": ["C"],
            "coefficients": [1.0],
            "intercept": 0.0
        }))
        .unwrap();
        let model = LogisticModel::from_artifact(artifact).unwrap();
        let table = table();

        let err = model.predict_proba(&table.get(1).unwrap()).unwrap_err();
        assert!(matches!(err, ScoringError::NonNumeric(f) if f == "C"));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let artifact: ModelArtifact = serde_json::from_value(json!({
            "kind": "logistic_regression",
            "features": ["A", "B"],
            "coefficients": [1.0],
            "intercept": 0.0
        }))
        .unwrap();
        assert!(LogisticModel::from_artifact(artifact).is_err());
    }

    #[test]
    fn test_check_columns() {
        let table = table();
        assert!(model().check_columns(&table).is_ok());

        let artifact: ModelArtifact = serde_json::from_value(json!({
            "kind": "logistic_regression",
            "features": ["A", "DAYS_BIRTH"],
            "coefficients": [1.0, 1.0],
            "intercept": 0.0
        }))
        .unwrap();
        let err = LogisticModel::from_artifact(artifact).unwrap().check_columns(&table).unwrap_err();
        assert!(err.to_string().contains("DAYS_BIRTH"));
    }

    #[test]
    fn test_threshold() {
        let threshold = ProbabilityThreshold::new(0.3).unwrap();
        assert_eq!(threshold.classify(0.31), 1);
        assert_eq!(threshold.classify(0.3), 0);
        assert!(ProbabilityThreshold::new(1.5).is_err());
        assert_eq!(ProbabilityThreshold::default().value(), 0.5);
    }

    #[test]
    fn test_class_probabilities_keys() {
        let value = serde_json::to_value(ClassProbabilities::from([0.8, 0.2])).unwrap();
        assert_eq!(value, json!({"0": 0.8, "1": 0.2}));
    }
}
