//! Configuration module

use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Customer table (pandas `orient="split"` JSON)
    pub customers_path: PathBuf,

    /// Scoring model JSON
    pub model_path: PathBuf,

    /// Explainer or precomputed explanations JSON
    pub explainer_path: PathBuf,

    /// Probability threshold JSON, optional on disk
    pub threshold_path: PathBuf,

    /// Raw threshold override, wins over `threshold_path`. Parsed at
    /// artifact load so a malformed value stops startup.
    pub proba_threshold: Option<String>,

    /// Primary key column of the customer table
    pub id_column: String,

    /// Columns removed from the customer table at load (target, helpers)
    pub drop_columns: Vec<String>,

    /// Max ids returned by `/customers`
    pub list_limit: usize,

    /// Emit JSON logs instead of plain text
    pub json_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            customers_path: PathBuf::from("./data/processed/data_cleaned_sample.json"),
            model_path: PathBuf::from("./models/model.json"),
            explainer_path: PathBuf::from("./models/shap_explanation.json"),
            threshold_path: PathBuf::from("./models/model_proba_threshold.json"),
            proba_threshold: None,
            id_column: "SK_ID_CURR".to_string(),
            drop_columns: vec!["TARGET".to_string(), "index".to_string()],
            list_limit: 1000,
            json_logs: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: env::var("HOST").unwrap_or(defaults.host),

            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),

            customers_path: env::var("CUSTOMERS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.customers_path),

            model_path: env::var("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),

            explainer_path: env::var("EXPLAINER_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.explainer_path),

            threshold_path: env::var("THRESHOLD_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.threshold_path),

            proba_threshold: env::var("PROBA_THRESHOLD").ok(),

            id_column: env::var("ID_COLUMN").unwrap_or(defaults.id_column),

            drop_columns: env::var("DROP_COLUMNS")
                .map(|cols| parse_list(&cols))
                .unwrap_or(defaults.drop_columns),

            list_limit: env::var("LIST_LIMIT")
                .ok()
                .and_then(|l| l.parse().ok())
                .unwrap_or(defaults.list_limit),

            json_logs: env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.json_logs),
        }
    }
}

/// Split a comma separated env value, dropping blanks
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.list_limit, 1000);
        assert_eq!(config.id_column, "SK_ID_CURR");
        assert!(config.proba_threshold.is_none());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("TARGET, index,,"), vec!["TARGET", "index"]);
        assert!(parse_list(" ").is_empty());
    }
}
