//! Route tests against the sample artifacts shipped in `data/` and `models/`

use std::path::PathBuf;

use axum::{body::{Body, to_bytes}, http::{Request, StatusCode}, Router};
use serde_json::Value;
use tower::ServiceExt;

use crate::config::Config;
use crate::{artifacts, create_router, AppState};

const KNOWN_ID: i64 = 100006;
const UNKNOWN_IDS: [&str; 6] = ["0", "12", "-1", "1000006", "abc", "100006.5"];

fn sample_config() -> Config {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    Config {
        customers_path: root.join("data/processed/data_cleaned_sample.json"),
        model_path: root.join("models/model.json"),
        explainer_path: root.join("models/shap_explanation.json"),
        threshold_path: root.join("models/model_proba_threshold.json"),
        ..Config::default()
    }
}

fn app_with(config: Config) -> Router {
    let artifacts = artifacts::load(&config).expect("sample artifacts load");
    create_router(AppState::new(config, artifacts))
}

fn app() -> Router {
    app_with(sample_config())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_ping() {
    let (status, body) = get(&app(), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!(["Ping successfull"]));
}

#[tokio::test]
async fn test_health_reports_artifacts() {
    let (status, body) = get(&app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["customers"], 64);
    assert_eq!(body["model"], "logistic_regression");
    assert_eq!(body["explainer"], "precomputed");
    assert_eq!(body["threshold"], 0.12);
    assert_eq!(body["artifacts"].as_object().unwrap().len(), 4);
}

#[tokio::test]
async fn test_list_customers() {
    let app = app();
    let (status, body) = get(&app, "/customers").await;
    assert_eq!(status, StatusCode::OK);

    let ids: Vec<i64> = serde_json::from_value(body.clone()).unwrap();
    assert_eq!(ids.len(), 64);
    assert!(ids.contains(&KNOWN_ID));
    assert_eq!(&ids[..4], &[100002, 100003, 100004, 100006]);

    // Repeated calls see the same table
    let (_, again) = get(&app, "/customers").await;
    assert_eq!(body, again);
}

#[tokio::test]
async fn test_list_customers_is_capped() {
    let config = Config { list_limit: 3, ..sample_config() };
    let (_, body) = get(&app_with(config), "/customers").await;
    assert_eq!(body, serde_json::json!([100002, 100003, 100004]));
}

#[tokio::test]
async fn test_read_single_customer() {
    let (status, body) = get(&app(), &format!("/customers/{}", KNOWN_ID)).await;
    assert_eq!(status, StatusCode::OK);

    let features = body.as_object().unwrap();
    assert!(features.len() > 10);
    assert!(!features.contains_key("SK_ID_CURR"));
    assert!(!features.contains_key("TARGET"));
    assert!(!features.contains_key("index"));

    // Missing values are rendered as empty strings, never null
    assert_eq!(features["OWN_CAR_AGE"], "");
    assert_eq!(features["EXT_SOURCE_1"], "");
    assert!(features.values().all(|v| !v.is_null()));
}

#[tokio::test]
async fn test_every_listed_customer_is_served() {
    let app = app();
    let (_, body) = get(&app, "/customers").await;
    let ids: Vec<i64> = serde_json::from_value(body).unwrap();
    assert!(!ids.is_empty());

    for id in ids {
        let (status, body) = get(&app, &format!("/customers/{}", id)).await;
        assert_eq!(status, StatusCode::OK, "/customers/{}", id);
        assert!(body.as_object().unwrap().len() > 10, "/customers/{}", id);

        let (status, body) = get(&app, &format!("/predict/{}", id)).await;
        assert_eq!(status, StatusCode::OK, "/predict/{}", id);
        let loan_result = body["loan_result"].as_u64().unwrap();
        assert!(loan_result == 0 || loan_result == 1, "/predict/{}", id);

        let (status, _) = get(&app, &format!("/shap/{}", id)).await;
        assert_eq!(status, StatusCode::OK, "/shap/{}", id);
    }
}

#[tokio::test]
async fn test_unknown_customers_are_not_found() {
    let app = app();
    for route in ["customers", "predict", "predict_proba", "shap", "shap_summary"] {
        for id in UNKNOWN_IDS {
            let (status, body) = get(&app, &format!("/{}/{}", route, id)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "/{}/{}", route, id);
            assert_eq!(body["detail"], "Customer ID does not exist");
        }
    }
}

#[tokio::test]
async fn test_customers_stats() {
    let (status, body) = get(&app(), "/customers_stats").await;
    assert_eq!(status, StatusCode::OK);

    let measures: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(measures, ["count", "mean", "std"]);

    // 12 numeric features under every measure, text columns excluded
    let features: Vec<&String> = body["count"].as_object().unwrap().keys().collect();
    assert_eq!(features.len(), 12);
    for measure in ["mean", "std"] {
        let keys: Vec<&String> = body[measure].as_object().unwrap().keys().collect();
        assert_eq!(keys, features, "{}", measure);
    }
    assert!(body["count"].get("NAME_CONTRACT_TYPE").is_none());

    assert_eq!(body["count"]["EXT_SOURCE_2"], 64);
    assert!(body["count"]["OWN_CAR_AGE"].as_u64().unwrap() < 64);
}

#[tokio::test]
async fn test_predict() {
    let app = app();

    let (status, body) = get(&app, &format!("/predict/{}", KNOWN_ID)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"loan_result": 0}));

    let (_, body) = get(&app, "/predict/100003").await;
    assert_eq!(body, serde_json::json!({"loan_result": 1}));
}

#[tokio::test]
async fn test_predict_follows_threshold_override() {
    let config = Config { proba_threshold: Some("0".to_string()), ..sample_config() };
    let (_, body) = get(&app_with(config), &format!("/predict/{}", KNOWN_ID)).await;
    assert_eq!(body["loan_result"], 1);
}

#[tokio::test]
async fn test_predict_proba() {
    let (status, body) = get(&app(), &format!("/predict_proba/{}", KNOWN_ID)).await;
    assert_eq!(status, StatusCode::OK);

    let probas = body.as_object().unwrap();
    assert_eq!(probas.len(), 2);
    let p0 = probas["0"].as_f64().unwrap();
    let p1 = probas["1"].as_f64().unwrap();
    assert!((p0 + p1 - 1.0).abs() < 1e-9);
    assert!(p1 > 0.1 && p1 < 0.12);
}

#[tokio::test]
async fn test_shap_values() {
    let app = app();
    let uri = format!("/shap/{}", KNOWN_ID);

    let (status, body) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::OK);

    let exp = body.as_object().unwrap();
    let keys: Vec<&str> = exp.keys().map(String::as_str).collect();
    assert_eq!(keys, ["values", "base_values", "data", "display_data"]);
    assert_eq!(exp["values"].as_object().unwrap().len(), 12);
    assert!(exp["base_values"].is_number());
    assert_eq!(exp["display_data"]["OWN_CAR_AGE"], "");

    // Deterministic
    let (_, again) = get(&app, &uri).await;
    assert_eq!(body, again);
}

#[tokio::test]
async fn test_linear_explainer_matches_precomputed() {
    let mut config = sample_config();
    config.explainer_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models/linear_explainer.json");
    let linear_app = app_with(config);
    let uri = format!("/shap/{}", KNOWN_ID);

    let (_, precomputed) = get(&app(), &uri).await;
    let (status, linear) = get(&linear_app, &uri).await;
    assert_eq!(status, StatusCode::OK);

    let base = |v: &Value| v["base_values"].as_f64().unwrap();
    assert!((base(&precomputed) - base(&linear)).abs() < 1e-9);

    for (feature, value) in precomputed["values"].as_object().unwrap() {
        let other = linear["values"][feature].as_f64().unwrap();
        assert!((value.as_f64().unwrap() - other).abs() < 1e-9, "{}", feature);
    }
    assert_eq!(precomputed["display_data"], linear["display_data"]);
}

#[tokio::test]
async fn test_shap_summary() {
    let (status, body) = get(&app(), &format!("/shap_summary/{}", KNOWN_ID)).await;
    assert_eq!(status, StatusCode::OK);

    let top: Vec<f64> = body["top"].as_object().unwrap().values().map(|v| v.as_f64().unwrap()).collect();
    let bottom: Vec<f64> = body["bottom"].as_object().unwrap().values().map(|v| v.as_f64().unwrap()).collect();
    assert_eq!(top.len(), 10);
    assert_eq!(bottom.len(), 10);
    assert!(top.windows(2).all(|w| w[0] >= w[1]));
    assert!(bottom.windows(2).all(|w| w[0] <= w[1]));
    assert!(top[0] > 0.0 && bottom[0] < 0.0);
}
