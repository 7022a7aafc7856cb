//! End-to-end tests: manifest and artifacts written to disk, predictor built
//! with `PricePredictor::from_dir`.

use approx::assert_relative_eq;
use artisan_inference::{PipelineError, PricePredictor, RawInput, MANIFEST_FILE};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_json(dir: &Path, name: &str, value: &Value) {
    fs::write(dir.join(name), serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn manifest() -> Value {
    json!({
        "schema_version": "artisan-linear-test",
        "numeric_fields": [
            {"kind": "number", "name": "production_time"},
            {"kind": "categorical", "name": "target_market",
             "codes": {"Luxury": 0, "Mid-Range": 1, "Budget": 2}, "default_code": 1}
        ],
        "layout": [
            {"block": "numeric"},
            {"block": "text", "field": "description", "vectorizer": "desc.json"},
            {"block": "text", "field": "materials", "vectorizer": "materials.json"}
        ],
        "artifacts": {
            "scaler": "scaler.json",
            "selector": "selector.json",
            "regressor": {"file": "model.json", "format": "linear"}
        },
        "target": {"kind": "expm1"},
        "price_floor": 1.0
    })
}

/// Writes a consistent artifact set: 2 numeric + 3 description + 2 materials = 7 columns.
fn asset_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path();

    write_json(path, MANIFEST_FILE, &manifest());
    write_json(
        path,
        "scaler.json",
        &json!({"kind": "min_max", "min": [0.0, 0.0], "scale": [0.1, 0.5]}),
    );
    write_json(
        path,
        "desc.json",
        &json!({
            "vocabulary": {"wool": 0, "scarf": 1, "silk": 2},
            "weighting": {"kind": "tfidf", "idf": [1.0, 1.0, 1.0]}
        }),
    );
    write_json(
        path,
        "materials.json",
        &json!({
            "vocabulary": {"wool": 0, "dye": 1},
            "weighting": {"kind": "count"}
        }),
    );
    write_json(
        path,
        "selector.json",
        &json!({"n_features_in": 7, "indices": [0, 1, 2, 3, 5]}),
    );
    write_json(
        path,
        "model.json",
        &json!({"coef": [1.0, 1.0, 1.0, 1.0, 1.0], "intercept": 2.0}),
    );

    dir
}

#[test]
fn test_predict_from_disk() {
    let dir = asset_dir();
    let predictor = PricePredictor::from_dir(dir.path()).unwrap();
    assert_eq!(predictor.expected_feature_width(), 7);

    let raw = RawInput::new()
        .with_text("description", "Wool scarf")
        .with_text("materials", "Wool, natural dye")
        .with_number("production_time", 10.0)
        .with_text("target_market", "Budget");

    let prediction = predictor.predict_detailed(&raw).unwrap();
    // selected: [1.0, 1.0, 1/sqrt2, 1/sqrt2, 1.0]
    let expected_log = 2.0 + 3.0 + 2.0_f64.sqrt();
    assert_relative_eq!(prediction.raw_output, expected_log, epsilon = 1e-12);
    assert_relative_eq!(prediction.price.value(), expected_log.exp_m1(), max_relative = 1e-12);
    assert_eq!(prediction.feature_width, 7);
    assert_eq!(prediction.selected_width, 5);
    assert_eq!(prediction.schema_version, "artisan-linear-test");
}

#[test]
fn test_empty_record_predicts_with_defaults() {
    let dir = asset_dir();
    let predictor = PricePredictor::from_dir(dir.path()).unwrap();

    // production_time 0, market falls back to Mid-Range (1 * 0.5), no text
    let prediction = predictor.predict_detailed(&RawInput::new()).unwrap();
    assert_relative_eq!(prediction.raw_output, 2.5, epsilon = 1e-12);
    assert!(prediction.encodings[0].fell_back);
}

#[test]
fn test_json_record() {
    let dir = asset_dir();
    let predictor = PricePredictor::from_dir(dir.path()).unwrap();

    let raw: RawInput = serde_json::from_value(json!({
        "description": "silk",
        "production_time": "5",
        "target_market": "Luxury"
    }))
    .unwrap();

    // selected: [0.5, 0.0, 0.0, 0.0, 0.0]; "silk" is column 4, not selected
    let prediction = predictor.predict_detailed(&raw).unwrap();
    assert_relative_eq!(prediction.raw_output, 2.5, epsilon = 1e-12);
}

#[test]
fn test_missing_artifact_refuses_to_serve() {
    let dir = asset_dir();
    fs::remove_file(dir.path().join("materials.json")).unwrap();

    let err = PricePredictor::from_dir(dir.path()).unwrap_err();
    assert!(err.is_fatal());
    match err {
        PipelineError::AssetMissing { name, path } => {
            assert_eq!(name, "materials.json");
            assert_eq!(path, dir.path().join("materials.json"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_corrupt_artifact_refuses_to_serve() {
    let dir = asset_dir();
    write_json(
        dir.path(),
        "desc.json",
        &json!({
            "vocabulary": {"wool": 0, "scarf": 1, "silk": 2},
            "weighting": {"kind": "tfidf", "idf": [1.0]}
        }),
    );

    let err = PricePredictor::from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, PipelineError::AssetCorrupt { .. }));
    assert!(err.to_string().contains("desc.json"));
}

#[test]
fn test_selector_from_other_pipeline_is_detected_per_request() {
    let dir = asset_dir();
    write_json(
        dir.path(),
        "selector.json",
        &json!({"n_features_in": 9, "indices": [0, 1, 2, 3, 5]}),
    );

    let predictor = PricePredictor::from_dir(dir.path()).unwrap();
    let err = predictor.predict(&RawInput::new()).unwrap_err();
    match err {
        PipelineError::FeatureCountMismatch { expected, actual } => {
            assert_eq!(expected, 9);
            assert_eq!(actual, 7);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_text_first_layout() {
    let dir = asset_dir();
    let mut manifest = manifest();
    manifest["layout"] = json!([
        {"block": "text", "field": "description", "vectorizer": "desc.json"},
        {"block": "numeric"},
        {"block": "text", "field": "materials", "vectorizer": "materials.json"}
    ]);
    write_json(dir.path(), MANIFEST_FILE, &manifest);

    let predictor = PricePredictor::from_dir(dir.path()).unwrap();
    let raw = RawInput::new()
        .with_text("description", "wool")
        .with_number("production_time", 10.0);
    let (features, _) = predictor.assemble(&raw).unwrap();

    assert_eq!(
        features.describe_layout(),
        "description[0..3] numeric[3..5] materials[5..7]"
    );
    assert_eq!(features.values()[0], 1.0);
    assert_relative_eq!(features.values()[3], 1.0, epsilon = 1e-12);
}

#[test]
fn test_malformed_manifest() {
    let dir = asset_dir();
    fs::write(dir.path().join(MANIFEST_FILE), "{\"schema_version\": 3}").unwrap();

    let err = PricePredictor::from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, PipelineError::Manifest { .. }));
}

#[test]
fn test_missing_manifest_is_a_missing_asset() {
    let dir = asset_dir();
    fs::remove_file(dir.path().join(MANIFEST_FILE)).unwrap();

    let err = PricePredictor::from_dir(dir.path()).unwrap_err();
    assert_eq!(err.stage(), "assets");
    match err {
        PipelineError::AssetMissing { name, path } => {
            assert_eq!(name, MANIFEST_FILE);
            assert_eq!(path, dir.path().join(MANIFEST_FILE));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_null_fields_in_json_record_use_defaults() {
    let dir = asset_dir();
    let predictor = PricePredictor::from_dir(dir.path()).unwrap();

    let raw: RawInput = serde_json::from_value(json!({
        "description": null,
        "materials": null,
        "production_time": null,
        "target_market": null
    }))
    .unwrap();

    let prediction = predictor.predict_detailed(&raw).unwrap();
    assert_relative_eq!(prediction.raw_output, 2.5, epsilon = 1e-12);
    assert!(prediction.encodings[0].fell_back);
}
