//! End-to-end scoring scenarios through resolution, adapter load and the
//! staged pipeline, using real code directories on disk.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use plinth::adapter::PredictorAdapter;
use plinth::artifact::LoaderRegistry;
use plinth::batch::{self, BatchJob};
use plinth::config::{ClassLabels, Config, TargetType};
use plinth::frame::PREDICTIONS_COLUMN;
use plinth::pipeline::Pipeline;
use plinth::resolver::resolve;
use plinth::RunnerError;

fn write_model(dir: &Path, body: &str) {
    fs::write(dir.join("model.json"), body).unwrap();
}

fn load_pipeline(
    dir: &Path,
    target_type: TargetType,
    class_labels: Option<ClassLabels>,
) -> Pipeline {
    let resolution = resolve(dir, &LoaderRegistry::with_defaults(), None, target_type).unwrap();
    let adapter = PredictorAdapter::load(resolution, None).unwrap();
    Pipeline::new(Arc::new(adapter), target_type, class_labels).unwrap()
}

#[test]
fn regression_run_yields_one_predictions_column() {
    let dir = TempDir::new().unwrap();
    write_model(
        dir.path(),
        r#"{"intercept": 10.0, "coefficients": {"area": 2.0, "rooms": 1.0}}"#,
    );

    let mut input = String::from("area,rooms\n");
    for row in 0..10 {
        input.push_str(&format!("{row},1\n"));
    }

    let pipeline = load_pipeline(dir.path(), TargetType::Regression, None);
    let frame = pipeline.predict(input.as_bytes()).unwrap();

    assert_eq!(frame.n_columns(), 1);
    assert_eq!(frame.n_rows(), 10);
    let values = frame
        .column(PREDICTIONS_COLUMN)
        .unwrap()
        .as_floats()
        .unwrap();
    assert_eq!(values[0], 11.0);
    assert_eq!(values[9], 29.0);
}

#[test]
fn binary_run_expands_to_labelled_columns_summing_to_one() {
    let dir = TempDir::new().unwrap();
    write_model(dir.path(), r#"{"intercept": 0.0, "coefficients": {"x": 1.0}}"#);

    let labels = ClassLabels {
        positive: "yes".to_string(),
        negative: "no".to_string(),
    };
    let pipeline = load_pipeline(dir.path(), TargetType::Binary, Some(labels));
    let frame = pipeline.predict(b"x\n-2\n0\n2\n").unwrap();

    assert_eq!(frame.n_columns(), 2);
    assert_eq!(frame.columns()[0].name, "yes");
    assert_eq!(frame.columns()[1].name, "no");

    let yes = frame.column("yes").unwrap().as_floats().unwrap();
    let no = frame.column("no").unwrap().as_floats().unwrap();
    for row in 0..frame.n_rows() {
        assert!((yes[row] + no[row] - 1.0).abs() < 1e-9);
    }
    // Sigmoid at zero is one half
    assert!((yes[1] - 0.5).abs() < 1e-9);
    assert!(yes[2] > 0.5 && yes[0] < 0.5);
}

#[test]
fn two_artifacts_fail_resolution_as_ambiguous() {
    let dir = TempDir::new().unwrap();
    write_model(dir.path(), r#"{"coefficients": {}}"#);
    fs::write(dir.path().join("model.pkl"), b"not a real pickle").unwrap();

    let err = resolve(
        dir.path(),
        &LoaderRegistry::with_defaults(),
        None,
        TargetType::Regression,
    )
    .unwrap_err();
    assert!(matches!(err, RunnerError::ArtifactAmbiguous { .. }));
}

#[test]
fn empty_code_dir_fails_resolution_as_missing() {
    let dir = TempDir::new().unwrap();
    let err = resolve(
        dir.path(),
        &LoaderRegistry::with_defaults(),
        None,
        TargetType::Regression,
    )
    .unwrap_err();
    assert!(matches!(err, RunnerError::ArtifactMissing { .. }));
}

#[test]
fn unclaimed_artifact_format_fails_resolution() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("model.h5"), b"\x89HDF").unwrap();

    let err = resolve(
        dir.path(),
        &LoaderRegistry::with_defaults(),
        None,
        TargetType::Regression,
    )
    .unwrap_err();
    assert!(matches!(err, RunnerError::UnsupportedArtifact { .. }));
}

#[test]
fn batch_binary_run_writes_labelled_csv() {
    let dir = TempDir::new().unwrap();
    write_model(dir.path(), r#"{"intercept": 0.0, "coefficients": {"x": 1.0}}"#);
    let input = dir.path().join("scoring.csv");
    fs::write(&input, "x\n0\n").unwrap();
    let output = dir.path().join("predictions.csv");

    let mut config = Config::default();
    config.model.code_dir = dir.path().to_path_buf();
    config.model.target_type = TargetType::Binary;
    config.model.positive_class_label = Some("yes".to_string());
    config.model.negative_class_label = Some("no".to_string());

    let job = BatchJob {
        input,
        output: Some(output.clone()),
        content_type: None,
        target_column: None,
    };
    batch::run(&config, &job, LoaderRegistry::with_defaults(), None).unwrap();

    let written = fs::read_to_string(&output).unwrap();
    assert_eq!(written, "yes,no\n0.5,0.5\n");
}

#[test]
fn corrupt_artifact_fails_at_load_not_resolution() {
    let dir = TempDir::new().unwrap();
    write_model(dir.path(), "{ this is not json");

    let resolution = resolve(
        dir.path(),
        &LoaderRegistry::with_defaults(),
        None,
        TargetType::Regression,
    )
    .unwrap();
    let err = PredictorAdapter::load(resolution, None).unwrap_err();
    assert!(matches!(err, RunnerError::ModelLoad { .. }));
}

#[test]
fn unknown_feature_in_input_is_invalid_input() {
    let dir = TempDir::new().unwrap();
    write_model(dir.path(), r#"{"coefficients": {"x": 1.0}}"#);

    let pipeline = load_pipeline(dir.path(), TargetType::Regression, None);
    let err = pipeline.predict(b"other\n1\n").unwrap_err();
    assert!(matches!(err, RunnerError::InvalidInput { .. }));
}
