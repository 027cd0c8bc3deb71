//! Integration tests for pipeline loading and routing
//!
//! These tests build pipelines from YAML with recorded model outputs and
//! route inputs through them end to end.

use serde_json::json;
use sift_rs::runtime::error::{RoutingError, SiftError, SiftResult};
use sift_rs::runtime::{ReplayBackend, Tensor};
use sift_rs::sift::pipeline::builder::Builder;
use sift_rs::sift::pipeline::condition::ConditionGroup;
use sift_rs::sift::pipeline::loader::PipelineLoader;
use sift_rs::sift::pipeline::registry::{ExtractorRegistry, FeatureExtractor};
use sift_rs::sift::pipeline::router::{Pipeline, RunInput};
use sift_rs::sift::pipeline::sink::MemorySink;
use sift_rs::sift::pipeline::stage::{Process, Processor, Stage, StageInput, StageResult};
use sift_rs::sift::pipeline::types::{Action, ForwardInput};
use std::fs;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// Mock Components
// ============================================================================

/// Extractor that zeroes its input
struct Silence;

impl FeatureExtractor for Silence {
    fn name(&self) -> &str {
        "silence"
    }

    fn extract(&self, input: &Tensor) -> SiftResult<Tensor> {
        Tensor::new(input.shape.clone(), vec![0.0; input.len()])
    }
}

/// Classifier that always reports the same labels
struct StaticLabels(Vec<String>);

impl Process for StaticLabels {
    fn process(&self, _stage: &str, _input: &StageInput) -> SiftResult<StageResult> {
        Ok(StageResult::new(self.0.clone(), vec![1.0; self.0.len()]))
    }
}

/// Stage that reports the labels forwarded to it
struct ForwardedLabels;

impl Process for ForwardedLabels {
    fn process(&self, stage: &str, input: &StageInput) -> SiftResult<StageResult> {
        match input {
            StageInput::Labels(labels) => {
                Ok(StageResult::new(labels.clone(), vec![1.0; labels.len()]))
            }
            StageInput::Tensor(_) => Err(RoutingError::UnsupportedInput {
                stage: stage.to_string(),
                reason: "expects labels".to_string(),
            }
            .into()),
        }
    }
}

const FIXTURES: &str = r#"{
  "models": {
    "detector.tflite": [{"shape": [2, 2], "data": [0.9, 0.0, 0.1, 0.0]}],
    "birds.tflite": [{"shape": [1, 3], "data": [0.05, 0.7, 0.25]}]
  }
}"#;

fn garden_yaml(labels: &Path, save_dir: &Path) -> String {
    format!(
        r#"
name: garden
directories:
  save_dir: {save_dir}
processes:
  - name: detector
    type: anomaly
    position: input
    model: detector.tflite
    log: default
    config:
      input_shape: [2, 2]
      preprocess: silence
      threshold: 0.5
    actions:
      on_result:
        - "true>=50%":
            action: next
            target: birds
            input: same
      on_not_result:
        - "true>=50%":
            action: log
            line: "quiet %n"
      always:
        - action: save
          filename: "%n-%R"
          directory: default
        - action: output
  - name: birds
    type: classification
    model: birds.tflite
    config:
      input_shape: [4]
      labels: {labels}
      minimum_confidence: 0.2
      count: 2
    actions:
      on_result:
        - "wren==1":
            action: log
            line: "heard %r on %c"
      always:
        - action: output
        - {{}}
"#,
        save_dir = save_dir.display(),
        labels = labels.display()
    )
}

struct Garden {
    dir: tempfile::TempDir,
    pipeline: Pipeline,
    sink: Arc<MemorySink>,
}

fn garden() -> Garden {
    let dir = tempfile::tempdir().unwrap();
    let labels = dir.path().join("labels.txt");
    fs::write(&labels, "0,Robin\n1,Wren\n2,Jay\n").unwrap();

    let yaml = garden_yaml(&labels, &dir.path().join("saved"));
    let config = dir.path().join("garden.yaml");
    fs::write(&config, yaml).unwrap();

    let registry = ExtractorRegistry::new();
    registry.register(Arc::new(Silence));

    let sink = Arc::new(MemorySink::new());
    let backend = Arc::new(ReplayBackend::from_json(FIXTURES).unwrap());
    let pipeline = Builder::new(backend, registry)
        .with_client_id("mic-1")
        .with_log_sink(sink.clone())
        .build_pipeline(&config)
        .unwrap();

    Garden {
        dir,
        pipeline,
        sink,
    }
}

fn write_input(dir: &Path, data: Vec<f32>) -> RunInput {
    let tensor = Tensor::new(vec![2, 2], data).unwrap();
    let source = dir.join("input.json");
    fs::write(&source, serde_json::to_string(&tensor).unwrap()).unwrap();
    RunInput::new(source, tensor)
}

// ============================================================================
// Pipeline Tests
// ============================================================================

#[test]
fn test_yaml_pipeline_end_to_end() {
    let garden = garden();
    let input = write_input(garden.dir.path(), vec![1.0; 4]);

    let output = garden.pipeline.run(&input).unwrap();

    // The extractor zeroes the input, so the errors come from the reconstruction alone
    let detector = output.latest("detector").unwrap();
    assert_eq!(detector.classes, vec!["true", "false"]);
    assert!((detector.values[0] - 0.9).abs() < 1e-6);
    assert!((detector.values[1] - 0.1).abs() < 1e-6);
    assert_eq!(detector.params["threshold"], json!(0.5));

    let birds = output.latest("birds").unwrap();
    assert_eq!(birds.classes, vec!["wren", "jay"]);
    assert_eq!(birds.values, vec![0.7, 0.25]);

    let saved = garden
        .dir
        .path()
        .join("saved")
        .join("mic-1")
        .join("detector-__true_,__false__.wav");
    assert_eq!(output.filepath.as_deref(), Some(saved.as_path()));
    assert_eq!(
        fs::read_to_string(&saved).unwrap(),
        fs::read_to_string(&input.source).unwrap()
    );

    assert_eq!(
        garden.sink.lines(),
        vec![
            "Stage 'detector' -> Result : '['true', 'false']'",
            "heard ['wren', 'jay'] on mic-1",
        ]
    );
}

#[test]
fn test_output_serializes_flat() {
    let garden = garden();
    let input = write_input(garden.dir.path(), vec![0.0; 4]);

    let output = garden.pipeline.run(&input).unwrap();
    let value = serde_json::to_value(&output).unwrap();

    let object = value.as_object().unwrap();
    let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["birds", "detector", "filepath"]);
    assert_eq!(value["birds"][0]["classes"], json!(["wren", "jay"]));
    assert_eq!(value["birds"][0]["params"]["count"], json!(2));
}

#[test]
fn test_concurrent_runs_share_pipeline() {
    let garden = garden();
    let input = write_input(garden.dir.path(), vec![0.0; 4]);
    let pipeline = Arc::new(garden.pipeline);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            let input = input.clone();
            std::thread::spawn(move || pipeline.run(&input).unwrap())
        })
        .collect();

    for handle in handles {
        let output = handle.join().unwrap();
        assert_eq!(output.latest("birds").unwrap().classes, vec!["wren", "jay"]);
        assert_eq!(output.results("detector").len(), 1);
    }
}

#[test]
fn test_invalid_pipeline_is_rejected_before_running() {
    let yaml = r#"
processes:
  - name: a
    type: anomaly
    position: input
    model: detector.tflite
    config:
      input_shape: [2, 2]
      threshold: 0.5
  - name: b
    type: anomaly
    position: input
    model: detector.tflite
    config:
      input_shape: [2, 2]
      threshold: 0.5
"#;
    let def = PipelineLoader::parse_yaml(yaml).unwrap();
    let backend = Arc::new(ReplayBackend::from_json(FIXTURES).unwrap());
    let err = Builder::new(backend, ExtractorRegistry::new())
        .build_from_def(&def)
        .err()
        .unwrap();
    assert!(err.is_config());
}

#[test]
fn test_unknown_action_rejected_at_load() {
    let yaml = r#"
processes:
  - name: a
    type: anomaly
    position: input
    model: detector.tflite
    config:
      input_shape: [2, 2]
      threshold: 0.5
    actions:
      always:
        - action: upload
"#;
    assert!(PipelineLoader::parse_yaml(yaml).is_err());
}

// ============================================================================
// Programmatic Pipelines
// ============================================================================

fn labels(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_result_forwarding_scenario() {
    let a = Stage::new(
        "A",
        Processor::Custom(Arc::new(StaticLabels(labels(&["Cat", "cat", "dog"])))),
    )
    .on_result(
        ConditionGroup::parse("cat>=50%").unwrap(),
        Action::Next {
            target: "B".to_string(),
            input: ForwardInput::Result,
        },
    );
    let b = Stage::new("B", Processor::Custom(Arc::new(ForwardedLabels))).always(Action::Output);

    let pipeline = Pipeline::new(a, vec![b]).unwrap();
    let output = pipeline
        .run(&RunInput::new("unused", Tensor::from_vec(vec![0.0])))
        .unwrap();

    assert_eq!(
        output.latest("B").unwrap().classes,
        vec!["cat", "cat", "dog"]
    );
    assert!(output.latest("A").is_none());
}

#[test]
fn test_built_in_stage_rejects_forwarded_labels() {
    let backend = ReplayBackend::from_json(FIXTURES).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let labels_file = dir.path().join("labels.txt");
    fs::write(&labels_file, "0,robin\n1,wren\n2,jay\n").unwrap();

    let yaml = format!(
        r#"
processes:
  - name: detector
    type: anomaly
    position: input
    model: detector.tflite
    config:
      input_shape: [2, 2]
      threshold: 0.5
    actions:
      always:
        - {{action: next, target: birds, input: result}}
  - name: birds
    type: classification
    model: birds.tflite
    config:
      input_shape: [4]
      labels: {}
"#,
        labels_file.display()
    );
    let def = PipelineLoader::parse_yaml(&yaml).unwrap();
    let pipeline = Builder::new(Arc::new(backend), ExtractorRegistry::new())
        .build_from_def(&def)
        .unwrap();

    let err = pipeline
        .run(&RunInput::new("unused", Tensor::from_vec(vec![0.0; 4])))
        .unwrap_err();
    assert!(matches!(
        err,
        SiftError::Routing(RoutingError::UnsupportedInput { ref stage, .. }) if stage == "birds"
    ));
}
