// SPDX-License-Identifier: MIT

//! Pipeline builder - turns definitions into runnable pipelines
//!
//! Every configuration problem is reported here, before any run starts:
//! entry stage count, stage names, conditions, routing targets and the
//! per-kind stage fields. Models and label files are loaded once per stage.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::runtime::error::{ConfigError, SiftResult};
use crate::runtime::inference::InferenceBackend;
use crate::sift::pipeline::condition::ConditionGroup;
use crate::sift::pipeline::loader::PipelineLoader;
use crate::sift::pipeline::registry::{ExtractorRegistry, FeatureExtractor, NO_PREPROCESS};
use crate::sift::pipeline::router::{Pipeline, DEFAULT_MAX_STEPS, FILEPATH_KEY};
use crate::sift::pipeline::sink::{ArtifactStore, FsArtifactStore, LogCrateSink, LogSink};
use crate::sift::pipeline::stage::{
    load_labels, AnomalyProcess, ClassificationProcess, ModelRunner, Processor, Stage,
};
use crate::sift::pipeline::types::{
    Action, ConditionalAction, PipelineDefinition, Position, StageDefinition, StageKind,
};

impl PipelineDefinition {
    /// The single stage with `position: input`
    pub fn entry(&self) -> Result<&StageDefinition, ConfigError> {
        let mut inputs = self
            .processes
            .iter()
            .filter(|p| p.position == Position::Input);
        let first = inputs.next().ok_or(ConfigError::NoEntryStage)?;
        match inputs.next() {
            Some(second) => Err(ConfigError::MultipleEntryStages {
                first: first.name.clone(),
                second: second.name.clone(),
            }),
            None => Ok(first),
        }
    }

    /// Check everything that does not need the model backend
    pub fn validate(&self) -> Result<(), ConfigError> {
        let entry = self.entry()?;

        let mut names = HashSet::new();
        for stage in &self.processes {
            if stage.name == FILEPATH_KEY {
                return Err(ConfigError::ReservedStageName(stage.name.clone()));
            }
            if !names.insert(stage.name.as_str()) {
                return Err(ConfigError::DuplicateStage(stage.name.clone()));
            }
        }

        for stage in &self.processes {
            validate_config(stage)?;
            for rule in conditional_rules(stage) {
                ConditionGroup::parse(&rule.condition)?;
            }
            for target in next_targets(stage) {
                if target == entry.name || !names.contains(target) {
                    return Err(ConfigError::UnknownTarget {
                        stage: stage.name.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn validate_config(stage: &StageDefinition) -> Result<(), ConfigError> {
    let config = &stage.config;
    if config.input_shape.is_empty() || config.input_shape.contains(&0) {
        return Err(ConfigError::InvalidInputShape {
            stage: stage.name.clone(),
            shape: config.input_shape.clone(),
        });
    }

    let (required, forbidden) = match stage.kind {
        StageKind::Anomaly => (
            vec![("threshold", config.threshold.is_some())],
            vec![
                ("labels", config.labels.is_some()),
                ("minimum_confidence", config.minimum_confidence.is_some()),
                ("count", config.count.is_some()),
            ],
        ),
        StageKind::Classification => (
            vec![("labels", config.labels.is_some())],
            vec![("threshold", config.threshold.is_some())],
        ),
    };

    if let Some((field, _)) = required.iter().find(|(_, present)| !present) {
        return Err(ConfigError::MissingField {
            stage: stage.name.clone(),
            field: field.to_string(),
        });
    }
    if let Some((field, _)) = forbidden.iter().find(|(_, present)| *present) {
        return Err(ConfigError::UnexpectedField {
            stage: stage.name.clone(),
            field: field.to_string(),
        });
    }
    Ok(())
}

fn conditional_rules(stage: &StageDefinition) -> impl Iterator<Item = &ConditionalAction> {
    stage
        .actions
        .on_result
        .iter()
        .chain(stage.actions.on_not_result.iter())
        .flatten()
}

fn next_targets(stage: &StageDefinition) -> impl Iterator<Item = &str> {
    conditional_rules(stage)
        .map(|rule| &rule.action)
        .chain(stage.actions.always.iter().flatten())
        .filter_map(|action| match action {
            Action::Next { target, .. } => Some(target.as_str()),
            _ => None,
        })
}

/// High-level builder for constructing pipelines from YAML definitions
pub struct Builder {
    loader: PipelineLoader,
    backend: Arc<dyn InferenceBackend>,
    registry: ExtractorRegistry,
    client_id: Option<String>,
    save_dir: Option<PathBuf>,
    log_sink: Arc<dyn LogSink>,
    store: Arc<dyn ArtifactStore>,
}

impl Builder {
    pub fn new(backend: Arc<dyn InferenceBackend>, registry: ExtractorRegistry) -> Self {
        Self {
            loader: PipelineLoader::new(),
            backend,
            registry,
            client_id: None,
            save_dir: None,
            log_sink: Arc::new(LogCrateSink),
            store: Arc::new(FsArtifactStore),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Overrides `directories.save_dir` of the definition
    pub fn with_save_dir(mut self, save_dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(save_dir.into());
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = store;
        self
    }

    /// Build a pipeline from a YAML file path
    pub fn build_pipeline<P: AsRef<Path>>(&self, path: P) -> SiftResult<Pipeline> {
        let def = self.loader.load(path)?;
        self.build_from_def(&def)
    }

    /// Build a pipeline from a parsed definition
    pub fn build_from_def(&self, def: &PipelineDefinition) -> SiftResult<Pipeline> {
        def.validate()?;
        let entry_name = def.entry()?.name.clone();

        let mut entry = None;
        let mut stages = Vec::with_capacity(def.processes.len().saturating_sub(1));
        for stage_def in &def.processes {
            let stage = self.build_stage(stage_def)?;
            if stage_def.name == entry_name {
                entry = Some(stage);
            } else {
                stages.push(stage);
            }
        }
        let entry = entry.ok_or(ConfigError::NoEntryStage)?;

        let mut pipeline = Pipeline::new(entry, stages)?
            .with_max_steps(def.max_steps.unwrap_or(DEFAULT_MAX_STEPS))
            .with_save_dir(
                self.save_dir
                    .clone()
                    .unwrap_or_else(|| def.directories.save_dir.clone()),
            )
            .with_log_sink(self.log_sink.clone())
            .with_store(self.store.clone());
        if let Some(name) = &def.name {
            pipeline = pipeline.with_name(name.clone());
        }
        if let Some(client_id) = &self.client_id {
            pipeline = pipeline.with_client_id(client_id.clone());
        }

        log::info!(
            "Built pipeline '{}' with entry stage '{}' and {} further stages using the {} backend",
            pipeline.name(),
            entry_name,
            def.processes.len() - 1,
            self.backend.name()
        );
        Ok(pipeline)
    }

    fn build_stage(&self, def: &StageDefinition) -> SiftResult<Stage> {
        let config = &def.config;
        let preprocess = self.resolve_preprocess(config.preprocess.as_deref())?;
        let interpreter = self.backend.load(&def.model, &config.input_shape)?;
        let model = ModelRunner::new(interpreter, config.input_shape.clone(), preprocess);

        let missing = |field: &str| ConfigError::MissingField {
            stage: def.name.clone(),
            field: field.to_string(),
        };
        let processor = match def.kind {
            StageKind::Anomaly => {
                let threshold = config.threshold.ok_or_else(|| missing("threshold"))?;
                Processor::Anomaly(AnomalyProcess::new(model, threshold))
            }
            StageKind::Classification => {
                let path = config.labels.as_ref().ok_or_else(|| missing("labels"))?;
                let labels = load_labels(path)?;
                Processor::Classification(ClassificationProcess::new(
                    model,
                    labels,
                    config.minimum_confidence,
                    config.count,
                ))
            }
        };

        let mut stage = Stage::new(def.name.clone(), processor);
        if let Some(template) = &def.log {
            stage = stage.with_log(template.clone());
        }
        for rule in def.actions.on_result.iter().flatten() {
            let group = self.parse_group(&def.name, &rule.condition)?;
            stage = stage.on_result(group, rule.action.clone());
        }
        for rule in def.actions.on_not_result.iter().flatten() {
            let group = self.parse_group(&def.name, &rule.condition)?;
            stage = stage.on_not_result(group, rule.action.clone());
        }
        for action in def.actions.always.iter().flatten() {
            stage = stage.always(action.clone());
        }

        log::debug!(
            "Built {} stage '{}' from model '{}'",
            stage.processor().kind(),
            def.name,
            def.model.display()
        );
        Ok(stage)
    }

    fn resolve_preprocess(
        &self,
        name: Option<&str>,
    ) -> Result<Option<Arc<dyn FeatureExtractor>>, ConfigError> {
        match name {
            None | Some(NO_PREPROCESS) => Ok(None),
            Some(name) => self
                .registry
                .get(name)
                .map(Some)
                .ok_or_else(|| ConfigError::UnknownPreprocess(name.to_string())),
        }
    }

    fn parse_group(&self, stage: &str, condition: &str) -> Result<ConditionGroup, ConfigError> {
        let group = ConditionGroup::parse(condition)?;
        if group.is_empty() {
            log::warn!(
                "Stage '{}' has an empty condition; it matches every result",
                stage
            );
        }
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::error::{ResourceError, SiftError};
    use crate::runtime::replay::ReplayBackend;
    use crate::runtime::tensor::Tensor;
    use crate::runtime::Interpreter;
    use crate::sift::pipeline::router::RunInput;
    use crate::sift::pipeline::sink::MemorySink;
    use std::io::Write;

    fn parse(yaml: &str) -> PipelineDefinition {
        PipelineLoader::parse_yaml(yaml).unwrap()
    }

    fn anomaly_stage(name: &str, position: &str, actions: &str) -> String {
        format!(
            r#"
  - name: {name}
    type: anomaly
    position: {position}
    model: {name}.tflite
    config:
      input_shape: [2, 2]
      threshold: 0.5
    actions:
{actions}"#
        )
    }

    fn pipeline_yaml(stages: &[String]) -> String {
        format!("processes:{}", stages.concat())
    }

    const NO_ACTIONS: &str = "      always: []\n";

    #[test]
    fn test_validate_accepts_two_stages() {
        let yaml = pipeline_yaml(&[
            anomaly_stage(
                "a",
                "input",
                "      on_result:\n        - \"true>=50%\": {action: next, target: b, input: same}\n",
            ),
            anomaly_stage("b", "middle", NO_ACTIONS),
        ]);
        assert_eq!(parse(&yaml).validate(), Ok(()));
    }

    #[test]
    fn test_validate_entry_count() {
        let none = pipeline_yaml(&[anomaly_stage("a", "middle", NO_ACTIONS)]);
        assert_eq!(parse(&none).validate(), Err(ConfigError::NoEntryStage));

        let two = pipeline_yaml(&[
            anomaly_stage("a", "input", NO_ACTIONS),
            anomaly_stage("b", "input", NO_ACTIONS),
        ]);
        assert_eq!(
            parse(&two).validate(),
            Err(ConfigError::MultipleEntryStages {
                first: "a".to_string(),
                second: "b".to_string(),
            })
        );
    }

    #[test]
    fn test_validate_names() {
        let duplicate = pipeline_yaml(&[
            anomaly_stage("a", "input", NO_ACTIONS),
            anomaly_stage("b", "middle", NO_ACTIONS),
            anomaly_stage("b", "middle", NO_ACTIONS),
        ]);
        assert_eq!(
            parse(&duplicate).validate(),
            Err(ConfigError::DuplicateStage("b".to_string()))
        );

        let reserved = pipeline_yaml(&[
            anomaly_stage("a", "input", NO_ACTIONS),
            anomaly_stage("filepath", "middle", NO_ACTIONS),
        ]);
        assert_eq!(
            parse(&reserved).validate(),
            Err(ConfigError::ReservedStageName("filepath".to_string()))
        );
    }

    #[test]
    fn test_validate_targets() {
        let unknown = pipeline_yaml(&[anomaly_stage(
            "a",
            "input",
            "      always:\n        - {action: next, target: nowhere, input: result}\n",
        )]);
        assert_eq!(
            parse(&unknown).validate(),
            Err(ConfigError::UnknownTarget {
                stage: "a".to_string(),
                target: "nowhere".to_string(),
            })
        );

        let to_entry = pipeline_yaml(&[
            anomaly_stage("a", "input", NO_ACTIONS),
            anomaly_stage(
                "b",
                "middle",
                "      always:\n        - {action: next, target: a, input: same}\n",
            ),
        ]);
        assert!(matches!(
            parse(&to_entry).validate(),
            Err(ConfigError::UnknownTarget { .. })
        ));
    }

    #[test]
    fn test_validate_conditions() {
        let malformed = pipeline_yaml(&[anomaly_stage(
            "a",
            "input",
            "      on_result:\n        - \"true>=50%;\": {action: output}\n",
        )]);
        assert!(matches!(
            parse(&malformed).validate(),
            Err(ConfigError::MalformedCondition { .. })
        ));

        let operator = pipeline_yaml(&[anomaly_stage(
            "a",
            "input",
            "      on_result:\n        - \"true=5\": {action: output}\n",
        )]);
        assert!(matches!(
            parse(&operator).validate(),
            Err(ConfigError::UnknownOperator(_))
        ));
    }

    #[test]
    fn test_validate_stage_fields() {
        let yaml = r#"
processes:
  - name: a
    type: classification
    position: input
    model: a.tflite
    config:
      input_shape: [1, 3]
"#;
        assert_eq!(
            parse(yaml).validate(),
            Err(ConfigError::MissingField {
                stage: "a".to_string(),
                field: "labels".to_string(),
            })
        );

        let yaml = r#"
processes:
  - name: a
    type: anomaly
    position: input
    model: a.tflite
    config:
      input_shape: [1, 3]
      threshold: 0.1
      count: 2
"#;
        assert_eq!(
            parse(yaml).validate(),
            Err(ConfigError::UnexpectedField {
                stage: "a".to_string(),
                field: "count".to_string(),
            })
        );

        let yaml = r#"
processes:
  - name: a
    type: anomaly
    position: input
    model: a.tflite
    config:
      input_shape: [1, 0]
      threshold: 0.1
"#;
        assert!(matches!(
            parse(yaml).validate(),
            Err(ConfigError::InvalidInputShape { .. })
        ));
    }

    fn replay() -> Arc<ReplayBackend> {
        // Reconstruction of an all-zero [2, 2] input: row 0 is off by 0.9
        let reconstruction = Tensor::new(vec![2, 2], vec![0.9, 0.0, 0.1, 0.0]).unwrap();
        let scores = Tensor::new(vec![1, 3], vec![0.1, 0.8, 0.1]).unwrap();
        Arc::new(
            ReplayBackend::default()
                .with_model("detector.tflite", vec![reconstruction])
                .with_model("birds.tflite", vec![scores]),
        )
    }

    #[test]
    fn test_build_and_run() {
        let mut labels = tempfile::NamedTempFile::new().unwrap();
        writeln!(labels, "0,robin\n1,wren\n2,jay").unwrap();

        let yaml = format!(
            r#"
name: garden
max_steps: 4
processes:
  - name: detector
    type: anomaly
    position: input
    model: detector.tflite
    log: default
    config:
      input_shape: [2, 2]
      threshold: 0.5
    actions:
      on_result:
        - "true>=50%": {{action: next, target: birds, input: same}}
  - name: birds
    type: classification
    model: birds.tflite
    config:
      input_shape: [2, 2]
      labels: {}
      count: 1
    actions:
      always:
        - action: output
"#,
            labels.path().display()
        );

        let sink = Arc::new(MemorySink::new());
        let builder = Builder::new(replay(), ExtractorRegistry::new())
            .with_client_id("garden-mic")
            .with_log_sink(sink.clone());
        let pipeline = builder.build_from_def(&parse(&yaml)).unwrap();

        assert_eq!(pipeline.name(), "garden");
        assert_eq!(pipeline.max_steps(), 4);
        assert_eq!(pipeline.entry().name(), "detector");
        assert_eq!(pipeline.stage_names(), vec!["birds"]);

        let output = pipeline
            .run(&RunInput::new("in.json", Tensor::from_vec(vec![0.0; 4])))
            .unwrap();
        assert_eq!(output.latest("birds").unwrap().classes, vec!["wren"]);
        assert_eq!(
            sink.lines(),
            vec!["Stage 'detector' -> Result : '['true', 'false']'"]
        );
    }

    #[test]
    fn test_build_unknown_preprocess() {
        let yaml = r#"
processes:
  - name: detector
    type: anomaly
    position: input
    model: detector.tflite
    config:
      input_shape: [2, 2]
      preprocess: mfcc
      threshold: 0.5
"#;
        let builder = Builder::new(replay(), ExtractorRegistry::new());
        let err = builder.build_from_def(&parse(yaml)).err().unwrap();
        assert!(matches!(
            err,
            SiftError::Config(ConfigError::UnknownPreprocess(ref name)) if name == "mfcc"
        ));
    }

    #[test]
    fn test_build_preprocess_none() {
        let yaml = r#"
processes:
  - name: detector
    type: anomaly
    position: input
    model: detector.tflite
    config:
      input_shape: [2, 2]
      preprocess: none
      threshold: 0.5
"#;
        let builder = Builder::new(replay(), ExtractorRegistry::new());
        assert!(builder.build_from_def(&parse(yaml)).is_ok());
    }

    #[test]
    fn test_build_missing_model_and_labels() {
        let yaml = r#"
processes:
  - name: detector
    type: anomaly
    position: input
    model: unknown.tflite
    config:
      input_shape: [2, 2]
      threshold: 0.5
"#;
        let builder = Builder::new(replay(), ExtractorRegistry::new());
        let err = builder.build_from_def(&parse(yaml)).err().unwrap();
        assert!(matches!(
            err,
            SiftError::Resource(ResourceError::ModelNotFound(_))
        ));

        let yaml = r#"
processes:
  - name: birds
    type: classification
    position: input
    model: birds.tflite
    config:
      input_shape: [2, 2]
      labels: no/such/labels.txt
"#;
        let err = builder.build_from_def(&parse(yaml)).err().unwrap();
        assert!(matches!(
            err,
            SiftError::Resource(ResourceError::LabelsNotFound(_))
        ));
    }

    #[test]
    fn test_each_stage_loads_its_model_once() {
        struct Counting(std::sync::atomic::AtomicUsize);

        impl InferenceBackend for Counting {
            fn name(&self) -> &str {
                "counting"
            }

            fn load(&self, model: &Path, _shape: &[usize]) -> SiftResult<Arc<dyn Interpreter>> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                ReplayBackend::default()
                    .with_model(model, vec![Tensor::from_vec(vec![0.0; 4])])
                    .load(model, &[2, 2])
            }
        }

        let yaml = pipeline_yaml(&[
            anomaly_stage("a", "input", NO_ACTIONS),
            anomaly_stage("b", "middle", NO_ACTIONS),
        ]);
        let backend = Arc::new(Counting(std::sync::atomic::AtomicUsize::new(0)));
        Builder::new(backend.clone(), ExtractorRegistry::new())
            .build_from_def(&parse(&yaml))
            .unwrap();
        assert_eq!(backend.0.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
