// SPDX-License-Identifier: MIT

//! Pipeline router
//!
//! Walks the stage graph for one input. Every step invokes the current
//! stage, emits its log line, then dispatches its on-result, on-not-result
//! and always actions in that order. At most one `next` may fire per step;
//! when none fires the run terminates with the aggregated output.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::output::RunOutput;
use crate::runtime::error::{ConfigError, RoutingError, SiftResult};
use crate::runtime::tensor::Tensor;
use crate::sift::pipeline::sink::{
    ArtifactRequest, ArtifactStore, FsArtifactStore, LogCrateSink, LogSink,
};
use crate::sift::pipeline::stage::{Stage, StageInput, StageResult, TemplateContext};
use crate::sift::pipeline::types::{Action, ForwardInput};

/// Default bound on stage invocations per run
pub const DEFAULT_MAX_STEPS: usize = 100;

/// Key of the aggregated output holding the last save location
pub const FILEPATH_KEY: &str = "filepath";

const DEFAULT_CLIENT_ID: &str = "local";

/// Input of one run
#[derive(Debug, Clone)]
pub struct RunInput {
    /// File the data was read from; `save` actions copy it
    pub source: PathBuf,
    pub data: Tensor,
}

impl RunInput {
    pub fn new(source: impl Into<PathBuf>, data: Tensor) -> Self {
        Self {
            source: source.into(),
            data,
        }
    }
}

/// Router state between steps
enum RunState<'p> {
    Running { stage: &'p Stage, data: StageInput },
    Terminated,
}

pub struct Pipeline {
    name: String,
    entry: Stage,
    stages: HashMap<String, Stage>,
    client_id: String,
    save_dir: PathBuf,
    max_steps: usize,
    log_sink: Arc<dyn LogSink>,
    store: Arc<dyn ArtifactStore>,
}

impl Pipeline {
    /// Assemble a pipeline from its entry stage and the stages reachable by name
    ///
    /// No stage may be called `filepath`, which is a key of the run output.
    pub fn new(entry: Stage, stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if let Some(reserved) = std::iter::once(&entry)
            .chain(&stages)
            .find(|stage| stage.name() == FILEPATH_KEY)
        {
            return Err(ConfigError::ReservedStageName(reserved.name().to_string()));
        }

        let mut by_name: HashMap<String, Stage> = HashMap::new();
        for stage in stages {
            if stage.name() == entry.name() || by_name.contains_key(stage.name()) {
                return Err(ConfigError::DuplicateStage(stage.name().to_string()));
            }
            by_name.insert(stage.name().to_string(), stage);
        }

        Ok(Self {
            name: entry.name().to_string(),
            entry,
            stages: by_name,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            save_dir: PathBuf::from("saved"),
            max_steps: DEFAULT_MAX_STEPS,
            log_sink: Arc::new(LogCrateSink),
            store: Arc::new(FsArtifactStore),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Identifier substituted for `%c`
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_save_dir(mut self, save_dir: impl Into<PathBuf>) -> Self {
        self.save_dir = save_dir.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
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

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &Stage {
        &self.entry
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.get(name)
    }

    /// Names of the non-entry stages, sorted
    pub fn stage_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Route one input through the pipeline
    pub fn run(&self, input: &RunInput) -> SiftResult<RunOutput> {
        let mut output = RunOutput::default();
        let mut steps = 0;
        let mut state = RunState::Running {
            stage: &self.entry,
            data: StageInput::Tensor(input.data.clone()),
        };

        loop {
            match state {
                RunState::Terminated => {
                    log::debug!(
                        "Pipeline '{}' finished after {} steps",
                        self.name,
                        steps
                    );
                    return Ok(output);
                }
                RunState::Running { stage, data } => {
                    if steps >= self.max_steps {
                        return Err(RoutingError::StepLimitExceeded {
                            limit: self.max_steps,
                            stage: stage.name().to_string(),
                        }
                        .into());
                    }
                    steps += 1;
                    state = self.step(stage, &data, input, &mut output)?;
                }
            }
        }
    }

    fn step<'p>(
        &'p self,
        stage: &'p Stage,
        data: &StageInput,
        input: &RunInput,
        output: &mut RunOutput,
    ) -> SiftResult<RunState<'p>> {
        log::debug!("Invoking stage '{}'", stage.name());
        let result = stage.process(data)?;
        let ctx = TemplateContext::new(stage.name(), &result.classes, &self.client_id);

        if let Some(template) = stage.log_template() {
            self.log_sink
                .emit(stage.name(), &ctx.log_line(Some(template)));
        }

        let mut successor: Option<(&'p Stage, ForwardInput)> = None;
        for action in stage.actions_for(&result.classes)? {
            match action {
                Action::Next { target, input } => {
                    if let Some((first, _)) = successor {
                        return Err(RoutingError::TwoSuccessors {
                            stage: stage.name().to_string(),
                            first: first.name().to_string(),
                            second: target.clone(),
                        }
                        .into());
                    }
                    let next =
                        self.stages
                            .get(target)
                            .ok_or_else(|| RoutingError::UnknownTarget {
                                stage: stage.name().to_string(),
                                target: target.clone(),
                            })?;
                    successor = Some((next, *input));
                }
                Action::Save {
                    filename,
                    directory,
                } => {
                    let directory = ctx.directory(directory.as_deref(), &self.save_dir);
                    let filename = ctx.filename(filename.as_deref());
                    let path = self.store.persist(&ArtifactRequest {
                        stage: stage.name(),
                        source: &input.source,
                        directory: &directory,
                        filename: &filename,
                    })?;
                    output.filepath = Some(path);
                }
                Action::Log { line } => {
                    self.log_sink
                        .emit(stage.name(), &ctx.log_line(line.as_deref()));
                }
                Action::Output => output.record(stage.name(), result.clone()),
                Action::Nothing => {}
            }
        }

        Ok(match successor {
            None => RunState::Terminated,
            Some((next, forward)) => {
                log::debug!("Stage '{}' routes to '{}'", stage.name(), next.name());
                RunState::Running {
                    stage: next,
                    data: forwarded(forward, data, &result),
                }
            }
        })
    }
}

fn forwarded(forward: ForwardInput, data: &StageInput, result: &StageResult) -> StageInput {
    match forward {
        ForwardInput::Same => data.clone(),
        ForwardInput::Result => StageInput::Labels(result.classes.clone()),
    }
}
