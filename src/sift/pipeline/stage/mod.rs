// SPDX-License-Identifier: MIT

//! Stages - one inference step plus its action rules
//!
//! A [`Stage`] turns its input into a [`StageResult`] through a
//! [`Processor`] and decides which of its configured actions fire for
//! that result. Stages are immutable once built, so one pipeline can
//! serve several runs at once.

mod anomaly;
mod classification;
mod labels;
mod model;
mod template;

pub use anomaly::AnomalyProcess;
pub use classification::{ClassificationProcess, UNKNOWN_LABEL};
pub use labels::load_labels;
pub use model::ModelRunner;
pub use template::{sanitize_filename, TemplateContext, DEFAULT_FILENAME, DEFAULT_LOG_LINE};

use serde::Serialize;
use std::sync::Arc;

use crate::runtime::error::{ResultFormatError, SiftResult};
use crate::runtime::tensor::Tensor;
use crate::sift::pipeline::condition::ConditionGroup;
use crate::sift::pipeline::types::Action;

/// Data a stage is invoked with
#[derive(Debug, Clone, PartialEq)]
pub enum StageInput {
    /// Raw input, or the input of the previous stage (`input: same`)
    Tensor(Tensor),
    /// Classes of the previous stage (`input: result`)
    Labels(Vec<String>),
}

/// Outcome of one stage invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    /// One label per input row, lower-cased
    pub classes: Vec<String>,
    /// Score behind each label
    pub values: Vec<f32>,
    /// Processing parameters that produced the result
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl StageResult {
    pub fn new(classes: Vec<String>, values: Vec<f32>) -> Self {
        Self {
            classes,
            values,
            params: serde_json::Map::new(),
        }
    }

    /// Lower-case the classes and check they pair up with the values
    pub fn normalize(mut self, stage: &str) -> SiftResult<Self> {
        if self.classes.len() != self.values.len() {
            return Err(ResultFormatError::LengthMismatch {
                stage: stage.to_string(),
                classes: self.classes.len(),
                values: self.values.len(),
            }
            .into());
        }
        for class in &mut self.classes {
            *class = class.to_lowercase();
        }
        Ok(self)
    }
}

/// Turns a stage input into a result
pub trait Process: Send + Sync {
    fn process(&self, stage: &str, input: &StageInput) -> SiftResult<StageResult>;
}

/// Processing variant of a stage, chosen once at build time
pub enum Processor {
    Anomaly(AnomalyProcess),
    Classification(ClassificationProcess),
    /// Processing supplied by the embedding application
    Custom(Arc<dyn Process>),
}

impl Processor {
    pub fn kind(&self) -> &'static str {
        match self {
            Processor::Anomaly(_) => "anomaly",
            Processor::Classification(_) => "classification",
            Processor::Custom(_) => "custom",
        }
    }
}

impl Process for Processor {
    fn process(&self, stage: &str, input: &StageInput) -> SiftResult<StageResult> {
        match self {
            Processor::Anomaly(p) => p.process(stage, input),
            Processor::Classification(p) => p.process(stage, input),
            Processor::Custom(p) => p.process(stage, input),
        }
    }
}

pub struct Stage {
    name: String,
    log: Option<String>,
    on_result: Vec<(ConditionGroup, Action)>,
    on_not_result: Vec<(ConditionGroup, Action)>,
    always: Vec<Action>,
    processor: Processor,
}

impl Stage {
    pub fn new(name: impl Into<String>, processor: Processor) -> Self {
        Self {
            name: name.into(),
            log: None,
            on_result: Vec::new(),
            on_not_result: Vec::new(),
            always: Vec::new(),
            processor,
        }
    }

    /// Log a line after every invocation; `default` selects the default line
    ///
    /// An empty template disables the line.
    pub fn with_log(mut self, template: impl Into<String>) -> Self {
        let template = template.into();
        self.log = (!template.is_empty()).then_some(template);
        self
    }

    /// Fire `action` when `group` holds
    pub fn on_result(mut self, group: ConditionGroup, action: Action) -> Self {
        self.on_result.push((group, action));
        self
    }

    /// Fire `action` when `group` does not hold
    pub fn on_not_result(mut self, group: ConditionGroup, action: Action) -> Self {
        self.on_not_result.push((group, action));
        self
    }

    /// Fire `action` after every invocation
    pub fn always(mut self, action: Action) -> Self {
        self.always.push(action);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_template(&self) -> Option<&str> {
        self.log.as_deref()
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    /// Run the processor and normalize its result
    pub fn process(&self, input: &StageInput) -> SiftResult<StageResult> {
        self.processor
            .process(&self.name, input)?
            .normalize(&self.name)
    }

    /// Actions whose group holds for `classes`, in configuration order
    pub fn on_result_actions(&self, classes: &[String]) -> SiftResult<Vec<&Action>> {
        select(&self.on_result, classes, true)
    }

    /// Actions whose group does NOT hold for `classes`, in configuration order
    pub fn on_not_result_actions(&self, classes: &[String]) -> SiftResult<Vec<&Action>> {
        select(&self.on_not_result, classes, false)
    }

    pub fn always_actions(&self) -> impl Iterator<Item = &Action> {
        self.always.iter()
    }

    /// Every action that fires for `classes`: on-result, then on-not-result, then always
    pub fn actions_for(&self, classes: &[String]) -> SiftResult<Vec<&Action>> {
        let mut actions = self.on_result_actions(classes)?;
        actions.extend(self.on_not_result_actions(classes)?);
        actions.extend(self.always_actions());
        Ok(actions)
    }

    /// Every `next` target this stage can route to
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.on_result
            .iter()
            .chain(&self.on_not_result)
            .map(|(_, action)| action)
            .chain(&self.always)
            .filter_map(|action| match action {
                Action::Next { target, .. } => Some(target.as_str()),
                _ => None,
            })
    }
}

fn select<'s>(
    rules: &'s [(ConditionGroup, Action)],
    classes: &[String],
    expected: bool,
) -> SiftResult<Vec<&'s Action>> {
    let mut actions = Vec::new();
    for (group, action) in rules {
        if group.is_valid(classes)? == expected {
            actions.push(action);
        }
    }
    Ok(actions)
}
